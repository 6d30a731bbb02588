//! HTTP implementation of [`PlatformApi`] against the YouTube Data and Analytics APIs

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::platform::{
    ChannelDetails, ChannelMetrics, PlatformApi, RemoteFailure, VideoPage, VideoSnippet,
};
use crate::models::RemoteVideo;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_ANALYTICS_BASE: &str = "https://youtubeanalytics.googleapis.com/v2";

const PAGE_SIZE: &str = "50";
const SEARCH_PAGE_SIZE: &str = "25";

#[derive(Clone)]
pub struct YouTubeClient {
    client: Client,
    api_base: String,
    analytics_base: String,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    id: String,
    snippet: Option<TitleSnippet>,
    content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Deserialize)]
struct TitleSnippet {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: Option<RelatedPlaylists>,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    snippet: Option<TitleSnippet>,
    content_details: Option<PlaylistItemContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemContentDetails {
    video_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippetWire {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: VideoSnippetWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    id: SearchItemId,
    snippet: Option<TitleSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsReport {
    #[serde(default)]
    column_headers: Vec<ColumnHeader>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ColumnHeader {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorReason>,
    #[serde(default)]
    details: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    reason: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

impl YouTubeClient {
    pub fn new(api_base: Option<&str>, analytics_base: Option<&str>) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_base: api_base.unwrap_or(DEFAULT_API_BASE).trim_end_matches('/').to_string(),
            analytics_base: analytics_base
                .unwrap_or(DEFAULT_ANALYTICS_BASE)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    async fn send(&self, request: RequestBuilder, token: &str) -> Result<Response, RemoteFailure> {
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    RemoteFailure::network(format!("YouTube request failed: {}", e))
                } else {
                    RemoteFailure::malformed(format!("YouTube request failed: {}", e))
                }
            })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::failure_from_response(response).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        token: &str,
    ) -> Result<T, RemoteFailure> {
        let response = self.send(request, token).await?;
        let body = response
            .text()
            .await
            .map_err(|e| RemoteFailure::network(format!("Failed to read YouTube response: {}", e)))?;
        log::debug!("[YOUTUBE] Raw response: {}", body);
        serde_json::from_str(&body)
            .map_err(|e| RemoteFailure::malformed(format!("Failed to parse YouTube response: {}", e)))
    }

    /// Parse the error envelope, keeping the remote message verbatim
    async fn failure_from_response(response: Response) -> RemoteFailure {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();

        match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) => {
                let reason = envelope
                    .error
                    .errors
                    .iter()
                    .chain(envelope.error.details.iter())
                    .find_map(|r| r.reason.clone());
                RemoteFailure::http(status, reason, envelope.error.message)
            }
            Err(_) => RemoteFailure::http(status, None, text),
        }
    }

    fn parse_channel(item: ChannelItem) -> ChannelDetails {
        ChannelDetails {
            external_channel_id: item.id,
            title: item.snippet.map(|s| s.title).unwrap_or_default(),
            uploads_playlist_id: item
                .content_details
                .and_then(|c| c.related_playlists)
                .and_then(|p| p.uploads),
        }
    }
}

#[async_trait]
impl PlatformApi for YouTubeClient {
    async fn own_channel(&self, token: &str) -> Result<ChannelDetails, RemoteFailure> {
        let request = self
            .client
            .get(format!("{}/channels", self.api_base))
            .query(&[("part", "snippet,contentDetails"), ("mine", "true")]);
        let list: ListResponse<ChannelItem> = self.send_json(request, token).await?;
        list.items
            .into_iter()
            .next()
            .map(Self::parse_channel)
            .ok_or_else(|| RemoteFailure::not_found("No channel found for this account"))
    }

    async fn channel_details(
        &self,
        token: &str,
        external_channel_id: &str,
    ) -> Result<ChannelDetails, RemoteFailure> {
        let request = self
            .client
            .get(format!("{}/channels", self.api_base))
            .query(&[("part", "snippet,contentDetails"), ("id", external_channel_id)]);
        let list: ListResponse<ChannelItem> = self.send_json(request, token).await?;
        list.items
            .into_iter()
            .next()
            .map(Self::parse_channel)
            .ok_or_else(|| RemoteFailure::not_found(format!("Channel {} not found", external_channel_id)))
    }

    async fn list_playlist_page(
        &self,
        token: &str,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<VideoPage, RemoteFailure> {
        let mut request = self
            .client
            .get(format!("{}/playlistItems", self.api_base))
            .query(&[
                ("part", "snippet,contentDetails"),
                ("playlistId", playlist_id),
                ("maxResults", PAGE_SIZE),
            ]);
        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }

        let list: ListResponse<PlaylistItem> = self.send_json(request, token).await?;
        let videos = list
            .items
            .into_iter()
            .filter_map(|item| {
                let video_id = item.content_details?.video_id;
                Some(RemoteVideo {
                    external_video_id: video_id,
                    title: item.snippet.map(|s| s.title).unwrap_or_default(),
                })
            })
            .collect();

        Ok(VideoPage {
            videos,
            next_page_token: list.next_page_token,
        })
    }

    async fn get_video_snippet(
        &self,
        token: &str,
        external_video_id: &str,
    ) -> Result<VideoSnippet, RemoteFailure> {
        let request = self
            .client
            .get(format!("{}/videos", self.api_base))
            .query(&[("part", "snippet"), ("id", external_video_id)]);
        let list: ListResponse<VideoItem> = self.send_json(request, token).await?;
        let item = list
            .items
            .into_iter()
            .next()
            .ok_or_else(|| RemoteFailure::not_found(format!("Video {} not found", external_video_id)))?;

        Ok(VideoSnippet {
            external_video_id: item.id,
            title: item.snippet.title,
            description: item.snippet.description,
            category_id: item.snippet.category_id,
            tags: item.snippet.tags,
        })
    }

    async fn update_video_snippet(
        &self,
        token: &str,
        snippet: &VideoSnippet,
    ) -> Result<(), RemoteFailure> {
        let wire = VideoSnippetWire {
            title: snippet.title.clone(),
            description: snippet.description.clone(),
            category_id: snippet.category_id.clone(),
            tags: snippet.tags.clone(),
        };
        let body = json!({
            "id": snippet.external_video_id,
            "snippet": wire,
        });
        let request = self
            .client
            .put(format!("{}/videos", self.api_base))
            .query(&[("part", "snippet")])
            .json(&body);
        self.send(request, token).await?;
        Ok(())
    }

    async fn search_videos(
        &self,
        token: &str,
        external_channel_id: &str,
        query: &str,
    ) -> Result<Vec<RemoteVideo>, RemoteFailure> {
        let request = self
            .client
            .get(format!("{}/search", self.api_base))
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("channelId", external_channel_id),
                ("q", query),
                ("maxResults", SEARCH_PAGE_SIZE),
            ]);
        let list: ListResponse<SearchItem> = self.send_json(request, token).await?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|item| {
                Some(RemoteVideo {
                    external_video_id: item.id.video_id?,
                    title: item.snippet.map(|s| s.title).unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn delete_video(&self, token: &str, external_video_id: &str) -> Result<(), RemoteFailure> {
        let request = self
            .client
            .delete(format!("{}/videos", self.api_base))
            .query(&[("id", external_video_id)]);
        self.send(request, token).await?;
        Ok(())
    }

    async fn channel_metrics(
        &self,
        token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ChannelMetrics, RemoteFailure> {
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        let request = self
            .client
            .get(format!("{}/reports", self.analytics_base))
            .query(&[
                ("ids", "channel==MINE"),
                ("startDate", start.as_str()),
                ("endDate", end.as_str()),
                ("metrics", "views,estimatedMinutesWatched,likes,subscribersGained"),
            ]);
        let report: AnalyticsReport = self.send_json(request, token).await?;
        metrics_from_report(&report)
    }
}

/// An empty report means no activity in the range; a non-numeric cell is a malformed response
fn metrics_from_report(report: &AnalyticsReport) -> Result<ChannelMetrics, RemoteFailure> {
    let mut metrics = ChannelMetrics::default();
    let Some(row) = report.rows.first() else {
        return Ok(metrics);
    };
    for (header, value) in report.column_headers.iter().zip(row) {
        let value = value.as_f64().ok_or_else(|| {
            RemoteFailure::malformed(format!(
                "analytics column '{}' is not numeric: {}",
                header.name, value
            ))
        })? as i64;
        match header.name.as_str() {
            "views" => metrics.views = value,
            "estimatedMinutesWatched" => metrics.estimated_minutes_watched = value,
            "likes" => metrics.likes = value,
            "subscribersGained" => metrics.subscribers_gained = value,
            _ => {}
        }
    }
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel_item() {
        let item: ChannelItem = serde_json::from_value(json!({
            "id": "UC123",
            "snippet": {"title": "My Channel"},
            "contentDetails": {"relatedPlaylists": {"uploads": "UU123"}}
        }))
        .unwrap();
        let details = YouTubeClient::parse_channel(item);
        assert_eq!(details.external_channel_id, "UC123");
        assert_eq!(details.title, "My Channel");
        assert_eq!(details.uploads_playlist_id.as_deref(), Some("UU123"));
    }

    #[test]
    fn test_error_envelope_reason() {
        let envelope: ErrorEnvelope = serde_json::from_value(json!({
            "error": {
                "code": 403,
                "message": "Request had insufficient authentication scopes.",
                "errors": [{"reason": "insufficientPermissions", "domain": "global"}],
                "status": "PERMISSION_DENIED"
            }
        }))
        .unwrap();
        assert_eq!(envelope.error.errors[0].reason.as_deref(), Some("insufficientPermissions"));
    }

    #[test]
    fn test_metrics_from_report() {
        let report: AnalyticsReport = serde_json::from_value(json!({
            "columnHeaders": [
                {"name": "views"},
                {"name": "estimatedMinutesWatched"},
                {"name": "likes"},
                {"name": "subscribersGained"}
            ],
            "rows": [[1200, 3400.0, 56, 7]]
        }))
        .unwrap();
        let metrics = metrics_from_report(&report).unwrap();
        assert_eq!(metrics.views, 1200);
        assert_eq!(metrics.estimated_minutes_watched, 3400);
        assert_eq!(metrics.likes, 56);
        assert_eq!(metrics.subscribers_gained, 7);
    }

    #[test]
    fn test_empty_report() {
        let report: AnalyticsReport = serde_json::from_value(json!({"kind": "youtubeAnalytics#resultTable"})).unwrap();
        assert_eq!(metrics_from_report(&report).unwrap(), ChannelMetrics::default());
    }

    #[test]
    fn test_non_numeric_metric_is_rejected() {
        let report: AnalyticsReport = serde_json::from_value(json!({
            "columnHeaders": [{"name": "views"}, {"name": "likes"}],
            "rows": [[1200, "n/a"]]
        }))
        .unwrap();
        let failure = metrics_from_report(&report).unwrap_err();
        assert_eq!(failure.reason.as_deref(), Some("malformedResponse"));
        assert!(failure.message.contains("likes"));
    }
}
