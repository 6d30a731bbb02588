//! Platform API seam: operations, their quota cost, and transport-level failures

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{QuotaPool, RemoteVideo};

/// Every metered platform operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOperation {
    ChannelsList,
    PlaylistItemsList,
    VideosList,
    VideosUpdate,
    VideosDelete,
    SearchList,
    AnalyticsQuery,
}

impl ApiOperation {
    /// Endpoint identifier written to the usage log
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::ChannelsList => "youtube.channels.list",
            Self::PlaylistItemsList => "youtube.playlistItems.list",
            Self::VideosList => "youtube.videos.list",
            Self::VideosUpdate => "youtube.videos.update",
            Self::VideosDelete => "youtube.videos.delete",
            Self::SearchList => "youtube.search.list",
            Self::AnalyticsQuery => "youtubeAnalytics.reports.query",
        }
    }

    /// Quota units charged per attempt
    pub fn cost(&self) -> i64 {
        match self {
            Self::ChannelsList | Self::PlaylistItemsList | Self::VideosList => 1,
            Self::VideosUpdate | Self::VideosDelete => 50,
            Self::SearchList => 100,
            Self::AnalyticsQuery => 1,
        }
    }

    pub fn pool(&self) -> QuotaPool {
        match self {
            Self::AnalyticsQuery => QuotaPool::AnalyticsApi,
            _ => QuotaPool::DataApi,
        }
    }
}

/// A failed call as seen on the wire, before mapping to the error taxonomy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    /// HTTP status, `None` when no response was received
    pub status: Option<u16>,
    /// Machine-readable reason from the error envelope, if any
    pub reason: Option<String>,
    pub message: String,
    /// Timeout or connection failure
    pub network: bool,
}

impl RemoteFailure {
    pub fn http(status: u16, reason: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            reason,
            message: message.into(),
            network: false,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: None,
            message: message.into(),
            network: true,
        }
    }

    /// Response arrived but could not be understood
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: Some("malformedResponse".to_string()),
            message: message.into(),
            network: false,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(404, Some("notFound".to_string()), message)
    }

    pub fn is_scope_insufficient(&self) -> bool {
        if !matches!(self.status, Some(401 | 403)) {
            return false;
        }
        let reason = self.reason.as_deref().unwrap_or_default();
        reason == "insufficientPermissions"
            || reason == "ACCESS_TOKEN_SCOPE_INSUFFICIENT"
            || reason == "insufficient_scope"
            || self.message.to_lowercase().contains("insufficient authentication scopes")
    }

    /// Daily quota exhausted; clears at the provider's reset
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(
            self.reason.as_deref(),
            Some("quotaExceeded") | Some("rateLimitExceeded") | Some("userRateLimitExceeded")
        )
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.reason) {
            (Some(status), Some(reason)) => write!(f, "{} {}: {}", status, reason, self.message),
            (Some(status), None) => write!(f, "{}: {}", status, self.message),
            (None, _) => write!(f, "{}", self.message),
        }
    }
}

/// Identity of a channel on the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDetails {
    pub external_channel_id: String,
    pub title: String,
    pub uploads_playlist_id: Option<String>,
}

/// One page of a channel's uploads
#[derive(Debug, Clone, Default)]
pub struct VideoPage {
    pub videos: Vec<RemoteVideo>,
    pub next_page_token: Option<String>,
}

/// The parts of a video's snippet that must be sent back on update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSnippet {
    pub external_video_id: String,
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub tags: Vec<String>,
}

/// Aggregate channel metrics over a date range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetrics {
    pub views: i64,
    pub estimated_minutes_watched: i64,
    pub likes: i64,
    pub subscribers_gained: i64,
}

/// Bearer-authenticated platform operations. Implementations never retry.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// The channel owning the token
    async fn own_channel(&self, token: &str) -> Result<ChannelDetails, RemoteFailure>;

    async fn channel_details(
        &self,
        token: &str,
        external_channel_id: &str,
    ) -> Result<ChannelDetails, RemoteFailure>;

    async fn list_playlist_page(
        &self,
        token: &str,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<VideoPage, RemoteFailure>;

    async fn get_video_snippet(
        &self,
        token: &str,
        external_video_id: &str,
    ) -> Result<VideoSnippet, RemoteFailure>;

    async fn update_video_snippet(
        &self,
        token: &str,
        snippet: &VideoSnippet,
    ) -> Result<(), RemoteFailure>;

    async fn search_videos(
        &self,
        token: &str,
        external_channel_id: &str,
        query: &str,
    ) -> Result<Vec<RemoteVideo>, RemoteFailure>;

    async fn delete_video(&self, token: &str, external_video_id: &str) -> Result<(), RemoteFailure>;

    async fn channel_metrics(
        &self,
        token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ChannelMetrics, RemoteFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_costs_and_pools() {
        assert!(ApiOperation::SearchList.cost() > ApiOperation::VideosList.cost());
        assert_eq!(ApiOperation::VideosUpdate.cost(), 50);
        assert_eq!(ApiOperation::AnalyticsQuery.pool(), QuotaPool::AnalyticsApi);
        assert_eq!(ApiOperation::VideosUpdate.pool(), QuotaPool::DataApi);
    }

    #[test]
    fn test_scope_detection() {
        let f = RemoteFailure::http(403, Some("insufficientPermissions".into()), "Forbidden");
        assert!(f.is_scope_insufficient());
        let f = RemoteFailure::http(
            403,
            None,
            "Request had insufficient authentication scopes.",
        );
        assert!(f.is_scope_insufficient());
        let f = RemoteFailure::http(403, Some("forbidden".into()), "Forbidden");
        assert!(!f.is_scope_insufficient());
        // Scope reasons only count on an authorization failure
        let f = RemoteFailure::http(400, Some("insufficientPermissions".into()), "Bad request");
        assert!(!f.is_scope_insufficient());
        let f = RemoteFailure::malformed("insufficient authentication scopes");
        assert!(!f.is_scope_insufficient());
    }

    #[test]
    fn test_display() {
        let f = RemoteFailure::http(404, Some("videoNotFound".into()), "Video not found");
        assert_eq!(f.to_string(), "404 videoNotFound: Video not found");
        assert_eq!(RemoteFailure::network("timed out").to_string(), "timed out");
    }
}
