//! Quota-aware gateway: every platform call is authenticated through the vault,
//! charged against its quota pool, and mapped into the error taxonomy.

pub mod platform;
pub mod youtube;

pub use platform::{
    ApiOperation, ChannelDetails, ChannelMetrics, PlatformApi, RemoteFailure, VideoPage,
    VideoSnippet,
};
pub use youtube::YouTubeClient;

use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Channel, RemoteVideo};
use crate::vault::CredentialVault;

/// Upper bound on playlist pages fetched per listing
const MAX_PLAYLIST_PAGES: usize = 200;

/// Translate a wire-level failure into the error taxonomy
pub fn map_remote_failure(failure: &RemoteFailure) -> Error {
    if failure.network {
        return Error::RemoteTransient(failure.message.clone());
    }
    if failure.is_scope_insufficient() {
        return Error::ScopeInsufficient;
    }
    if failure.is_quota_exceeded() {
        return Error::RemoteTransient(failure.to_string());
    }
    match failure.status {
        Some(404) => Error::RemoteNotFound(failure.message.clone()),
        Some(429) => Error::RemoteTransient(failure.to_string()),
        Some(s) if s >= 500 => Error::RemoteTransient(failure.to_string()),
        status => Error::RemoteError {
            status,
            message: failure.message.clone(),
        },
    }
}

pub struct QuotaGateway {
    db: Arc<Database>,
    vault: Arc<CredentialVault>,
    api: Arc<dyn PlatformApi>,
}

impl QuotaGateway {
    pub fn new(db: Arc<Database>, vault: Arc<CredentialVault>, api: Arc<dyn PlatformApi>) -> Self {
        Self { db, vault, api }
    }

    /// Run one platform call, charging its cost whether or not it succeeds
    async fn metered<T, F>(&self, user_id: i64, op: ApiOperation, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, RemoteFailure>>,
    {
        let result = call.await.map_err(|failure| {
            log::warn!("[GATEWAY] {} failed: {}", op.endpoint(), failure);
            map_remote_failure(&failure)
        });

        let status = match &result {
            Ok(_) => {
                log::info!("[GATEWAY] {} ok, {} units", op.endpoint(), op.cost());
                "ok"
            }
            Err(e) => e.kind(),
        };
        if let Err(e) = self
            .db
            .record_usage(user_id, op.endpoint(), op.pool(), op.cost(), status)
        {
            log::error!("[GATEWAY] Failed to record usage for {}: {}", op.endpoint(), e);
        }

        result
    }

    async fn token_for(&self, channel: &Channel) -> Result<String> {
        let access = self.vault.get_valid_token(channel.id).await?;
        log::debug!(
            "[GATEWAY] Using token for channel {} valid until {}",
            channel.id,
            access.expires_at
        );
        Ok(access.token)
    }

    /// Identify the channel that owns a freshly granted token
    pub async fn own_channel_with_token(&self, user_id: i64, token: &str) -> Result<ChannelDetails> {
        self.metered(user_id, ApiOperation::ChannelsList, self.api.own_channel(token))
            .await
    }

    /// Every video in the channel's uploads, following pagination
    pub async fn list_channel_videos(&self, channel: &Channel) -> Result<Vec<RemoteVideo>> {
        let token = self.token_for(channel).await?;
        let details = self
            .metered(
                channel.user_id,
                ApiOperation::ChannelsList,
                self.api.channel_details(&token, &channel.external_channel_id),
            )
            .await?;

        let Some(playlist_id) = details.uploads_playlist_id else {
            log::info!(
                "[GATEWAY] Channel {} has no uploads playlist",
                channel.external_channel_id
            );
            return Ok(Vec::new());
        };

        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_PLAYLIST_PAGES {
            let page = self
                .metered(
                    channel.user_id,
                    ApiOperation::PlaylistItemsList,
                    self.api
                        .list_playlist_page(&token, &playlist_id, page_token.as_deref()),
                )
                .await?;
            videos.extend(page.videos);
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => return Ok(videos),
            }
        }

        log::warn!(
            "[GATEWAY] Stopped listing channel {} after {} pages",
            channel.external_channel_id,
            MAX_PLAYLIST_PAGES
        );
        Ok(videos)
    }

    pub async fn get_video(&self, channel: &Channel, external_video_id: &str) -> Result<VideoSnippet> {
        let token = self.token_for(channel).await?;
        self.metered(
            channel.user_id,
            ApiOperation::VideosList,
            self.api.get_video_snippet(&token, external_video_id),
        )
        .await
    }

    /// Replace the remote description, keeping the rest of the snippet as it is
    pub async fn update_video_description(
        &self,
        channel: &Channel,
        external_video_id: &str,
        description: &str,
    ) -> Result<()> {
        let token = self.token_for(channel).await?;
        let mut snippet = self
            .metered(
                channel.user_id,
                ApiOperation::VideosList,
                self.api.get_video_snippet(&token, external_video_id),
            )
            .await?;
        snippet.description = description.to_string();

        self.metered(
            channel.user_id,
            ApiOperation::VideosUpdate,
            self.api.update_video_snippet(&token, &snippet),
        )
        .await
    }

    pub async fn search_videos(&self, channel: &Channel, query: &str) -> Result<Vec<RemoteVideo>> {
        let token = self.token_for(channel).await?;
        self.metered(
            channel.user_id,
            ApiOperation::SearchList,
            self.api
                .search_videos(&token, &channel.external_channel_id, query),
        )
        .await
    }

    pub async fn delete_video(&self, channel: &Channel, external_video_id: &str) -> Result<()> {
        let token = self.token_for(channel).await?;
        self.metered(
            channel.user_id,
            ApiOperation::VideosDelete,
            self.api.delete_video(&token, external_video_id),
        )
        .await
    }

    pub async fn channel_metrics(
        &self,
        channel: &Channel,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ChannelMetrics> {
        let token = self.token_for(channel).await?;
        self.metered(
            channel.user_id,
            ApiOperation::AnalyticsQuery,
            self.api.channel_metrics(&token, start, end),
        )
        .await
    }
}
