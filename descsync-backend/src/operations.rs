//! Boundary operations: input validation, ownership checks, and the events
//! each mutation publishes. Nothing reaches a component before these checks pass.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::db::{ChannelConnection, Database};
use crate::error::{Error, Result};
use crate::gateway::{ChannelMetrics, QuotaGateway};
use crate::models::{
    Channel, Container, LimitCheck, RemoteVideo, Template, UsageLogEntry, UsageSummary, Video,
    VideoVariable, VideoVariableView,
};
use crate::pipeline::{JobEvent, JobQueue, Pipeline};
use crate::plans::{Assignment, PlanLimiter};
use crate::sync::{SyncOrchestrator, SyncReport};
use crate::vault::CredentialVault;
use crate::variables::VariableStore;

const MAX_NAME_LEN: usize = 200;
/// Platform ceiling on description length
const MAX_TEMPLATE_LEN: usize = 5000;

/// One entry of a variables payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariableInput {
    template_id: i64,
    name: String,
    #[serde(default)]
    value: String,
}

/// Current standing against both plan ceilings
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PlanLimits {
    pub channels: LimitCheck,
    pub videos: LimitCheck,
}

/// Per-video results of a bulk assignment
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignReport {
    pub changed: Vec<i64>,
    pub unchanged: Vec<i64>,
    pub cleared: Vec<i64>,
}

pub struct Operations {
    db: Arc<Database>,
    vault: Arc<CredentialVault>,
    gateway: Arc<QuotaGateway>,
    limiter: Arc<PlanLimiter>,
    variables: Arc<VariableStore>,
    pipeline: Arc<Pipeline>,
    orchestrator: Arc<SyncOrchestrator>,
    queue: Arc<dyn JobQueue>,
}

impl Operations {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        vault: Arc<CredentialVault>,
        gateway: Arc<QuotaGateway>,
        limiter: Arc<PlanLimiter>,
        variables: Arc<VariableStore>,
        pipeline: Arc<Pipeline>,
        orchestrator: Arc<SyncOrchestrator>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            db,
            vault,
            gateway,
            limiter,
            variables,
            pipeline,
            orchestrator,
            queue,
        }
    }

    // Ownership lookups. Unknown ids are NotFound, foreign ones AccessDenied.

    fn owned_channel(&self, user_id: i64, channel_id: i64) -> Result<Channel> {
        let channel = self
            .db
            .get_channel(channel_id)?
            .ok_or_else(|| Error::NotFound(format!("channel {}", channel_id)))?;
        if channel.user_id != user_id {
            log::warn!("[OPS] User {} denied access to channel {}", user_id, channel_id);
            return Err(Error::AccessDenied);
        }
        Ok(channel)
    }

    fn owned_template(&self, user_id: i64, template_id: i64) -> Result<Template> {
        let template = self
            .db
            .get_template(template_id)?
            .ok_or_else(|| Error::NotFound(format!("template {}", template_id)))?;
        if template.user_id != user_id {
            log::warn!("[OPS] User {} denied access to template {}", user_id, template_id);
            return Err(Error::AccessDenied);
        }
        Ok(template)
    }

    fn owned_container(&self, user_id: i64, container_id: i64) -> Result<Container> {
        let container = self
            .db
            .get_container(container_id)?
            .ok_or_else(|| Error::NotFound(format!("container {}", container_id)))?;
        if container.user_id != user_id {
            log::warn!("[OPS] User {} denied access to container {}", user_id, container_id);
            return Err(Error::AccessDenied);
        }
        Ok(container)
    }

    fn owned_video(&self, user_id: i64, video_id: i64) -> Result<(Video, Channel)> {
        let video = self
            .db
            .get_video(video_id)?
            .ok_or_else(|| Error::NotFound(format!("video {}", video_id)))?;
        let channel = self.owned_channel(user_id, video.channel_id)?;
        Ok((video, channel))
    }

    fn validate_name(name: &str) -> Result<&str> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("name is required".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(Error::Validation(format!(
                "name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        Ok(name)
    }

    // Channels

    /// Complete an OAuth connection and queue the first sync
    pub async fn connect_channel(&self, user_id: i64, code: &str) -> Result<Channel> {
        if code.trim().is_empty() {
            return Err(Error::Validation("authorization code is required".to_string()));
        }

        let (token, sealed) = self.vault.exchange_code(code.trim()).await?;
        let details = self
            .gateway
            .own_channel_with_token(user_id, &token.token)
            .await?;

        let channel_id = self.limiter.connect_channel(&ChannelConnection {
            user_id,
            external_channel_id: details.external_channel_id,
            title: details.title,
            access_token: sealed.access_token,
            refresh_token: sealed.refresh_token,
            token_expires_at: sealed.expires_at,
        })?;

        self.queue.publish(JobEvent::ChannelSync { channel_id }).await?;
        self.owned_channel(user_id, channel_id)
    }

    pub fn list_channels(&self, user_id: i64) -> Result<Vec<Channel>> {
        Ok(self.db.list_channels_for_user(user_id)?)
    }

    /// Run a sync now. Rejected immediately if one is already running.
    pub async fn request_channel_sync(&self, user_id: i64, channel_id: i64) -> Result<SyncReport> {
        self.owned_channel(user_id, channel_id)?;
        self.orchestrator.sync_channel(channel_id).await
    }

    pub fn set_default_container(
        &self,
        user_id: i64,
        channel_id: i64,
        container_id: Option<i64>,
    ) -> Result<()> {
        self.owned_channel(user_id, channel_id)?;
        if let Some(container_id) = container_id {
            self.owned_container(user_id, container_id)?;
        }
        self.db.set_default_container(channel_id, container_id)?;
        Ok(())
    }

    pub async fn channel_metrics(
        &self,
        user_id: i64,
        channel_id: i64,
        start: &str,
        end: &str,
    ) -> Result<ChannelMetrics> {
        let start = parse_date("start", start)?;
        let end = parse_date("end", end)?;
        if start > end {
            return Err(Error::Validation("start must not be after end".to_string()));
        }
        let channel = self.owned_channel(user_id, channel_id)?;
        self.gateway.channel_metrics(&channel, start, end).await
    }

    pub async fn search_channel_videos(
        &self,
        user_id: i64,
        channel_id: i64,
        query: &str,
    ) -> Result<Vec<RemoteVideo>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("search query is required".to_string()));
        }
        let channel = self.owned_channel(user_id, channel_id)?;
        self.gateway.search_videos(&channel, query).await
    }

    // Templates

    pub fn list_templates(&self, user_id: i64) -> Result<Vec<Template>> {
        Ok(self.db.list_templates_for_user(user_id)?)
    }

    /// Create or edit a template. Edits propagate to every video using it.
    pub async fn save_template(
        &self,
        user_id: i64,
        template_id: Option<i64>,
        name: &str,
        content: &str,
    ) -> Result<Template> {
        let name = Self::validate_name(name)?;
        if content.chars().count() > MAX_TEMPLATE_LEN {
            return Err(Error::Validation(format!(
                "content must be at most {} characters",
                MAX_TEMPLATE_LEN
            )));
        }

        match template_id {
            None => Ok(self.db.insert_template(user_id, name, content)?),
            Some(id) => {
                self.owned_template(user_id, id)?;
                let template = self
                    .db
                    .update_template(id, name, content)?
                    .ok_or_else(|| Error::NotFound(format!("template {}", id)))?;
                self.queue
                    .publish(JobEvent::TemplateUpdated { template_id: id })
                    .await?;
                Ok(template)
            }
        }
    }

    /// Delete a template; containers that used it are rebuilt without it
    pub async fn delete_template(&self, user_id: i64, template_id: i64) -> Result<()> {
        self.owned_template(user_id, template_id)?;
        let containers = self.db.list_container_ids_with_template(template_id)?;
        self.db.delete_template(template_id)?;
        for container_id in containers {
            self.queue
                .publish(JobEvent::ContainerUpdated { container_id })
                .await?;
        }
        Ok(())
    }

    // Containers

    /// Create or edit a container. Every template must exist and belong to the user.
    pub async fn save_container(
        &self,
        user_id: i64,
        container_id: Option<i64>,
        name: &str,
        template_ids: &[i64],
    ) -> Result<Container> {
        let name = Self::validate_name(name)?;
        for template_id in template_ids {
            self.owned_template(user_id, *template_id)?;
        }
        if let Some(id) = container_id {
            self.owned_container(user_id, id)?;
        }

        let container = self
            .db
            .save_container(container_id, user_id, name, template_ids)?
            .ok_or_else(|| Error::NotFound(format!("container {}", container_id.unwrap_or_default())))?;

        if container_id.is_some() {
            for video_id in self.db.list_video_ids_for_containers(&[container.id])? {
                self.variables
                    .ensure_variables_for_assignment(video_id, container.id)?;
            }
            self.queue
                .publish(JobEvent::ContainerUpdated {
                    container_id: container.id,
                })
                .await?;
        }
        Ok(container)
    }

    /// Delete a container. Returns the videos that were detached from it;
    /// their variable values are kept.
    pub fn delete_container(&self, user_id: i64, container_id: i64) -> Result<Vec<i64>> {
        self.owned_container(user_id, container_id)?;
        let detached = self.db.delete_container(container_id)?;
        log::info!(
            "[OPS] Container {} deleted, {} videos detached",
            container_id,
            detached.len()
        );
        Ok(detached)
    }

    // Videos

    pub fn list_videos(&self, user_id: i64, channel_id: i64) -> Result<Vec<Video>> {
        self.owned_channel(user_id, channel_id)?;
        Ok(self.db.list_videos_for_channel(channel_id)?)
    }

    /// Assign videos to a container (or clear them with `None`). Videos are
    /// processed in order; on reaching the plan limit the ones already
    /// assigned stay assigned and are still rebuilt.
    pub async fn assign_container(
        &self,
        user_id: i64,
        video_ids: &[i64],
        container_id: Option<i64>,
    ) -> Result<AssignReport> {
        if video_ids.is_empty() {
            return Err(Error::Validation("at least one video is required".to_string()));
        }
        for video_id in video_ids {
            self.owned_video(user_id, *video_id)?;
        }
        if let Some(container_id) = container_id {
            self.owned_container(user_id, container_id)?;
        }

        let mut report = AssignReport::default();
        let mut failure = None;
        for video_id in video_ids {
            match self.limiter.assign_video(user_id, *video_id, container_id) {
                Ok(Assignment::Changed) => {
                    if let Some(container_id) = container_id {
                        self.variables
                            .ensure_variables_for_assignment(*video_id, container_id)?;
                    }
                    report.changed.push(*video_id);
                }
                Ok(Assignment::Unchanged) => report.unchanged.push(*video_id),
                Ok(Assignment::Cleared) => report.cleared.push(*video_id),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        self.pipeline.request_rebuild(report.changed.clone()).await?;
        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Store variable values from a JSON array of `{templateId, name, value}`
    pub async fn save_video_variables(&self, user_id: i64, video_id: i64, payload: &Value) -> Result<()> {
        let Value::Array(items) = payload else {
            return Err(Error::Validation("variables must be a JSON array".to_string()));
        };

        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let input: VariableInput = serde_json::from_value(item.clone()).map_err(|e| {
                Error::Validation(format!("variable at index {} is malformed: {}", index, e))
            })?;
            entries.push(VideoVariable {
                video_id,
                template_id: input.template_id,
                name: input.name,
                value: input.value,
            });
        }

        let (video, _) = self.owned_video(user_id, video_id)?;
        for entry in &entries {
            self.owned_template(user_id, entry.template_id)?;
        }

        self.variables.upsert_values(video_id, &entries)?;
        if video.container_id.is_some() {
            self.pipeline.request_rebuild(vec![video_id]).await?;
        }
        Ok(())
    }

    pub fn list_video_variables(&self, user_id: i64, video_id: i64) -> Result<Vec<VideoVariableView>> {
        self.owned_video(user_id, video_id)?;
        self.variables.list_for_video(video_id)
    }

    /// Delete the video on the platform, then locally
    pub async fn delete_video(&self, user_id: i64, video_id: i64) -> Result<()> {
        let (video, channel) = self.owned_video(user_id, video_id)?;
        self.gateway
            .delete_video(&channel, &video.external_video_id)
            .await?;
        self.db.delete_video(video_id)?;
        log::info!("[OPS] Video {} deleted", video.external_video_id);
        Ok(())
    }

    // Usage

    pub fn usage_summary(&self, user_id: i64, since: DateTime<Utc>) -> Result<UsageSummary> {
        Ok(self.db.usage_summary(user_id, since)?)
    }

    /// Most recent outbound calls, newest first
    pub fn recent_usage(&self, user_id: i64, limit: usize) -> Result<Vec<UsageLogEntry>> {
        Ok(self.db.list_usage(user_id, limit.clamp(1, 500))?)
    }

    pub fn plan_limits(&self, user_id: i64) -> Result<PlanLimits> {
        Ok(PlanLimits {
            channels: self.limiter.check_channel_limit(user_id)?,
            videos: self.limiter.check_video_limit(user_id)?,
        })
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("{} must be a date in YYYY-MM-DD format", field)))
}
