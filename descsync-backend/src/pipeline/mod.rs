//! Change propagation: fans template and container edits out to the videos
//! they affect, then recomposes and pushes each video's description.

mod dispatcher;
mod events;
mod queue;

pub use dispatcher::JobDispatcher;
pub use events::JobEvent;
pub use queue::{JobQueue, LocalQueue};

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use crate::composer::{self, SystemDefaults};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::gateway::QuotaGateway;
use crate::variables::VariableStore;

pub const DEFAULT_REBUILD_CONCURRENCY: usize = 4;

/// Why a video was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    VideoNotFound,
    Unassigned,
    /// The platform no longer lists the video
    Missing,
    /// The container has no templates; pushing would blank the description
    EmptyContainer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VideoOutcome {
    Updated { description: String },
    Skipped(SkipReason),
    Failed(Error),
}

/// Per-video outcomes of one `videos.update` batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub updated: Vec<i64>,
    pub skipped: Vec<i64>,
    pub failed: Vec<(i64, Error)>,
}

impl BatchReport {
    fn record(&mut self, video_id: i64, outcome: VideoOutcome) {
        match outcome {
            VideoOutcome::Updated { .. } => self.updated.push(video_id),
            VideoOutcome::Skipped(_) => self.skipped.push(video_id),
            VideoOutcome::Failed(e) => self.failed.push((video_id, e)),
        }
    }
}

pub struct Pipeline {
    db: Arc<Database>,
    gateway: Arc<QuotaGateway>,
    variables: Arc<VariableStore>,
    queue: Arc<dyn JobQueue>,
    separator: String,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<QuotaGateway>,
        variables: Arc<VariableStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            db,
            gateway,
            variables,
            queue,
            separator: composer::DEFAULT_SEPARATOR.to_string(),
            concurrency: DEFAULT_REBUILD_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Every video assigned to a container that uses the template
    pub fn on_template_updated(&self, template_id: i64) -> Result<Vec<i64>> {
        let containers = self.db.list_container_ids_with_template(template_id)?;
        let videos = self.db.list_video_ids_for_containers(&containers)?;
        log::info!(
            "[PIPELINE] Template {} affects {} containers, {} videos",
            template_id,
            containers.len(),
            videos.len()
        );
        Ok(videos)
    }

    pub fn on_container_updated(&self, container_id: i64) -> Result<Vec<i64>> {
        let videos = self.db.list_video_ids_for_containers(&[container_id])?;
        log::info!(
            "[PIPELINE] Container {} affects {} videos",
            container_id,
            videos.len()
        );
        Ok(videos)
    }

    /// Publish a rebuild for the given videos, if there are any
    pub async fn request_rebuild(&self, video_ids: Vec<i64>) -> Result<()> {
        if video_ids.is_empty() {
            return Ok(());
        }
        self.queue
            .publish(JobEvent::VideosUpdate { video_ids })
            .await
    }

    /// Rebuild a batch. Videos are independent: one failure never stops the rest.
    pub async fn rebuild_videos(&self, video_ids: &[i64]) -> BatchReport {
        let outcomes: Vec<(i64, VideoOutcome)> = stream::iter(video_ids.iter().copied())
            .map(|id| async move { (id, self.rebuild_video(id).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (id, outcome) in outcomes {
            report.record(id, outcome);
        }
        log::info!(
            "[PIPELINE] Batch of {}: {} updated, {} skipped, {} failed",
            video_ids.len(),
            report.updated.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    /// Backfill, compose and push one video's description
    pub async fn rebuild_video(&self, video_id: i64) -> VideoOutcome {
        let outcome = match self.try_rebuild(video_id).await {
            Ok(outcome) => outcome,
            Err(e) => VideoOutcome::Failed(e),
        };
        match &outcome {
            VideoOutcome::Updated { .. } => {
                log::info!("[PIPELINE] Video {} description pushed", video_id)
            }
            VideoOutcome::Skipped(reason) => {
                log::debug!("[PIPELINE] Video {} skipped: {:?}", video_id, reason)
            }
            VideoOutcome::Failed(e) => log::warn!(
                "[PIPELINE] Video {} failed ({}): {}",
                video_id,
                e.kind(),
                e
            ),
        }
        outcome
    }

    async fn try_rebuild(&self, video_id: i64) -> Result<VideoOutcome> {
        let Some(video) = self.db.get_video(video_id)? else {
            return Ok(VideoOutcome::Skipped(SkipReason::VideoNotFound));
        };
        let Some(container_id) = video.container_id else {
            return Ok(VideoOutcome::Skipped(SkipReason::Unassigned));
        };
        if video.is_missing {
            return Ok(VideoOutcome::Skipped(SkipReason::Missing));
        }

        let templates = self.db.list_container_templates(container_id)?;
        if templates.is_empty() {
            return Ok(VideoOutcome::Skipped(SkipReason::EmptyContainer));
        }

        self.variables.ensure_for_templates(video.id, &templates)?;
        let values = self.variables.values_by_template(video.id)?;
        let description = compose_for_video(
            &templates,
            &values,
            &self.separator,
            &SystemDefaults::for_video(&video.external_video_id),
        );

        let channel = self
            .db
            .get_channel(video.channel_id)?
            .ok_or(Error::NotConnected)?;
        self.gateway
            .update_video_description(&channel, &video.external_video_id, &description)
            .await?;
        self.db.record_video_pushed(video.id, &description)?;

        Ok(VideoOutcome::Updated { description })
    }
}

/// Each template is substituted with the values stored under its own id
fn compose_for_video(
    templates: &[crate::models::Template],
    values: &HashMap<i64, HashMap<String, String>>,
    separator: &str,
    defaults: &SystemDefaults,
) -> String {
    let empty = HashMap::new();
    let parts: Vec<(&str, &HashMap<String, String>)> = templates
        .iter()
        .map(|t| (t.content.as_str(), values.get(&t.id).unwrap_or(&empty)))
        .collect();
    composer::compose_scoped(&parts, separator, defaults)
}
