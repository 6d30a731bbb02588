//! Per-channel synchronization guarded by a conditional status update,
//! plus the scheduler that triggers it for every channel.

mod scheduler;

pub use scheduler::{DEFAULT_SYNC_SCHEDULE, SyncScheduler};

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::gateway::QuotaGateway;
use crate::models::{Channel, ReconcileSummary, SyncStatus};
use crate::pipeline::{JobEvent, JobQueue};
use crate::plans::{Assignment, PlanLimiter};
use crate::variables::VariableStore;

/// How long a `syncing` claim holds before another worker may take it over
pub const DEFAULT_SYNC_LEASE_SECS: i64 = 30 * 60;

/// What one completed sync changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub channel_id: i64,
    pub listed: usize,
    pub discovered: Vec<i64>,
    pub missing: Vec<i64>,
    pub restored: Vec<i64>,
    /// Discovered videos placed in the channel's default container
    pub auto_assigned: Vec<i64>,
}

pub struct SyncOrchestrator {
    db: Arc<Database>,
    gateway: Arc<QuotaGateway>,
    limiter: Arc<PlanLimiter>,
    variables: Arc<VariableStore>,
    queue: Arc<dyn JobQueue>,
    lease: Duration,
}

impl SyncOrchestrator {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<QuotaGateway>,
        limiter: Arc<PlanLimiter>,
        variables: Arc<VariableStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            db,
            gateway,
            limiter,
            variables,
            queue,
            lease: Duration::seconds(DEFAULT_SYNC_LEASE_SECS),
        }
    }

    pub fn with_sync_lease(mut self, lease_secs: i64) -> Self {
        self.lease = Duration::seconds(lease_secs.max(1));
        self
    }

    /// Pull the channel's video list and reconcile it. Rejected with
    /// `AlreadySyncing` while another sync of the same channel is running.
    pub async fn sync_channel(&self, channel_id: i64) -> Result<SyncReport> {
        let channel = self
            .db
            .get_channel(channel_id)?
            .ok_or_else(|| Error::NotFound(format!("channel {}", channel_id)))?;

        let Some(started_at) = self.db.try_begin_sync(channel_id, self.lease)? else {
            log::info!("[SYNC] Channel {} is already syncing", channel_id);
            return Err(Error::AlreadySyncing(channel_id));
        };
        if channel.sync_status == SyncStatus::Syncing {
            log::warn!("[SYNC] Channel {} took over an expired sync lease", channel_id);
        }
        log::info!("[SYNC] Syncing channel {} ({})", channel_id, channel.external_channel_id);

        let result = self.run(&channel).await;

        let succeeded = result.is_ok();
        match self.db.finish_sync(channel_id, started_at, succeeded) {
            Ok(true) => {}
            Ok(false) => log::warn!(
                "[SYNC] Channel {} lease was taken over before this sync finished",
                channel_id
            ),
            Err(e) => {
                log::error!("[SYNC] Failed to record sync result for channel {}: {}", channel_id, e);
                return Err(e.into());
            }
        }

        match &result {
            Ok(report) => log::info!(
                "[SYNC] Channel {} synced: {} listed, {} new, {} missing, {} restored",
                channel_id,
                report.listed,
                report.discovered.len(),
                report.missing.len(),
                report.restored.len()
            ),
            Err(e) => log::warn!("[SYNC] Channel {} sync failed: {}", channel_id, e),
        }
        result
    }

    async fn run(&self, channel: &Channel) -> Result<SyncReport> {
        let remote = self.gateway.list_channel_videos(channel).await?;
        let ReconcileSummary {
            discovered,
            missing,
            restored,
        } = self.db.reconcile_channel_videos(channel.id, &remote)?;

        let auto_assigned = match channel.default_container_id {
            Some(container_id) => self.auto_assign(channel, container_id, &discovered)?,
            None => Vec::new(),
        };

        let mut rebuild = auto_assigned.clone();
        for id in &restored {
            if let Some(video) = self.db.get_video(*id)? {
                if video.container_id.is_some() {
                    rebuild.push(*id);
                }
            }
        }
        if !rebuild.is_empty() {
            self.queue
                .publish(JobEvent::VideosUpdate { video_ids: rebuild })
                .await?;
        }

        Ok(SyncReport {
            channel_id: channel.id,
            listed: remote.len(),
            discovered,
            missing,
            restored,
            auto_assigned,
        })
    }

    /// Place newly discovered videos in the default container until the plan
    /// limit is reached
    fn auto_assign(&self, channel: &Channel, container_id: i64, videos: &[i64]) -> Result<Vec<i64>> {
        let mut assigned = Vec::new();
        for video_id in videos {
            match self
                .limiter
                .assign_video(channel.user_id, *video_id, Some(container_id))
            {
                Ok(Assignment::Changed) => {
                    self.variables
                        .ensure_variables_for_assignment(*video_id, container_id)?;
                    assigned.push(*video_id);
                }
                Ok(_) => {}
                Err(Error::LimitReached { limit, tier, .. }) => {
                    log::warn!(
                        "[SYNC] Channel {}: stopped auto-assigning at the {} limit of {} videos",
                        channel.id,
                        tier,
                        limit
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(assigned)
    }
}
