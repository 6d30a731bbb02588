//! Cron-driven fleet sync: one `channel.sync` per channel, fire-and-forget

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::oneshot;

use crate::db::Database;
use crate::error::Result;
use crate::pipeline::{JobEvent, JobQueue};

/// Top of every hour
pub const DEFAULT_SYNC_SCHEDULE: &str = "0 0 * * * *";

pub struct SyncScheduler {
    db: Arc<Database>,
    queue: Arc<dyn JobQueue>,
    schedule: Schedule,
}

impl SyncScheduler {
    pub fn new(db: Arc<Database>, queue: Arc<dyn JobQueue>, expression: &str) -> std::result::Result<Self, String> {
        let schedule = Schedule::from_str(expression)
            .map_err(|e| format!("Invalid sync schedule '{}': {}", expression, e))?;
        Ok(Self { db, queue, schedule })
    }

    /// Publish a sync for every known channel without waiting for any of them
    pub async fn enqueue_all(&self) -> Result<usize> {
        let channel_ids = self.db.list_channel_ids()?;
        for channel_id in &channel_ids {
            self.queue
                .publish(JobEvent::ChannelSync {
                    channel_id: *channel_id,
                })
                .await?;
        }
        log::info!("[SCHEDULER] Enqueued sync for {} channels", channel_ids.len());
        Ok(channel_ids.len())
    }

    pub async fn start(&self, mut shutdown_rx: oneshot::Receiver<()>) {
        log::info!("[SCHEDULER] Fleet sync scheduler started");
        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                log::warn!("[SCHEDULER] Schedule has no upcoming runs, stopping");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = &mut shutdown_rx => {
                    log::info!("[SCHEDULER] Received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.enqueue_all().await {
                        log::error!("[SCHEDULER] Fleet sync failed to enqueue: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestStack;

    #[tokio::test]
    async fn test_enqueue_all_emits_one_event_per_channel() {
        let stack = TestStack::new();
        stack.db.set_user_plan(1, crate::models::PlanTier::Pro).unwrap();
        let a = stack.connected_channel(1, "UC1", 3600).await;
        let b = stack.connected_channel(1, "UC2", 3600).await;
        let scheduler =
            SyncScheduler::new(stack.db.clone(), stack.queue.clone(), DEFAULT_SYNC_SCHEDULE).unwrap();

        assert_eq!(scheduler.enqueue_all().await.unwrap(), 2);
        assert_eq!(
            stack.queue.published(),
            vec![
                JobEvent::ChannelSync { channel_id: a.id },
                JobEvent::ChannelSync { channel_id: b.id },
            ]
        );
    }

    #[test]
    fn test_rejects_bad_expression() {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let queue = Arc::new(crate::test_support::RecordingQueue::default());
        assert!(SyncScheduler::new(db, queue, "every hour").is_err());
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let stack = TestStack::new();
        let scheduler = SyncScheduler::new(stack.db.clone(), stack.queue.clone(), DEFAULT_SYNC_SCHEDULE).unwrap();
        let (tx, rx) = oneshot::channel();
        tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), scheduler.start(rx))
            .await
            .unwrap();
    }
}
