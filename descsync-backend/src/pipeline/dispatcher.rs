//! Consumes job events and routes each to its handler

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::{JobEvent, Pipeline};
use crate::error::{Error, Result};
use crate::sync::SyncOrchestrator;

pub struct JobDispatcher {
    pipeline: Arc<Pipeline>,
    sync: Arc<SyncOrchestrator>,
}

impl JobDispatcher {
    pub fn new(pipeline: Arc<Pipeline>, sync: Arc<SyncOrchestrator>) -> Self {
        Self { pipeline, sync }
    }

    /// Handle one event to completion
    pub async fn dispatch(&self, event: JobEvent) -> Result<()> {
        match event {
            JobEvent::ChannelSync { channel_id } => {
                self.sync.sync_channel(channel_id).await?;
                Ok(())
            }
            JobEvent::VideosUpdate { video_ids } => {
                self.pipeline.rebuild_videos(&video_ids).await;
                Ok(())
            }
            JobEvent::ContainerUpdated { container_id } => {
                let videos = self.pipeline.on_container_updated(container_id)?;
                self.pipeline.request_rebuild(videos).await
            }
            JobEvent::TemplateUpdated { template_id } => {
                let videos = self.pipeline.on_template_updated(template_id)?;
                self.pipeline.request_rebuild(videos).await
            }
        }
    }

    /// Worker loop. Each event runs in its own task so a long sync never
    /// holds up unrelated rebuilds.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<JobEvent>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        log::info!("[DISPATCH] Job worker started");
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    log::info!("[DISPATCH] Job worker received shutdown signal");
                    break;
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        log::info!("[DISPATCH] Job queue closed");
                        break;
                    };
                    let dispatcher = Arc::clone(&self);
                    tokio::spawn(async move {
                        let name = event.name();
                        match dispatcher.dispatch(event).await {
                            Ok(()) => {}
                            Err(Error::AlreadySyncing(id)) => {
                                log::info!("[DISPATCH] Channel {} already syncing, dropped {}", id, name)
                            }
                            Err(e) if e.requires_reconnect() => {
                                log::warn!("[DISPATCH] {} needs the channel reconnected: {}", name, e)
                            }
                            Err(e) if e.is_retryable() => {
                                log::warn!("[DISPATCH] {} hit a transient failure: {}", name, e)
                            }
                            Err(e) => log::error!("[DISPATCH] {} failed: {}", name, e),
                        }
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{JobQueue, LocalQueue};
    use crate::test_support::TestStack;

    #[tokio::test]
    async fn test_template_event_fans_out_to_videos_update() {
        let stack = TestStack::new();
        let channel = stack.connected_channel(1, "UC1", 3600).await;
        let videos = stack.discovered_videos(&channel, 2);
        let t = stack.template(1, "a", "x");
        let c = stack.container(1, "main", &[t.id]);
        stack.limiter.assign_video(1, videos[0], Some(c.id)).unwrap();
        stack.limiter.assign_video(1, videos[1], Some(c.id)).unwrap();

        stack
            .dispatcher
            .dispatch(JobEvent::TemplateUpdated { template_id: t.id })
            .await
            .unwrap();

        assert_eq!(
            stack.queue.published(),
            vec![JobEvent::VideosUpdate {
                video_ids: videos.clone()
            }]
        );
    }

    #[tokio::test]
    async fn test_unused_container_publishes_nothing() {
        let stack = TestStack::new();
        let c = stack.container(1, "empty", &[]);
        stack
            .dispatcher
            .dispatch(JobEvent::ContainerUpdated { container_id: c.id })
            .await
            .unwrap();
        assert!(stack.queue.published().is_empty());
    }

    #[tokio::test]
    async fn test_worker_drains_queue_until_shutdown() {
        let stack = TestStack::new();
        let channel = stack.connected_channel(1, "UC1", 3600).await;
        stack.platform.add_video("UC1", "v1", "Video");

        let (queue, rx) = LocalQueue::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = tokio::spawn(stack.dispatcher.clone().run(rx, shutdown_rx));

        queue
            .publish(JobEvent::ChannelSync {
                channel_id: channel.id,
            })
            .await
            .unwrap();

        let mut synced = false;
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let current = stack.db.get_channel(channel.id).unwrap().unwrap();
            if current.last_synced_at.is_some() {
                synced = true;
                break;
            }
        }
        assert!(synced);

        shutdown_tx.send(()).unwrap();
        worker.await.unwrap();
    }
}
