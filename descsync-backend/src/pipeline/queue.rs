//! Outbound job queue seam

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::JobEvent;
use crate::error::{Error, Result};

/// Where the pipeline and orchestrator publish follow-up work.
/// Delivery is at-least-once; handlers are idempotent.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn publish(&self, event: JobEvent) -> Result<()>;
}

/// In-process queue backed by an unbounded tokio channel
#[derive(Clone)]
pub struct LocalQueue {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl LocalQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobQueue for LocalQueue {
    async fn publish(&self, event: JobEvent) -> Result<()> {
        log::debug!("[QUEUE] Publishing {}", event.name());
        self.tx
            .send(event)
            .map_err(|e| Error::QueueUnavailable(format!("receiver dropped, lost {}", e.0.name())))
    }
}
