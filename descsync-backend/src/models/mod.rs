//! Domain records persisted by the database layer

mod channel;
mod library;
mod plan;
mod usage;
mod video;

pub use channel::{Channel, SyncStatus, TokenStatus};
pub use library::{Container, Template};
pub use plan::{LimitCheck, LimitedResource, PlanTier};
pub use usage::{QuotaPool, UsageLogEntry, UsageSummary};
pub use video::{ReconcileSummary, RemoteVideo, Video, VideoVariable, VideoVariableView};
