//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

mod channels;        // channels (credentials, sync status)
mod library;         // templates, containers, container_templates
mod sessions;        // api_sessions, user_plans
mod usage_log;       // usage_log
mod video_variables; // video_variables
mod videos;          // videos

pub use channels::{ChannelConnection, InsertOutcome};
pub use videos::AssignOutcome;
