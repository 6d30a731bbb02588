mod sqlite;
mod tables;

pub use sqlite::Database;
pub use tables::{AssignOutcome, ChannelConnection, InsertOutcome};
