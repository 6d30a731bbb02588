use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle of the stored OAuth credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TokenStatus {
    Valid,
    /// A refresh exchange failed; the user has to reconnect
    Invalid,
    Revoked,
}

/// Per-channel synchronization state. Only the sync orchestrator moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
}

/// A connected platform channel owned by exactly one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub user_id: i64,
    pub external_channel_id: String,
    pub title: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub token_status: TokenStatus,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Container newly discovered videos are assigned to during sync
    pub default_container_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    /// Whether the stored access token is still usable `margin_secs` from now
    pub fn token_is_fresh(&self, margin_secs: i64) -> bool {
        match self.token_expires_at {
            Some(expires_at) => expires_at > Utc::now() + chrono::Duration::seconds(margin_secs),
            None => false,
        }
    }
}
