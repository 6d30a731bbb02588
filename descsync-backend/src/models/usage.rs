use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Independently metered quota pools on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuotaPool {
    DataApi,
    AnalyticsApi,
}

/// Append-only record of one outbound platform call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLogEntry {
    pub id: i64,
    pub user_id: i64,
    pub endpoint: String,
    pub quota_pool: QuotaPool,
    pub units: i64,
    /// "ok" or the error kind the call failed with
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Units charged per pool. Pools are reported side by side, never summed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    pub data_api_units: i64,
    pub analytics_api_units: i64,
    pub calls: i64,
    pub failed_calls: i64,
}
