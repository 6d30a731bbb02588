use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub channel_id: i64,
    pub external_video_id: String,
    pub title: String,
    pub container_id: Option<i64>,
    /// Last description pushed to the platform
    pub description: Option<String>,
    /// Set when a sync no longer finds the video on the platform
    pub is_missing: bool,
    pub last_pushed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored value for one (video, template, variable name) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoVariable {
    pub video_id: i64,
    pub template_id: i64,
    pub name: String,
    pub value: String,
}

/// Variable row joined with the identity of its template, for display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoVariableView {
    pub template_id: i64,
    pub template_name: String,
    pub name: String,
    pub value: String,
}

/// Outcome of reconciling a channel's local videos against the platform listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub discovered: Vec<i64>,
    pub missing: Vec<i64>,
    pub restored: Vec<i64>,
}

/// A video as listed by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVideo {
    pub external_video_id: String,
    pub title: String,
}
