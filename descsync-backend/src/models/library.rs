use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reusable text block with `{{variable}}` placeholders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Named, ordered list of templates. The order is the concatenation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub template_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
