use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted analysis tick. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub id: i64,
    pub session_id: i64,
    pub timestamp: DateTime<Utc>,
    pub is_good: bool,
    pub score: f64,
    pub detection_successful: bool,
}
