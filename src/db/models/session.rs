//! Session data model.
//!
//! A session is open while `end_time` is `None`. `average_score` and
//! `duration_minutes` are only filled in when the session is closed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Checks with a successful detection; always `good_count + bad_count`.
    pub total_checks: u64,
    pub good_count: u64,
    pub bad_count: u64,
    pub average_score: Option<f64>,
    pub duration_minutes: Option<u64>,
    pub notes: Option<String>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn good_percentage(&self) -> f64 {
        percentage(self.good_count, self.total_checks)
    }

    pub fn bad_percentage(&self) -> f64 {
        percentage(self.bad_count, self.total_checks)
    }
}

/// `part / total` in percent, 0 for an empty total.
pub fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}
