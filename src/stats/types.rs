use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Live view of the open session. All zero when nothing is open.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSessionStats {
    pub session_id: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub total_checks: u64,
    pub good_count: u64,
    pub bad_count: u64,
    pub good_percentage: f64,
    pub average_score: f64,
    pub duration_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestSession {
    pub session_id: i64,
    pub start_time: DateTime<Utc>,
    pub good_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub session_count: u64,
    pub total_checks: u64,
    pub total_good: u64,
    pub total_bad: u64,
    pub good_percentage: f64,
    pub overall_average_score: f64,
    pub total_hours: f64,
    pub best_session: Option<BestSession>,
}

/// One closed session reduced for trend charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonPoint {
    pub session_id: i64,
    pub date: NaiveDate,
    pub good_percentage: f64,
    pub average_score: f64,
    pub total_checks: u64,
}
