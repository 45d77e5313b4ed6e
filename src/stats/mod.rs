mod types;

pub use types::{BestSession, ComparisonPoint, CurrentSessionStats, OverallStats};

use anyhow::Result;
use chrono::{Local, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    helpers::{parse_datetime, to_u64, whole_minutes},
    percentage, Database,
};

/// Read-only aggregates over the session store.
#[derive(Clone)]
pub struct StatsAggregator {
    db: Database,
}

fn query_current(conn: &Connection) -> Result<CurrentSessionStats> {
    let open = conn
        .query_row(
            "SELECT id, start_time, total_checks, good_posture_count, bad_posture_count
             FROM sessions
             WHERE end_time IS NULL
             ORDER BY start_time DESC
             LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((session_id, start_time, total, good, bad)) = open else {
        return Ok(CurrentSessionStats::default());
    };

    let start_time = parse_datetime(&start_time, "start_time")?;
    let average: Option<f64> = conn.query_row(
        "SELECT AVG(coefficient) FROM checks
         WHERE session_id = ?1 AND detection_successful = 1",
        params![session_id],
        |row| row.get(0),
    )?;
    let total_checks = to_u64(total, "total_checks")?;
    let good_count = to_u64(good, "good_posture_count")?;

    Ok(CurrentSessionStats {
        session_id: Some(session_id),
        start_time: Some(start_time),
        total_checks,
        good_count,
        bad_count: to_u64(bad, "bad_posture_count")?,
        good_percentage: percentage(good_count, total_checks),
        average_score: average.unwrap_or(0.0),
        duration_minutes: whole_minutes(start_time, Utc::now()),
    })
}

fn query_overall(conn: &Connection) -> Result<OverallStats> {
    let (session_count, total, good, bad, average, minutes) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(total_checks), 0),
                COALESCE(SUM(good_posture_count), 0),
                COALESCE(SUM(bad_posture_count), 0),
                AVG(average_coefficient),
                COALESCE(SUM(duration_minutes), 0)
         FROM sessions
         WHERE end_time IS NOT NULL",
        [],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, i64>(5)?,
            ))
        },
    )?;

    let best = conn
        .query_row(
            "SELECT id, start_time, good_posture_count * 100.0 / total_checks AS pct
             FROM sessions
             WHERE end_time IS NOT NULL AND total_checks > 0
             ORDER BY pct DESC, start_time DESC, id DESC
             LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )
        .optional()?;

    let best_session = best
        .map(|(session_id, start_time, good_percentage)| {
            Ok::<_, anyhow::Error>(BestSession {
                session_id,
                start_time: parse_datetime(&start_time, "start_time")?,
                good_percentage,
            })
        })
        .transpose()?;

    let total_checks = to_u64(total, "total_checks")?;
    let total_good = to_u64(good, "good_posture_count")?;

    Ok(OverallStats {
        session_count: to_u64(session_count, "session_count")?,
        total_checks,
        total_good,
        total_bad: to_u64(bad, "bad_posture_count")?,
        good_percentage: percentage(total_good, total_checks),
        overall_average_score: average.unwrap_or(0.0),
        total_hours: to_u64(minutes, "duration_minutes")? as f64 / 60.0,
        best_session,
    })
}

impl StatsAggregator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn current_session_stats(&self) -> Result<CurrentSessionStats> {
        self.db.execute(|conn| query_current(conn)).await
    }

    /// Totals across closed sessions. The open session is not included.
    pub async fn overall_stats(&self) -> Result<OverallStats> {
        self.db.execute(|conn| query_overall(conn)).await
    }

    /// The last `count` closed sessions, oldest first.
    pub async fn comparison_series(&self, count: usize) -> Result<Vec<ComparisonPoint>> {
        let mut sessions = self.db.list_sessions(count).await?;
        sessions.reverse();

        Ok(sessions
            .into_iter()
            .map(|session| ComparisonPoint {
                session_id: session.id,
                date: session.start_time.with_timezone(&Local).date_naive(),
                good_percentage: session.good_percentage(),
                average_score: session.average_score.unwrap_or(0.0),
                total_checks: session.total_checks,
            })
            .collect())
    }
}
