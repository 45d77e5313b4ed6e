use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    helpers::{format_datetime, parse_datetime},
    models::{Check, Session},
    Database,
};

use super::sessions::{find_open_session_id, query_session};

pub(crate) fn row_to_check(row: &Row) -> Result<Check> {
    let timestamp: String = row.get("timestamp")?;

    Ok(Check {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        is_good: row.get("is_good_posture")?,
        score: row.get("coefficient")?,
        detection_successful: row.get("detection_successful")?,
    })
}

pub(crate) fn insert_check(
    conn: &Connection,
    session_id: i64,
    timestamp: DateTime<Utc>,
    is_good: bool,
    score: f64,
    detection_successful: bool,
) -> Result<Check> {
    conn.execute(
        "INSERT INTO checks (session_id, timestamp, is_good_posture, coefficient, detection_successful)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            session_id,
            format_datetime(&timestamp),
            is_good,
            score,
            detection_successful,
        ],
    )?;

    Ok(Check {
        id: conn.last_insert_rowid(),
        session_id,
        timestamp,
        is_good,
        score,
        detection_successful,
    })
}

pub(crate) fn checks_for_session(conn: &Connection, session_id: i64) -> Result<Vec<Check>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, timestamp, is_good_posture, coefficient, detection_successful
         FROM checks
         WHERE session_id = ?1
         ORDER BY timestamp ASC, id ASC",
    )?;

    let mut rows = stmt.query(params![session_id])?;
    let mut checks = Vec::new();
    while let Some(row) = rows.next()? {
        checks.push(row_to_check(row)?);
    }

    Ok(checks)
}

impl Database {
    pub async fn get_session_checks(&self, session_id: i64) -> Result<Vec<Check>> {
        self.execute(move |conn| checks_for_session(conn, session_id))
            .await
    }

    /// A session and its checks from one read transaction, so the counters
    /// always match the rows even while monitoring appends to it.
    pub async fn session_with_checks(
        &self,
        session_id: i64,
    ) -> Result<Option<(Session, Vec<Check>)>> {
        self.transact(move |tx| {
            let Some(session) = query_session(tx, session_id)? else {
                return Ok(None);
            };
            let checks = checks_for_session(tx, session_id)?;
            Ok(Some((session, checks)))
        })
        .await
    }

    /// Checks of the open session, empty when none is open.
    pub async fn current_session_checks(&self) -> Result<Vec<Check>> {
        self.execute(|conn| match find_open_session_id(conn)? {
            Some(session_id) => checks_for_session(conn, session_id),
            None => Ok(Vec::new()),
        })
        .await
    }
}
