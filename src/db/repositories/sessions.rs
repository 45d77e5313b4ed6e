use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    helpers::{
        format_datetime, now, parse_datetime, parse_optional_datetime, to_limit, to_u64,
        whole_minutes,
    },
    models::{Check, Session},
    Database, StoreEvent,
};

use super::checks::insert_check;

pub const DEFAULT_SESSION_LIST_LIMIT: usize = 50;

const SESSION_COLUMNS: &str = "id, start_time, end_time, total_checks, good_posture_count, \
     bad_posture_count, average_coefficient, duration_minutes, notes";

fn row_to_session(row: &Row) -> Result<Session> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let total_checks: i64 = row.get("total_checks")?;
    let good_count: i64 = row.get("good_posture_count")?;
    let bad_count: i64 = row.get("bad_posture_count")?;
    let duration_minutes: Option<i64> = row.get("duration_minutes")?;

    Ok(Session {
        id: row.get("id")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        total_checks: to_u64(total_checks, "total_checks")?,
        good_count: to_u64(good_count, "good_posture_count")?,
        bad_count: to_u64(bad_count, "bad_posture_count")?,
        average_score: row.get("average_coefficient")?,
        duration_minutes: duration_minutes
            .map(|minutes| to_u64(minutes, "duration_minutes"))
            .transpose()?,
        notes: row.get("notes")?,
    })
}

pub(crate) fn query_session(conn: &Connection, session_id: i64) -> Result<Option<Session>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![session_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_session(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn query_closed_sessions(conn: &Connection, limit: usize) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS}
         FROM sessions
         WHERE end_time IS NOT NULL
         ORDER BY start_time DESC, id DESC
         LIMIT ?1"
    ))?;

    let mut rows = stmt.query(params![to_limit(limit)])?;
    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_session(row)?);
    }

    Ok(sessions)
}

pub(crate) fn find_open_session_id(conn: &Connection) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM sessions WHERE end_time IS NULL ORDER BY start_time DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub(crate) fn find_open_session(conn: &Connection) -> Result<Option<Session>> {
    match find_open_session_id(conn)? {
        Some(session_id) => query_session(conn, session_id),
        None => Ok(None),
    }
}

fn insert_open_session(conn: &Connection, start_time: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        "INSERT INTO sessions (start_time, total_checks, good_posture_count, bad_posture_count)
         VALUES (?1, 0, 0, 0)",
        params![format_datetime(&start_time)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Average score over successful detections; 0 when there are none.
pub(crate) fn average_detected_score(conn: &Connection, session_id: i64) -> Result<f64> {
    let average: Option<f64> = conn.query_row(
        "SELECT AVG(coefficient) FROM checks
         WHERE session_id = ?1 AND detection_successful = 1",
        params![session_id],
        |row| row.get(0),
    )?;
    Ok(average.unwrap_or(0.0))
}

/// Close a session at `end_time`, freezing its average and duration.
fn finalize_session(conn: &Connection, session_id: i64, end_time: DateTime<Utc>) -> Result<Session> {
    let session = query_session(conn, session_id)?
        .ok_or_else(|| anyhow!("session {session_id} not found"))?;
    let end_time = end_time.max(session.start_time);
    let average = average_detected_score(conn, session_id)?;
    let duration = whole_minutes(session.start_time, end_time);

    conn.execute(
        "UPDATE sessions
         SET end_time = ?1,
             duration_minutes = ?2,
             average_coefficient = ?3
         WHERE id = ?4",
        params![format_datetime(&end_time), duration as i64, average, session_id],
    )?;

    Ok(Session {
        end_time: Some(end_time),
        duration_minutes: Some(duration),
        average_score: Some(average),
        ..session
    })
}

fn close_open_sessions(conn: &Connection, end_time: DateTime<Utc>) -> Result<Vec<Session>> {
    let mut closed = Vec::new();
    while let Some(session_id) = find_open_session_id(conn)? {
        closed.push(finalize_session(conn, session_id, end_time)?);
    }
    Ok(closed)
}

impl Database {
    /// Open a new session, closing any session that is still open first.
    pub async fn start_session(&self) -> Result<i64> {
        let (session_id, closed) = self
            .transact(|tx| {
                let now = now();
                let closed = close_open_sessions(tx, now)?;
                let session_id = insert_open_session(tx, now)?;
                Ok((session_id, closed))
            })
            .await?;

        for session in closed {
            warn!("Session {} was still open; closed before starting a new one", session.id);
            self.emit(StoreEvent::SessionEnded { session });
        }
        info!("Session {session_id} started");
        self.emit(StoreEvent::SessionStarted { session_id });

        Ok(session_id)
    }

    /// Close the open session. No-op returning `None` when nothing is open.
    pub async fn end_session(&self) -> Result<Option<Session>> {
        let closed = self
            .transact(|tx| {
                let now = now();
                match find_open_session_id(tx)? {
                    Some(session_id) => finalize_session(tx, session_id, now).map(Some),
                    None => Ok(None),
                }
            })
            .await?;

        match &closed {
            Some(session) => {
                info!(
                    "Session {} ended after {} min",
                    session.id,
                    session.duration_minutes.unwrap_or(0)
                );
                self.emit(StoreEvent::SessionEnded {
                    session: session.clone(),
                });
                self.emit(StoreEvent::HistoryChanged);
            }
            None => info!("No open session to end"),
        }

        Ok(closed)
    }

    /// Append a check to the open session (opening one if needed) and bump its
    /// counters in the same transaction.
    pub async fn add_check(
        &self,
        is_good: bool,
        score: f64,
        detection_successful: bool,
    ) -> Result<Check> {
        let (check, opened) = self
            .transact(move |tx| {
                let now = now();
                let (session_id, opened) = match find_open_session_id(tx)? {
                    Some(session_id) => (session_id, false),
                    None => (insert_open_session(tx, now)?, true),
                };

                let check = insert_check(tx, session_id, now, is_good, score, detection_successful)?;

                if detection_successful {
                    let counter = if is_good {
                        "good_posture_count"
                    } else {
                        "bad_posture_count"
                    };
                    tx.execute(
                        &format!(
                            "UPDATE sessions
                             SET total_checks = total_checks + 1,
                                 {counter} = {counter} + 1
                             WHERE id = ?1"
                        ),
                        params![session_id],
                    )?;
                }

                Ok((check, opened))
            })
            .await?;

        if opened {
            info!("No open session; session {} opened for incoming check", check.session_id);
            self.emit(StoreEvent::SessionStarted {
                session_id: check.session_id,
            });
        }
        self.emit(StoreEvent::CheckAdded {
            check: check.clone(),
        });

        Ok(check)
    }

    pub async fn get_session(&self, session_id: i64) -> Result<Option<Session>> {
        self.execute(move |conn| query_session(conn, session_id))
            .await
    }

    pub async fn open_session(&self) -> Result<Option<Session>> {
        self.execute(|conn| find_open_session(conn)).await
    }

    /// Closed sessions, newest first.
    pub async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        self.execute(move |conn| query_closed_sessions(conn, limit))
            .await
    }

    /// The most recent closed sessions, capped at `DEFAULT_SESSION_LIST_LIMIT`.
    pub async fn list_recent_sessions(&self) -> Result<Vec<Session>> {
        self.list_sessions(DEFAULT_SESSION_LIST_LIMIT).await
    }

    /// Delete a session and its checks. Returns whether the session existed.
    pub async fn delete_session(&self, session_id: i64) -> Result<bool> {
        let removed = self
            .transact(move |tx| {
                tx.execute("DELETE FROM checks WHERE session_id = ?1", params![session_id])?;
                let rows_affected =
                    tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
                Ok(rows_affected > 0)
            })
            .await?;

        if removed {
            info!("Deleted session {session_id}");
            self.emit(StoreEvent::HistoryChanged);
        }
        Ok(removed)
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.transact(|tx| {
            tx.execute("DELETE FROM checks", [])?;
            tx.execute("DELETE FROM sessions", [])?;
            Ok(())
        })
        .await?;

        info!("Session history cleared");
        self.emit(StoreEvent::HistoryChanged);
        Ok(())
    }

    pub async fn update_session_note(&self, session_id: i64, note: Option<String>) -> Result<()> {
        self.transact(move |tx| {
            let rows_affected = tx.execute(
                "UPDATE sessions SET notes = ?1 WHERE id = ?2",
                params![note, session_id],
            )?;
            if rows_affected == 0 {
                return Err(anyhow!("Session not found"));
            }
            Ok(())
        })
        .await?;

        self.emit(StoreEvent::HistoryChanged);
        Ok(())
    }

    /// Close a session left open by an unclean shutdown, ending it at its last
    /// check (or its start when it has none).
    pub async fn recover_open_session(&self) -> Result<Option<Session>> {
        let recovered = self
            .transact(|tx| {
                let Some(session) = find_open_session(tx)? else {
                    return Ok(None);
                };
                let last_check: Option<String> = tx.query_row(
                    "SELECT MAX(timestamp) FROM checks WHERE session_id = ?1",
                    params![session.id],
                    |row| row.get(0),
                )?;
                let end_time = match last_check {
                    Some(raw) => parse_datetime(&raw, "timestamp")?,
                    None => session.start_time,
                };
                finalize_session(tx, session.id, end_time).map(Some)
            })
            .await?;

        if let Some(session) = &recovered {
            warn!("Recovered open session {}; closed at its last check", session.id);
            self.emit(StoreEvent::SessionEnded {
                session: session.clone(),
            });
        }
        Ok(recovered)
    }
}
