//! CSV reports of stored sessions.
//!
//! Exports only read from the store. Every failure is logged and collapses to
//! `None` so callers decide how to present it.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use log::{error, info, warn};

use crate::db::{Check, Database, Session};

const IN_PROGRESS: &str = "in progress";

pub const SESSION_CHECK_HEADER: [&str; 4] = ["Time", "Posture", "Coefficient", "Detected"];
pub const HISTORY_HEADER: [&str; 9] = [
    "ID",
    "Date",
    "Start",
    "End",
    "Checks",
    "Good%",
    "Bad%",
    "AvgCoefficient",
    "Duration(min)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub include_summary: bool,
    pub include_checks: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_summary: true,
            include_checks: true,
        }
    }
}

pub fn session_file_name(session_id: i64, date: NaiveDate) -> String {
    format!("posture_session_{session_id}_{}.csv", date.format("%Y%m%d"))
}

pub fn history_file_name(date: NaiveDate) -> String {
    format!("posture_history_{}.csv", date.format("%Y%m%d"))
}

fn local(at: DateTime<Utc>) -> DateTime<Local> {
    at.with_timezone(&Local)
}

fn session_summary_rows(session: &Session, checks: &[Check]) -> Vec<[String; 2]> {
    // Open sessions have no frozen average yet.
    let average = session.average_score.unwrap_or_else(|| {
        let detected: Vec<f64> = checks
            .iter()
            .filter(|check| check.detection_successful)
            .map(|check| check.score)
            .collect();
        if detected.is_empty() {
            0.0
        } else {
            detected.iter().sum::<f64>() / detected.len() as f64
        }
    });

    let end_time = session
        .end_time
        .map(|end| local(end).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| IN_PROGRESS.to_string());
    let duration = session
        .duration_minutes
        .map(|minutes| minutes.to_string())
        .unwrap_or_else(|| IN_PROGRESS.to_string());

    vec![
        [
            "Start time".to_string(),
            local(session.start_time)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        ],
        ["End time".to_string(), end_time],
        ["Total checks".to_string(), session.total_checks.to_string()],
        ["Good posture".to_string(), session.good_count.to_string()],
        ["Bad posture".to_string(), session.bad_count.to_string()],
        [
            "Good %".to_string(),
            format!("{:.1}", session.good_percentage()),
        ],
        ["Average coefficient".to_string(), format!("{average:.3}")],
        ["Duration (min)".to_string(), duration],
    ]
}

fn check_row(check: &Check) -> [String; 4] {
    [
        local(check.timestamp).format("%H:%M:%S").to_string(),
        if check.is_good { "Good" } else { "Bad" }.to_string(),
        format!("{:.3}", check.score),
        if check.detection_successful { "Yes" } else { "No" }.to_string(),
    ]
}

fn history_row(session: &Session) -> [String; 9] {
    let start = local(session.start_time);
    [
        session.id.to_string(),
        start.format("%Y-%m-%d").to_string(),
        start.format("%H:%M:%S").to_string(),
        session
            .end_time
            .map(|end| local(end).format("%H:%M:%S").to_string())
            .unwrap_or_default(),
        session.total_checks.to_string(),
        format!("{:.1}", session.good_percentage()),
        format!("{:.1}", session.bad_percentage()),
        format!("{:.3}", session.average_score.unwrap_or(0.0)),
        session.duration_minutes.unwrap_or(0).to_string(),
    ]
}

fn open_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .with_context(|| format!("failed to create export file {}", path.display()))
}

// csv quotes an empty record as `""`, so separator lines bypass the encoder.
fn write_blank<W: Write>(writer: &mut csv::Writer<W>) -> Result<()>
where
    for<'a> &'a W: Write,
{
    writer.flush()?;
    writer.get_ref().write_all(b"\n")?;
    Ok(())
}

#[derive(Clone)]
pub struct Exporter {
    db: Database,
}

impl Exporter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Write one session report to `path`. Works for the open session too.
    pub async fn export_session(
        &self,
        session_id: i64,
        path: &Path,
        options: ExportOptions,
    ) -> Option<PathBuf> {
        match self.write_session(session_id, path, options).await {
            Ok(Some(written)) => {
                info!("Exported session {session_id} to {}", written.display());
                Some(written)
            }
            Ok(None) => {
                warn!("Export skipped: session {session_id} does not exist");
                None
            }
            Err(err) => {
                error!("Failed to export session {session_id}: {err:#}");
                None
            }
        }
    }

    /// Write one summary row per closed session to `path`.
    pub async fn export_all(&self, path: &Path) -> Option<PathBuf> {
        match self.write_history(path).await {
            Ok(Some(written)) => {
                info!("Exported session history to {}", written.display());
                Some(written)
            }
            Ok(None) => {
                warn!("Export skipped: no closed sessions");
                None
            }
            Err(err) => {
                error!("Failed to export session history: {err:#}");
                None
            }
        }
    }

    async fn write_session(
        &self,
        session_id: i64,
        path: &Path,
        options: ExportOptions,
    ) -> Result<Option<PathBuf>> {
        let Some((session, checks)) = self.db.session_with_checks(session_id).await? else {
            return Ok(None);
        };

        let mut writer = open_writer(path)?;
        writer.write_record([format!("Posture session #{session_id}")])?;
        write_blank(&mut writer)?;

        if options.include_summary {
            for row in session_summary_rows(&session, &checks) {
                writer.write_record(&row)?;
            }
        }

        if options.include_checks {
            if options.include_summary {
                write_blank(&mut writer)?;
            }
            writer.write_record(SESSION_CHECK_HEADER)?;
            for check in &checks {
                writer.write_record(&check_row(check))?;
            }
        }

        writer.flush()?;
        Ok(Some(path.to_path_buf()))
    }

    async fn write_history(&self, path: &Path) -> Result<Option<PathBuf>> {
        let sessions = self.db.list_sessions(usize::MAX).await?;
        if sessions.is_empty() {
            return Ok(None);
        }

        let mut writer = open_writer(path)?;
        writer.write_record(["Posture session history"])?;
        write_blank(&mut writer)?;
        writer.write_record(HISTORY_HEADER)?;
        for session in &sessions {
            writer.write_record(&history_row(session))?;
        }

        writer.flush()?;
        Ok(Some(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_database;

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|record| record.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn session_export_layout() {
        let (dir, db) = temp_database();
        let exporter = Exporter::new(db.clone());
        let session_id = db.start_session().await.unwrap();
        db.add_check(true, 0.08, true).await.unwrap();
        db.add_check(false, 0.16, true).await.unwrap();
        db.add_check(false, 0.0, false).await.unwrap();
        db.end_session().await.unwrap();

        let path = dir.path().join(session_file_name(session_id, Local::now().date_naive()));
        let written = exporter
            .export_session(session_id, &path, ExportOptions::default())
            .await
            .unwrap();
        assert_eq!(written, path);

        let lines = read_lines(&path);
        assert_eq!(lines[0], format!("Posture session #{session_id}"));
        assert_eq!(lines[1], "");
        assert_eq!(lines[10], "");
        assert_eq!(lines[11], "Time,Posture,Coefficient,Detected");
        assert_eq!(lines.len(), 15);

        // Blank separator lines are skipped by csv readers.
        let rows = read_rows(&path);
        let labels: Vec<&str> = rows[1..9].iter().map(|row| row[0].as_str()).collect();
        assert_eq!(
            labels,
            [
                "Start time",
                "End time",
                "Total checks",
                "Good posture",
                "Bad posture",
                "Good %",
                "Average coefficient",
                "Duration (min)"
            ]
        );
        assert_eq!(rows[3][1], "2");
        assert_eq!(rows[6][1], "50.0");
        assert_eq!(rows[7][1], "0.120");
        assert_eq!(rows[9], SESSION_CHECK_HEADER);
        assert_eq!(rows.len(), 13);
        assert_eq!(&rows[10][1..], ["Good", "0.080", "Yes"]);
        assert_eq!(&rows[12][1..], ["Bad", "0.000", "No"]);
        assert_eq!(rows[10][0].len(), "HH:MM:SS".len());
    }

    #[tokio::test]
    async fn open_session_exports_placeholders() {
        let (dir, db) = temp_database();
        let exporter = Exporter::new(db.clone());
        let session_id = db.start_session().await.unwrap();
        db.add_check(true, 0.1, true).await.unwrap();
        db.add_check(true, 0.2, true).await.unwrap();

        let path = dir.path().join("open.csv");
        exporter
            .export_session(session_id, &path, ExportOptions::default())
            .await
            .unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows[2], ["End time", IN_PROGRESS]);
        assert_eq!(rows[7], ["Average coefficient", "0.150"]);
        assert_eq!(rows[8], ["Duration (min)", IN_PROGRESS]);
        // Exporting must not close the session.
        assert!(db.open_session().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn blocks_can_be_toggled() {
        let (dir, db) = temp_database();
        let exporter = Exporter::new(db.clone());
        let session_id = db.start_session().await.unwrap();
        db.add_check(true, 0.1, true).await.unwrap();

        let checks_only = dir.path().join("checks.csv");
        let options = ExportOptions {
            include_summary: false,
            include_checks: true,
        };
        exporter
            .export_session(session_id, &checks_only, options)
            .await
            .unwrap();
        let rows = read_rows(&checks_only);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], SESSION_CHECK_HEADER);
        assert_eq!(read_lines(&checks_only).len(), 4);

        let summary_only = dir.path().join("summary.csv");
        let options = ExportOptions {
            include_summary: true,
            include_checks: false,
        };
        exporter
            .export_session(session_id, &summary_only, options)
            .await
            .unwrap();
        let rows = read_rows(&summary_only);
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[8][0], "Duration (min)");
    }

    #[tokio::test]
    async fn session_without_checks_still_exports() {
        let (dir, db) = temp_database();
        let exporter = Exporter::new(db.clone());
        let session_id = db.start_session().await.unwrap();
        db.end_session().await.unwrap();

        let path = dir.path().join("empty.csv");
        assert!(exporter
            .export_session(session_id, &path, ExportOptions::default())
            .await
            .is_some());
        let rows = read_rows(&path);
        assert_eq!(rows.last().unwrap(), &SESSION_CHECK_HEADER);
        assert_eq!(rows[3], ["Total checks", "0"]);
    }

    #[tokio::test]
    async fn history_export_rows() {
        let (dir, db) = temp_database();
        let exporter = Exporter::new(db.clone());
        let first = db.start_session().await.unwrap();
        db.add_check(true, 0.1, true).await.unwrap();
        db.add_check(false, 0.2, true).await.unwrap();
        db.add_check(false, 0.25, true).await.unwrap();
        let second = db.start_session().await.unwrap();
        db.end_session().await.unwrap();
        db.start_session().await.unwrap();

        let path = dir.path().join(history_file_name(Local::now().date_naive()));
        exporter.export_all(&path).await.unwrap();

        assert_eq!(read_lines(&path)[..2], ["Posture session history", ""]);
        let rows = read_rows(&path);
        assert_eq!(rows[1], HISTORY_HEADER);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2][0], second.to_string());
        assert_eq!(rows[3][0], first.to_string());
        assert_eq!(&rows[3][4..], ["3", "33.3", "66.7", "0.183", "0"]);
    }

    #[tokio::test]
    async fn failures_return_none() {
        let (dir, db) = temp_database();
        let exporter = Exporter::new(db.clone());

        assert!(exporter.export_all(&dir.path().join("none.csv")).await.is_none());
        assert!(exporter
            .export_session(42, &dir.path().join("missing.csv"), ExportOptions::default())
            .await
            .is_none());

        let session_id = db.start_session().await.unwrap();
        db.end_session().await.unwrap();
        let unwritable = dir.path().join("no_such_dir").join("out.csv");
        assert!(exporter
            .export_session(session_id, &unwritable, ExportOptions::default())
            .await
            .is_none());
        assert!(exporter.export_all(&unwritable).await.is_none());
    }

    #[test]
    fn default_file_names() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        assert_eq!(session_file_name(7, date), "posture_session_7_20261014.csv");
        assert_eq!(history_file_name(date), "posture_history_20261014.csv");
    }
}
