//! Append-only trial outcome stores.
//!
//! Every terminal trial produces exactly one [`TrialRecord`], appended
//! through the [`TrialLog`] trait.  Three stores are provided:
//!
//! - [`CsvTrialLog`] – one CSV file per subject, the format the study's
//!   analysis scripts read.  The header row is written once, when the file is
//!   created.
//! - [`SqliteTrialLog`] – the same columns in a local SQLite table, plus a
//!   record id and wall-clock timestamp.
//! - [`InMemoryTrialLog`] – keeps records in a `Vec`, for dry runs and tests.
//!
//! # CSV layout
//!
//! | column       | example  |
//! |--------------|----------|
//! | subject_name | `s01`    |
//! | task         | `Bookshelf` |
//! | robot        | `PandaWrist` |
//! | trial        | `3`      |
//! | success      | `True` / `2` |
//! | success_time | `12.35`  |
//! | disturbance  | `shelf_contact` or empty |

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use telestudy_types::{SuccessLevel, TeleopError, TrialRecord};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Column labels, in order.
pub const COLUMNS: [&str; 7] = [
    "subject_name",
    "task",
    "robot",
    "trial",
    "success",
    "success_time",
    "disturbance",
];

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise while persisting trial outcomes.
#[derive(Error, Debug)]
pub enum TrialLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<TrialLogError> for TeleopError {
    fn from(err: TrialLogError) -> Self {
        TeleopError::TrialLog(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TrialLog trait
// ─────────────────────────────────────────────────────────────────────────────

/// Append-only sink for trial outcomes.
pub trait TrialLog {
    /// Persist one record.  Called exactly once per terminal trial.
    fn append(&mut self, record: &TrialRecord) -> Result<(), TrialLogError>;
}

impl<T: TrialLog + ?Sized> TrialLog for Box<T> {
    fn append(&mut self, record: &TrialRecord) -> Result<(), TrialLogError> {
        (**self).append(record)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CSV
// ─────────────────────────────────────────────────────────────────────────────

/// Quote a field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut row = fields
        .into_iter()
        .map(|f| csv_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    row.push_str("\r\n");
    row
}

/// Format a record as one CSV row (including the line terminator).
pub fn record_to_csv_row(record: &TrialRecord) -> String {
    csv_row([
        record.subject_name.clone(),
        record.task.clone(),
        record.robot.clone(),
        record.trial.to_string(),
        record.success.to_string(),
        record.success_time.to_string(),
        record.disturbance.clone(),
    ])
}

/// CSV-backed trial log.
#[derive(Debug)]
pub struct CsvTrialLog {
    path: PathBuf,
}

impl CsvTrialLog {
    /// Open the CSV file at `path`, creating it (and its parent directory)
    /// with a header row when it does not exist yet.  An existing file is
    /// appended to without rewriting the header.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TrialLogError> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create_new(true).write(true).open(&path)?;
            file.write_all(csv_row(COLUMNS).as_bytes())?;
            info!(path = %path.display(), "created trial log");
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrialLog for CsvTrialLog {
    fn append(&mut self, record: &TrialRecord) -> Result<(), TrialLogError> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(record_to_csv_row(record).as_bytes())?;
        debug!(task = %record.task, robot = %record.robot, trial = record.trial, "trial appended to csv");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

/// A record as read back from [`SqliteTrialLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrial {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub record: TrialRecord,
}

/// SQLite-backed trial log.
pub struct SqliteTrialLog {
    conn: Connection,
}

impl SqliteTrialLog {
    /// Open (or create) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrialLogError> {
        let log = Self {
            conn: Connection::open(path)?,
        };
        log.init_schema()?;
        Ok(log)
    }

    /// Open a temporary in-memory database.
    pub fn open_in_memory() -> Result<Self, TrialLogError> {
        let log = Self {
            conn: Connection::open_in_memory()?,
        };
        log.init_schema()?;
        Ok(log)
    }

    fn init_schema(&self) -> Result<(), TrialLogError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS trial_records (
                id            TEXT NOT NULL PRIMARY KEY,
                recorded_at   TEXT NOT NULL,
                subject_name  TEXT NOT NULL,
                task          TEXT NOT NULL,
                robot         TEXT NOT NULL,
                trial         INTEGER NOT NULL,
                success       TEXT NOT NULL,
                success_level TEXT NOT NULL,
                success_time  REAL NOT NULL,
                disturbance   TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Every stored record in insertion order.
    pub fn records(&self) -> Result<Vec<StoredTrial>, TrialLogError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recorded_at, subject_name, task, robot, trial,
                    success_level, success_time, disturbance
             FROM trial_records
             ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, recorded_at, subject_name, task, robot, trial, level, success_time, disturbance) = row?;
            let id = Uuid::parse_str(&id)
                .map_err(|e| rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Text))?;
            let recorded_at = recorded_at.parse::<DateTime<Utc>>().map_err(|e| {
                rusqlite::Error::InvalidColumnType(1, e.to_string(), rusqlite::types::Type::Text)
            })?;
            let success: SuccessLevel = serde_json::from_str(&level)?;
            out.push(StoredTrial {
                id,
                recorded_at,
                record: TrialRecord {
                    subject_name,
                    task,
                    robot,
                    trial,
                    success,
                    success_time,
                    disturbance,
                },
            });
        }
        Ok(out)
    }
}

impl TrialLog for SqliteTrialLog {
    fn append(&mut self, record: &TrialRecord) -> Result<(), TrialLogError> {
        self.conn.execute(
            "INSERT INTO trial_records
                 (id, recorded_at, subject_name, task, robot, trial,
                  success, success_level, success_time, disturbance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                Uuid::new_v4().to_string(),
                Utc::now().to_rfc3339(),
                record.subject_name,
                record.task,
                record.robot,
                record.trial,
                record.success.to_string(),
                serde_json::to_string(&record.success)?,
                record.success_time,
                record.disturbance,
            ],
        )?;
        debug!(task = %record.task, robot = %record.robot, trial = record.trial, "trial appended to sqlite");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps records in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTrialLog {
    records: Vec<TrialRecord>,
}

impl InMemoryTrialLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }
}

impl TrialLog for InMemoryTrialLog {
    fn append(&mut self, record: &TrialRecord) -> Result<(), TrialLogError> {
        self.records.push(record.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(task: &str, trial: u32, success: SuccessLevel, disturbance: &str) -> TrialRecord {
        TrialRecord {
            subject_name: "s01".to_string(),
            task: task.to_string(),
            robot: "PandaWrist".to_string(),
            trial,
            success,
            success_time: 12.5,
            disturbance: disturbance.to_string(),
        }
    }

    #[test]
    fn csv_header_written_once_on_creation() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("data").join("s01.csv");

        let mut log = CsvTrialLog::open(&path).expect("open");
        log.append(&record("DrawerPick", 1, SuccessLevel::Binary(true), ""))
            .expect("append");
        // Reopening an existing file must not repeat the header.
        let mut log = CsvTrialLog::open(&path).expect("reopen");
        log.append(&record("ConstrainedReorient", 2, SuccessLevel::Graded(2), ""))
            .expect("append");

        let text = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(
            lines,
            vec![
                "subject_name,task,robot,trial,success,success_time,disturbance",
                "s01,DrawerPick,PandaWrist,1,True,12.5,",
                "s01,ConstrainedReorient,PandaWrist,2,2,12.5,",
            ]
        );
    }

    #[test]
    fn csv_quotes_fields_with_delimiters() {
        let row = record_to_csv_row(&record("Bookshelf", 4, SuccessLevel::Binary(false), "shelf, \"top\""));
        assert!(row.ends_with(",\"shelf, \"\"top\"\"\"\r\n"));
    }

    #[test]
    fn sqlite_round_trips_task_specific_success_scale() {
        let mut log = SqliteTrialLog::open_in_memory().expect("open");
        log.append(&record("ConstrainedReorient", 1, SuccessLevel::Graded(1), ""))
            .expect("append");
        log.append(&record("Bookshelf", 2, SuccessLevel::Binary(true), "shelf_contact"))
            .expect("append");

        let stored = log.records().expect("records");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].record.success, SuccessLevel::Graded(1));
        assert_eq!(stored[1].record.success, SuccessLevel::Binary(true));
        assert_eq!(stored[1].record.disturbance, "shelf_contact");
        assert_ne!(stored[0].id, stored[1].id);
    }

    #[test]
    fn sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("s01.sqlite");
        {
            let mut log = SqliteTrialLog::open(&path).expect("open");
            log.append(&record("DrawerPick", 1, SuccessLevel::Binary(false), ""))
                .expect("append");
        }
        let log = SqliteTrialLog::open(&path).expect("reopen");
        assert_eq!(log.records().expect("records").len(), 1);
    }

    #[test]
    fn in_memory_log_keeps_order() {
        let mut log = InMemoryTrialLog::new();
        log.append(&record("A", 1, SuccessLevel::Binary(true), "")).unwrap();
        log.append(&record("B", 2, SuccessLevel::Binary(false), "")).unwrap();
        let tasks: Vec<&str> = log.records().iter().map(|r| r.task.as_str()).collect();
        assert_eq!(tasks, vec!["A", "B"]);
    }

    #[test]
    fn log_errors_convert_to_trial_log_error() {
        let err: TeleopError = TrialLogError::Io(std::io::Error::other("disk full")).into();
        assert!(matches!(err, TeleopError::TrialLog(ref m) if m.contains("disk full")));
    }
}
