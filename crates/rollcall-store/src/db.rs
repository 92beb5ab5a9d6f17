//! SQLite attendance database: enrolled students and daily attendance marks.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS students (
    name TEXT PRIMARY KEY NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance_records (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL,
    date      TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS attendance_records_name_date
    ON attendance_records (name, date);
"#;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("student already enrolled: {0}")]
    AlreadyEnrolled(String),
}

/// One attendance mark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub date: String,
    pub timestamp: String,
}

/// What happened when marking attendance.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkOutcome {
    Recorded(AttendanceRecord),
    AlreadyRecorded,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let db = Self::init(conn)?;
        tracing::info!(path = %path.display(), "attendance database opened");
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn student_exists(&self, name: &str) -> Result<bool, DbError> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM students WHERE name = ?1", params![name], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a student; a duplicate name is [`DbError::AlreadyEnrolled`].
    pub fn add_student(&self, name: &str) -> Result<(), DbError> {
        let inserted = self.conn.execute(
            "INSERT INTO students (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
            params![name],
        )?;
        if inserted == 0 {
            return Err(DbError::AlreadyEnrolled(name.to_string()));
        }
        tracing::debug!(name, "student inserted");
        Ok(())
    }

    /// Undo a half-finished enrollment. Returns whether a row was removed.
    pub fn remove_student(&self, name: &str) -> Result<bool, DbError> {
        let removed = self
            .conn
            .execute("DELETE FROM students WHERE name = ?1", params![name])?;
        Ok(removed > 0)
    }

    pub fn students(&self) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare("SELECT name FROM students ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Record `name` as present on the day of `now`, at most once per day.
    ///
    /// The unique (name, date) index makes the existence check and the insert
    /// a single atomic statement.
    pub fn mark_attendance(&self, name: &str, now: NaiveDateTime) -> Result<MarkOutcome, DbError> {
        let record = AttendanceRecord {
            name: name.to_string(),
            date: now.format(DATE_FORMAT).to_string(),
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
        };

        let inserted = self.conn.execute(
            "INSERT INTO attendance_records (name, date, timestamp) VALUES (?1, ?2, ?3)
             ON CONFLICT(name, date) DO NOTHING",
            params![record.name, record.date, record.timestamp],
        )?;

        if inserted == 0 {
            return Ok(MarkOutcome::AlreadyRecorded);
        }
        Ok(MarkOutcome::Recorded(record))
    }

    /// All records, or only those of `date`, ordered by date then timestamp.
    pub fn attendance(&self, date: Option<NaiveDate>) -> Result<Vec<AttendanceRecord>, DbError> {
        let date = date.map(|d| d.format(DATE_FORMAT).to_string());
        let mut stmt = self.conn.prepare(
            "SELECT name, date, timestamp FROM attendance_records
             WHERE ?1 IS NULL OR date = ?1
             ORDER BY date, timestamp, id",
        )?;
        let records = stmt
            .query_map(params![date], |row| {
                Ok(AttendanceRecord {
                    name: row.get(0)?,
                    date: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn test_add_student_and_exists() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.student_exists("alice").unwrap());
        db.add_student("alice").unwrap();
        assert!(db.student_exists("alice").unwrap());
    }

    #[test]
    fn test_duplicate_student_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.add_student("alice").unwrap();
        let err = db.add_student("alice").unwrap_err();
        assert!(matches!(err, DbError::AlreadyEnrolled(n) if n == "alice"));
        assert_eq!(db.students().unwrap(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_remove_student() {
        let db = Database::open_in_memory().unwrap();
        db.add_student("bob").unwrap();
        assert!(db.remove_student("bob").unwrap());
        assert!(!db.remove_student("bob").unwrap());
        assert!(db.students().unwrap().is_empty());
    }

    #[test]
    fn test_mark_attendance_once_per_day() {
        let db = Database::open_in_memory().unwrap();

        let first = db.mark_attendance("alice", at("2024-03-01", "09:00:00")).unwrap();
        assert_eq!(
            first,
            MarkOutcome::Recorded(AttendanceRecord {
                name: "alice".into(),
                date: "2024-03-01".into(),
                timestamp: "2024-03-01 09:00:00".into(),
            })
        );

        let again = db.mark_attendance("alice", at("2024-03-01", "15:30:00")).unwrap();
        assert_eq!(again, MarkOutcome::AlreadyRecorded);

        let records = db.attendance(None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, "2024-03-01 09:00:00");
    }

    #[test]
    fn test_mark_attendance_next_day_records_again() {
        let db = Database::open_in_memory().unwrap();
        db.mark_attendance("alice", at("2024-03-01", "09:00:00")).unwrap();
        let next = db.mark_attendance("alice", at("2024-03-02", "09:00:00")).unwrap();
        assert!(matches!(next, MarkOutcome::Recorded(_)));
        assert_eq!(db.attendance(None).unwrap().len(), 2);
    }

    #[test]
    fn test_attendance_ordering_and_filter() {
        let db = Database::open_in_memory().unwrap();
        db.mark_attendance("carol", at("2024-03-02", "08:00:00")).unwrap();
        db.mark_attendance("bob", at("2024-03-01", "10:00:00")).unwrap();
        db.mark_attendance("alice", at("2024-03-01", "09:00:00")).unwrap();

        let all: Vec<_> = db.attendance(None).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(all, vec!["alice", "bob", "carol"]);

        let day = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let filtered = db.attendance(Some(day)).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "carol");
        let earlier = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(db.attendance(Some(earlier)).unwrap().len(), 2);
        assert!(db.attendance(NaiveDate::from_ymd_opt(2024, 3, 3)).unwrap().is_empty());
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.db");
        {
            let db = Database::open(&path).unwrap();
            db.add_student("alice").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.student_exists("alice").unwrap());
    }
}
