//! Append-only attendance log: one `name,DD-MM-YYYY,HH:MM:SS` line per
//! first sighting.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DATE_FORMAT: &str = "%d-%m-%Y";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum LogError {
    #[error("failed to open attendance log {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write attendance log {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read attendance log {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed attendance line: {0:?}")]
    Malformed(String),
}

/// One persisted attendance line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub name: String,
    pub date: NaiveDate,
    /// Whole seconds; sub-second precision is not stored.
    pub time: NaiveTime,
}

impl AttendanceRecord {
    pub fn new(name: impl Into<String>, at: NaiveDateTime) -> Self {
        let time = at.time();
        Self {
            name: name.into(),
            date: at.date(),
            time: time.with_nanosecond(0).unwrap_or(time),
        }
    }

    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    pub fn time_string(&self) -> String {
        self.time.format(TIME_FORMAT).to_string()
    }

    /// Log line including the trailing newline.
    pub fn to_line(&self) -> String {
        format!("{},{},{}\n", self.name, self.date_string(), self.time_string())
    }

    /// Parse one log line. The name may itself contain commas.
    pub fn parse_line(line: &str) -> Result<Self, LogError> {
        let malformed = || LogError::Malformed(line.to_string());
        let trimmed = line.trim_end_matches(['\r', '\n']);

        let mut fields = trimmed.rsplitn(3, ',');
        let time = fields.next().ok_or_else(malformed)?;
        let date = fields.next().ok_or_else(malformed)?;
        let name = fields.next().filter(|n| !n.is_empty()).ok_or_else(malformed)?;

        Ok(Self {
            name: name.to_string(),
            date: NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| malformed())?,
            time: NaiveTime::parse_from_str(time, TIME_FORMAT).map_err(|_| malformed())?,
        })
    }
}

/// Attendance log file. Opened per append; no locking, single writer.
#[derive(Debug, Clone)]
pub struct AttendanceLog {
    path: PathBuf,
}

impl AttendanceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file if absent. Never truncates.
    pub fn append(&self, name: &str, at: NaiveDateTime) -> Result<AttendanceRecord, LogError> {
        let record = AttendanceRecord::new(name, at);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LogError::Open {
                path: self.path.clone(),
                source,
            })?;

        file.write_all(record.to_line().as_bytes())
            .map_err(|source| LogError::Write {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!(name, path = %self.path.display(), "attendance marked");
        Ok(record)
    }

    /// Every well-formed record in file order. A missing file reads as empty;
    /// malformed lines are skipped with a warning.
    pub fn read_records(&self) -> Result<Vec<AttendanceRecord>, LogError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LogError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut records = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match AttendanceRecord::parse_line(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(line = lineno + 1, error = %e, "skipping attendance line"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(d: u32, mo: u32, y: i32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_milli_opt(h, mi, s, 250)
            .unwrap()
    }

    #[test]
    fn test_line_format_zero_padded() {
        let record = AttendanceRecord::new("alice", at(3, 7, 2024, 9, 5, 1));
        assert_eq!(record.to_line(), "alice,03-07-2024,09:05:01\n");
    }

    #[test]
    fn test_parse_line() {
        let record = AttendanceRecord::parse_line("bob,31-12-2023,23:59:58").unwrap();
        assert_eq!(record.name, "bob");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(record.time, NaiveTime::from_hms_opt(23, 59, 58).unwrap());
    }

    #[test]
    fn test_parse_line_name_with_comma() {
        let record = AttendanceRecord::parse_line("smith, j,01-01-2024,08:00:00\r\n").unwrap();
        assert_eq!(record.name, "smith, j");
    }

    #[test]
    fn test_parse_line_malformed() {
        for line in ["", "alice", "alice,2024-01-01,08:00:00", ",01-01-2024,08:00:00", "a,01-01-2024,8h"] {
            assert!(
                matches!(AttendanceRecord::parse_line(line), Err(LogError::Malformed(_))),
                "parsed {line:?}"
            );
        }
    }

    #[test]
    fn test_append_creates_and_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AttendanceLog::new(tmp.path().join("attendance.csv"));

        log.append("alice", at(1, 2, 2024, 10, 0, 0)).unwrap();
        log.append("bob", at(1, 2, 2024, 10, 0, 7)).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, "alice,01-02-2024,10:00:00\nbob,01-02-2024,10:00:07\n");
    }

    #[test]
    fn test_append_never_truncates() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("attendance.csv");
        std::fs::write(&path, "old,01-01-2020,00:00:00\n").unwrap();

        AttendanceLog::new(&path).append("new", at(2, 1, 2020, 0, 0, 0)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("old,01-01-2020,00:00:00\n"));
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_append_unwritable_path() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AttendanceLog::new(tmp.path().join("missing-dir").join("attendance.csv"));
        let result = log.append("alice", at(1, 1, 2024, 0, 0, 0));
        assert!(matches!(result, Err(LogError::Open { .. })));
    }

    #[test]
    fn test_read_records_round_trip_and_skip_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AttendanceLog::new(tmp.path().join("attendance.csv"));
        let written = log.append("alice", at(5, 5, 2025, 12, 30, 45)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(b"garbage line\n\n")
            .unwrap();

        let records = log.read_records().unwrap();
        assert_eq!(records, vec![written]);
    }

    #[test]
    fn test_read_records_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AttendanceLog::new(tmp.path().join("none.csv"));
        assert!(log.read_records().unwrap().is_empty());
    }
}
