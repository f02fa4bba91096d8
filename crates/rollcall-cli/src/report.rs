//! Read-only commands: enrolled faces, the attendance log, camera devices.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rollcall_core::{AttendanceLog, AttendanceRecord, FaceStore};
use rollcall_hw::Camera;
use std::path::Path;

pub fn list_faces(faces_dir: &Path, json: bool) -> Result<()> {
    let store = FaceStore::load(faces_dir)
        .with_context(|| format!("loading faces from {}", faces_dir.display()))?;

    if json {
        let faces: Vec<_> = store
            .records()
            .iter()
            .map(|r| serde_json::json!({ "id": r.id, "name": r.name }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&faces)?);
        return Ok(());
    }

    if store.is_empty() {
        println!("No faces registered in {}", faces_dir.display());
        return Ok(());
    }
    for record in store.records() {
        println!("{:>4}  {}", record.id, record.name);
    }
    Ok(())
}

pub fn show_log(log_path: &Path, date: Option<NaiveDate>, json: bool) -> Result<()> {
    let log = AttendanceLog::new(log_path);
    let records = filter_by_date(log.read_records()?, date);

    if json {
        let rows: Vec<_> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": r.name,
                    "date": r.date_string(),
                    "time": r.time_string(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No attendance records.");
        return Ok(());
    }
    for record in &records {
        print!("{}", record.to_line());
    }
    Ok(())
}

pub fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found.");
        return;
    }
    for device in devices {
        println!("{}  {} ({}, {})", device.path, device.name, device.driver, device.bus);
    }
}

fn filter_by_date(records: Vec<AttendanceRecord>, date: Option<NaiveDate>) -> Vec<AttendanceRecord> {
    match date {
        Some(date) => records.into_iter().filter(|r| r.date == date).collect(),
        None => records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_by_date() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        let at = |d| day(d).and_hms_opt(9, 0, 0).unwrap();
        let records = vec![
            AttendanceRecord::new("alice", at(1)),
            AttendanceRecord::new("bob", at(2)),
            AttendanceRecord::new("carol", at(1)),
        ];

        let first: Vec<_> = filter_by_date(records.clone(), Some(day(1)))
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(first, vec!["alice", "carol"]);
        assert_eq!(filter_by_date(records, None).len(), 3);
    }

    #[test]
    fn test_show_log_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(show_log(&tmp.path().join("attendance.csv"), None, true).is_ok());
    }
}
