//! End-to-end reconciliation against a file-backed store.
//!
//! These tests drive `SyncEngine` with the in-memory adapters and a real
//! SQLite file, checking behavior that only shows up across runs and
//! across connections.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde_json::json;
use tempfile::TempDir;

use shiftsync_core::integrations::mock::{MockCalendar, MockShiftSource};
use shiftsync_core::storage::{FingerprintStore, Provenance, RetryPolicy};
use shiftsync_core::sync::{DateBound, DateWindow, EngineOptions, ShiftRecord, SyncEngine, SyncTimezone};
use shiftsync_core::{DatabaseError, SyncError};

fn options() -> EngineOptions {
    EngineOptions {
        calendar_id: Some("primary".to_string()),
        window: DateWindow {
            start: DateBound::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            end: DateBound::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
        },
        timezone: SyncTimezone::Named(chrono_tz::Europe::Rome),
        source_url: "https://app.joinhomebase.com/".to_string(),
    }
}

fn shift(id: &str, day: u32, role: &str) -> ShiftRecord {
    ShiftRecord {
        shift_id: id.to_string(),
        role: role.to_string(),
        person_first_name: "Jane".into(),
        person_last_name: "Doe".into(),
        date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
        start_time: NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(16, 30, 0).unwrap(),
    }
}

/// Run one pass with a freshly opened store, then close it again.
async fn run_once(
    path: &std::path::Path,
    calendar: MockCalendar,
    shifts: Vec<ShiftRecord>,
) -> (shiftsync_core::ReconcileReport, MockCalendar) {
    let store = FingerprintStore::open(path, RetryPolicy::immediate(5)).unwrap();
    let mut engine = SyncEngine::new(store, calendar, MockShiftSource::new(shifts), options());
    let report = engine.run().await.unwrap();

    // Hand the calendar contents to the next run; close the store like the CLI does.
    let events = engine.calendar().events();
    engine.into_store().close().unwrap();
    let calendar = events
        .into_iter()
        .fold(MockCalendar::new("primary"), |cal, event| cal.with_event(event));
    (report, calendar)
}

#[tokio::test]
async fn test_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.db");
    let calendar = MockCalendar::new("primary")
        .with_event(json!({"id": "standup", "summary": "Standup"}));
    let shifts = vec![shift("100", 8, "Cashier"), shift("101", 9, "Cashier")];

    let (first, calendar) = run_once(&path, calendar, shifts.clone()).await;
    assert_eq!(first.events_created.len(), 2);

    let (second, calendar) = run_once(&path, calendar, shifts).await;
    assert!(second.events_created.is_empty());
    assert_eq!(second.shifts_skipped, 2);
    assert_eq!(second.fingerprints_created, 0);
    assert_eq!(second.fingerprints_unchanged, 3);
    assert_eq!(calendar.events().len(), 3);

    let store = FingerprintStore::open(&path, RetryPolicy::immediate(1)).unwrap();
    let records = store.list_records().unwrap();
    assert_eq!(records.len(), 3);
    let standup = records.iter().find(|r| r.event_id == "standup").unwrap();
    assert_eq!(standup.provenance, Provenance::External);
    assert_eq!(
        store.list_shift_ids_with_events().unwrap(),
        HashSet::from(["100".to_string(), "101".to_string()])
    );
}

#[tokio::test]
async fn test_created_event_round_trips_provenance() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.db");

    let (report, calendar) =
        run_once(&path, MockCalendar::new("primary"), vec![shift("7", 10, "Barista")]).await;
    let created = &report.events_created[0];

    // A fresh store sees the event only through the calendar listing.
    let other_path = dir.path().join("fresh.db");
    let (fresh, _) = run_once(&other_path, calendar, vec![shift("7", 10, "Barista")]).await;
    assert!(fresh.events_created.is_empty());

    let store = FingerprintStore::open(&other_path, RetryPolicy::immediate(1)).unwrap();
    let record = store.get(&created.event_id).unwrap().unwrap();
    assert_eq!(record.provenance, Provenance::SystemCreated);
    assert_eq!(record.origin_shift_id.as_deref(), Some("7"));
}

#[tokio::test]
async fn test_edited_event_refreshes_hash_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.db");

    let (report, calendar) =
        run_once(&path, MockCalendar::new("primary"), vec![shift("7", 10, "Barista")]).await;
    let event_id = report.events_created[0].event_id.clone();
    assert!(calendar.edit_event(&event_id, "summary", json!("Barista shift (swapped)")));

    let (second, _) = run_once(&path, calendar, vec![shift("7", 10, "Barista")]).await;
    assert_eq!(second.fingerprints_updated, 1);
    assert!(second.events_created.is_empty());
}

#[tokio::test]
async fn test_locked_store_aborts_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.db");
    let store = FingerprintStore::open(&path, RetryPolicy::immediate(3)).unwrap();

    let other = Connection::open(&path).unwrap();
    other.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    let calendar = MockCalendar::new("primary").with_event(json!({"id": "a"}));
    let mut engine = SyncEngine::new(store, calendar, MockShiftSource::new(vec![]), options());

    match engine.run().await {
        Err(SyncError::Storage(DatabaseError::Unavailable { attempts, .. })) => {
            assert_eq!(attempts, 3)
        }
        other => panic!("expected storage unavailable, got {other:?}"),
    }
    assert_eq!(engine.shift_source().fetch_count(), 0);

    other.execute_batch("ROLLBACK;").unwrap();
    let report = engine.run().await.unwrap();
    assert_eq!(report.fingerprints_created, 1);
}
