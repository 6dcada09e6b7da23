//! In-memory adapters for tests and dry runs.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{CalendarAdapter, ShiftSource};
use crate::sync::types::{CalendarDescriptor, NewCalendarEvent, RemoteEvent, ShiftRecord, SyncError};
use crate::sync::window::ResolvedWindow;

/// A single calendar kept in memory as raw event resources.
///
/// Created events are stored the way the calendar API would echo them back:
/// the request body plus an assigned `id`.
pub struct MockCalendar {
    calendar_id: String,
    events: Mutex<Vec<Value>>,
    next_id: AtomicU32,
    list_count: AtomicU32,
    create_count: AtomicU32,
    fail_creates: AtomicBool,
}

impl MockCalendar {
    pub fn new(calendar_id: impl Into<String>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            events: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            list_count: AtomicU32::new(0),
            create_count: AtomicU32::new(0),
            fail_creates: AtomicBool::new(false),
        }
    }

    /// Seed an event resource; it must carry a string `id`.
    pub fn with_event(self, event: Value) -> Self {
        self.insert_event(event);
        self
    }

    /// Make every subsequent `create_event` fail.
    pub fn with_failing_creates(self, fail: bool) -> Self {
        self.fail_creates.store(fail, Ordering::SeqCst);
        self
    }

    pub fn insert_event(&self, event: Value) {
        self.lock().push(event);
    }

    /// Remove an event as if someone deleted it on the calendar.
    pub fn remove_event(&self, event_id: &str) -> bool {
        let mut events = self.lock();
        let before = events.len();
        events.retain(|e| e["id"].as_str() != Some(event_id));
        events.len() != before
    }

    /// Overwrite one top-level field of an event.
    pub fn edit_event(&self, event_id: &str, field: &str, value: Value) -> bool {
        let mut events = self.lock();
        match events
            .iter_mut()
            .find(|e| e["id"].as_str() == Some(event_id))
        {
            Some(event) => {
                event[field] = value;
                true
            }
            None => false,
        }
    }

    /// Snapshot of all stored event resources.
    pub fn events(&self) -> Vec<Value> {
        self.lock().clone()
    }

    pub fn list_count(&self) -> u32 {
        self.list_count.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> u32 {
        self.create_count.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Value>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_calendar(&self, calendar_id: &str) -> Result<(), SyncError> {
        if calendar_id == self.calendar_id {
            Ok(())
        } else {
            Err(SyncError::CalendarApi(format!(
                "calendar '{calendar_id}' not found"
            )))
        }
    }
}

#[async_trait]
impl CalendarAdapter for MockCalendar {
    async fn primary_calendar(&self) -> Result<CalendarDescriptor, SyncError> {
        Ok(CalendarDescriptor {
            id: self.calendar_id.clone(),
            summary: Some("Mock".to_string()),
        })
    }

    async fn list_events(&self, calendar_id: &str) -> Result<Vec<RemoteEvent>, SyncError> {
        self.check_calendar(calendar_id)?;
        self.list_count.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .iter()
            .cloned()
            .map(RemoteEvent::from_json)
            .collect()
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        event: &NewCalendarEvent,
    ) -> Result<String, SyncError> {
        self.check_calendar(calendar_id)?;
        self.create_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(SyncError::CalendarApi("create rejected".to_string()));
        }

        let id = format!("mock-evt-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut body = serde_json::to_value(event)?;
        body["id"] = Value::String(id.clone());
        body["status"] = Value::String("confirmed".to_string());
        self.insert_event(body);
        Ok(id)
    }
}

/// A fixed list of shifts, returned as-is for any window.
#[derive(Default)]
pub struct MockShiftSource {
    shifts: Vec<ShiftRecord>,
    fetch_count: AtomicU32,
}

impl MockShiftSource {
    pub fn new(shifts: Vec<ShiftRecord>) -> Self {
        Self {
            shifts,
            fetch_count: AtomicU32::new(0),
        }
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShiftSource for MockShiftSource {
    async fn fetch_shifts(&self, _window: &ResolvedWindow) -> Result<Vec<ShiftRecord>, SyncError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.shifts.clone())
    }
}
