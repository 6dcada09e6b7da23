//! Seams between the reconciler and the remote systems it talks to.
//!
//! Both adapters are consumed, never driven: the reconciler pulls from them
//! in a fixed order and any error they return aborts the run.

use async_trait::async_trait;

use crate::sync::types::{CalendarDescriptor, NewCalendarEvent, RemoteEvent, ShiftRecord, SyncError};
use crate::sync::window::ResolvedWindow;

/// A remote calendar holding both our shift events and unrelated ones.
#[async_trait]
pub trait CalendarAdapter: Send + Sync {
    /// The account's default calendar.
    async fn primary_calendar(&self) -> Result<CalendarDescriptor, SyncError>;

    /// Every event currently on `calendar_id`.
    async fn list_events(&self, calendar_id: &str) -> Result<Vec<RemoteEvent>, SyncError>;

    /// Create an event and return its id.
    async fn create_event(
        &self,
        calendar_id: &str,
        event: &NewCalendarEvent,
    ) -> Result<String, SyncError>;
}

/// Upstream work schedule for a single configured person.
#[async_trait]
pub trait ShiftSource: Send + Sync {
    /// Shifts starting inside `window`, in the order the source lists them.
    async fn fetch_shifts(&self, window: &ResolvedWindow) -> Result<Vec<ShiftRecord>, SyncError>;
}
