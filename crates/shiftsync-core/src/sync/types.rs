//! Core types for shift-to-calendar reconciliation.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, OAuthError};

/// One scheduled shift for the configured person.
///
/// Produced fresh on every run by the shift source and never persisted.
/// Serializes with the field names of the shift listing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftRecord {
    pub shift_id: String,
    #[serde(rename = "jobRole")]
    pub role: String,
    #[serde(rename = "firstName")]
    pub person_first_name: String,
    #[serde(rename = "lastName")]
    pub person_last_name: String,
    #[serde(rename = "shiftDate")]
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// An event as currently stored on the remote calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub id: String,
    /// Free-text `source.title`; carries the shift marker for events we created.
    pub source_title: Option<String>,
    /// Full event resource, hashed for change detection.
    pub body: serde_json::Value,
}

impl RemoteEvent {
    /// Wrap a calendar API event resource.
    ///
    /// # Errors
    /// `SyncError::MalformedPayload` if the resource has no string `id`.
    pub fn from_json(body: serde_json::Value) -> Result<Self, SyncError> {
        let id = body["id"]
            .as_str()
            .ok_or_else(|| SyncError::MalformedPayload("calendar event without id".into()))?
            .to_string();
        let source_title = body["source"]["title"].as_str().map(str::to_string);

        Ok(Self {
            id,
            source_title,
            body,
        })
    }
}

/// Start or end of a timed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    /// RFC 3339 with explicit offset.
    pub date_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// Calendar `source` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    pub title: String,
    pub url: String,
}

/// Body of an event creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCalendarEvent {
    pub summary: String,
    pub description: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<EventSource>,
}

/// A calendar the adapter can write to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDescriptor {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Calendar API error: {0}")]
    CalendarApi(String),

    #[error("Shift source error: {0}")]
    ShiftSource(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Invalid date window: {0}")]
    InvalidWindow(String),

    #[error("Invalid shift {shift_id}: {message}")]
    InvalidShift { shift_id: String, message: String },
}
