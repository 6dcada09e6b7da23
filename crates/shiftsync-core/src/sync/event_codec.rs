//! Encoding between shifts, calendar events and fingerprints.
//!
//! The shift marker written into an event's `source.title` is the only link
//! between a calendar event and the shift it was created for. Its format
//! lives in [`encode_shift_marker`] / [`decode_shift_marker`] and nowhere
//! else.

use chrono::Duration;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::storage::Provenance;
use crate::sync::types::{EventDateTime, EventSource, NewCalendarEvent, RemoteEvent, ShiftRecord, SyncError};
use crate::sync::window::SyncTimezone;

/// Literal tag in front of the shift id in `source.title`.
pub const SHIFT_MARKER: &str = "homebaseShiftId";

// ============================================================================
// Shift marker
// ============================================================================

/// `"homebaseShiftId-<shift_id>"`
pub fn encode_shift_marker(shift_id: &str) -> String {
    format!("{SHIFT_MARKER}-{shift_id}")
}

/// Shift id carried by a source title, if the title is a shift marker.
pub fn decode_shift_marker(source_title: &str) -> Option<&str> {
    source_title
        .strip_prefix(SHIFT_MARKER)?
        .strip_prefix('-')
        .filter(|id| !id.is_empty())
}

/// Provenance and origin shift derived from an event's source title.
pub fn classify(event: &RemoteEvent) -> (Provenance, Option<String>) {
    match event.source_title.as_deref().and_then(decode_shift_marker) {
        Some(shift_id) => (Provenance::SystemCreated, Some(shift_id.to_string())),
        None => (Provenance::External, None),
    }
}

// ============================================================================
// Fingerprints
// ============================================================================

/// Serialize `value` as compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> Result<String, SyncError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), SyncError> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// Hex SHA-256 of the canonical JSON form.
pub fn content_hash(value: &Value) -> Result<String, SyncError> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

// ============================================================================
// Shift -> calendar event
// ============================================================================

pub fn event_summary(shift: &ShiftRecord) -> String {
    format!("{} shift", shift.role)
}

pub fn event_description(shift: &ShiftRecord) -> String {
    format!(
        "Shift for {} {}",
        shift.person_first_name, shift.person_last_name
    )
}

/// Build the creation request for `shift`.
///
/// Start and end are the shift's wall-clock times in `tz`. An end time at or
/// before the start time means the shift runs past midnight.
///
/// # Errors
/// `SyncError::InvalidShift` if a time does not exist in `tz` (DST gap).
pub fn shift_to_event(
    shift: &ShiftRecord,
    tz: &SyncTimezone,
    source_url: &str,
) -> Result<NewCalendarEvent, SyncError> {
    let start_naive = shift.date.and_time(shift.start_time);
    let mut end_naive = shift.date.and_time(shift.end_time);
    if end_naive <= start_naive {
        end_naive += Duration::days(1);
    }

    let invalid = |what: &str| SyncError::InvalidShift {
        shift_id: shift.shift_id.clone(),
        message: format!("{what} time does not exist in {tz}"),
    };
    let start = tz.localize(start_naive).ok_or_else(|| invalid("start"))?;
    let end = tz.localize(end_naive).ok_or_else(|| invalid("end"))?;
    let time_zone = tz.iana_name().map(str::to_string);

    Ok(NewCalendarEvent {
        summary: event_summary(shift),
        description: event_description(shift),
        start: EventDateTime {
            date_time: start.to_rfc3339(),
            time_zone: time_zone.clone(),
        },
        end: EventDateTime {
            date_time: end.to_rfc3339(),
            time_zone,
        },
        source: Some(EventSource {
            title: encode_shift_marker(&shift.shift_id),
            url: source_url.to_string(),
        }),
    })
}
