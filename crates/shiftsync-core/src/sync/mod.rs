//! Shift-to-calendar reconciliation.
//!
//! The engine diffs the calendar against the local fingerprint store and
//! creates an event for every shift that has none yet. Events it creates
//! carry a shift marker in `source.title` so later runs recognise them.

pub mod calendar_client;
pub mod event_codec;
pub mod sync_engine;
pub mod types;
pub mod window;

pub use calendar_client::GoogleCalendarClient;
pub use event_codec::{content_hash, decode_shift_marker, encode_shift_marker};
pub use sync_engine::{CreatedEvent, EngineOptions, PassStats, ReconcileReport, SyncEngine};
pub use types::{NewCalendarEvent, RemoteEvent, ShiftRecord, SyncError};
pub use window::{DateBound, DateWindow, ResolvedWindow, SyncTimezone};
