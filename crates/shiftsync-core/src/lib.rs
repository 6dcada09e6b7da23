//! # shiftsync Core Library
//!
//! Keeps a person's Homebase shifts on their Google Calendar, exactly once.
//! The CLI is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Storage**: SQLite fingerprint store with bounded busy-retry, schema
//!   migrations, and environment/TOML configuration
//! - **Sync**: the reconciliation engine, the shift-marker codec, the sync
//!   date window and the Google Calendar adapter
//! - **Integrations**: the Homebase shift source, OAuth token refresh and
//!   the adapter traits the engine is generic over
//!
//! ## Key Components
//!
//! - [`SyncEngine`]: one reconciliation pass per [`SyncEngine::run`]
//! - [`FingerprintStore`]: event id → content hash and provenance
//! - [`Config`]: run configuration loaded once at startup

pub mod error;
pub mod integrations;
pub mod storage;
pub mod sync;

pub use error::{ConfigError, CoreError, DatabaseError, OAuthError};
pub use integrations::{CalendarAdapter, HomebaseClient, ShiftSource};
pub use storage::{Config, FingerprintRecord, FingerprintStore, Provenance, RetryPolicy};
pub use sync::{
    GoogleCalendarClient, ReconcileReport, ShiftRecord, SyncEngine, SyncError,
};
