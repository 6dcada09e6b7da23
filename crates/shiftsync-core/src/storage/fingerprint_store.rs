//! SQLite-backed fingerprint store.
//!
//! Maps a remote calendar event id to the hash of its last observed content
//! and to its provenance (created by shiftsync for a shift, or external).
//! Every statement runs through the store's [`RetryPolicy`] so a concurrent
//! writer holding the database lock delays the run instead of failing it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::migrations;
use super::retry::RetryPolicy;
use crate::error::DatabaseError;

/// Who created a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    External,
    SystemCreated,
}

impl Provenance {
    fn to_db(self) -> i64 {
        match self {
            Provenance::External => 0,
            Provenance::SystemCreated => 1,
        }
    }

    fn from_db(flag: i64) -> Option<Self> {
        match flag {
            0 => Some(Provenance::External),
            1 => Some(Provenance::SystemCreated),
            _ => None,
        }
    }
}

/// One row of the `events` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub event_id: String,
    pub content_hash: String,
    pub provenance: Provenance,
    /// Set only for system-created events.
    pub origin_shift_id: Option<String>,
}

impl FingerprintRecord {
    pub fn external(event_id: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            content_hash: content_hash.into(),
            provenance: Provenance::External,
            origin_shift_id: None,
        }
    }

    pub fn system_created(
        event_id: impl Into<String>,
        content_hash: impl Into<String>,
        shift_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            content_hash: content_hash.into(),
            provenance: Provenance::SystemCreated,
            origin_shift_id: Some(shift_id.into()),
        }
    }

    /// Same record with a refreshed hash; provenance is carried over.
    pub fn with_hash(&self, content_hash: impl Into<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            ..self.clone()
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let flag: i64 = row.get("from_homebase")?;
        let provenance = Provenance::from_db(flag).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Integer,
                format!("invalid from_homebase flag: {flag}").into(),
            )
        })?;

        Ok(Self {
            event_id: row.get("event_id")?,
            content_hash: row.get("hash")?,
            provenance,
            origin_shift_id: row.get("homebase_shift_id")?,
        })
    }
}

/// Durable event fingerprint table.
///
/// The handle is owned by whoever drives a reconciliation pass; it is opened
/// at run start and closed when the run ends.
pub struct FingerprintStore {
    conn: Connection,
    policy: RetryPolicy,
    path: Option<PathBuf>,
}

impl FingerprintStore {
    /// Open (or create) the store at `path` and apply pending migrations.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>, policy: RetryPolicy) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn, policy, Some(path.to_path_buf()))
    }

    /// Open an in-memory store (for tests).
    #[cfg(test)]
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, RetryPolicy::immediate(5), None)
    }

    fn init(
        conn: Connection,
        policy: RetryPolicy,
        path: Option<PathBuf>,
    ) -> Result<Self, DatabaseError> {
        // Contention is handled by `policy`, not by SQLite's internal wait.
        conn.busy_timeout(Duration::ZERO)?;

        let store = Self { conn, policy, path };
        store
            .policy
            .run("migrate", || Ok(migrations::migrate(&store.conn)?))
            .map_err(|e| match e {
                DatabaseError::QueryFailed(msg) => DatabaseError::MigrationFailed(msg),
                other => other,
            })?;
        Ok(store)
    }

    /// Location of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, event_id: &str) -> Result<Option<FingerprintRecord>, DatabaseError> {
        self.policy.run("get", || {
            let mut stmt = self.conn.prepare_cached(
                "SELECT event_id, hash, from_homebase, homebase_shift_id
                 FROM events WHERE event_id = ?1",
            )?;
            Ok(stmt
                .query_row(params![event_id], FingerprintRecord::from_row)
                .optional()?)
        })
    }

    pub fn get_by_shift(&self, shift_id: &str) -> Result<Option<FingerprintRecord>, DatabaseError> {
        self.policy.run("get_by_shift", || {
            let mut stmt = self.conn.prepare_cached(
                "SELECT event_id, hash, from_homebase, homebase_shift_id
                 FROM events WHERE homebase_shift_id = ?1",
            )?;
            Ok(stmt
                .query_row(params![shift_id], FingerprintRecord::from_row)
                .optional()?)
        })
    }

    /// Insert the record, or overwrite hash/provenance/shift id of the
    /// existing row with the same `event_id`.
    ///
    /// # Errors
    /// `DatabaseError::Integrity` if another event already claims the shift
    /// id, or if an external record carries a shift id.
    pub fn upsert(&self, record: &FingerprintRecord) -> Result<(), DatabaseError> {
        if record.provenance == Provenance::External && record.origin_shift_id.is_some() {
            return Err(DatabaseError::Integrity(format!(
                "external event {} cannot reference a shift",
                record.event_id
            )));
        }

        self.policy.run("upsert", || {
            let mut stmt = self.conn.prepare_cached(
                "INSERT INTO events (event_id, hash, from_homebase, homebase_shift_id)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(event_id) DO UPDATE SET
                    hash = excluded.hash,
                    from_homebase = excluded.from_homebase,
                    homebase_shift_id = excluded.homebase_shift_id",
            )?;
            stmt.execute(params![
                record.event_id,
                record.content_hash,
                record.provenance.to_db(),
                record.origin_shift_id,
            ])?;
            Ok(())
        })
    }

    /// Delete the fingerprint of `event_id`. Returns whether a row existed.
    pub fn delete(&self, event_id: &str) -> Result<bool, DatabaseError> {
        self.policy.run("delete", || {
            let mut stmt = self
                .conn
                .prepare_cached("DELETE FROM events WHERE event_id = ?1")?;
            Ok(stmt.execute(params![event_id])? > 0)
        })
    }

    pub fn list_event_ids(&self) -> Result<HashSet<String>, DatabaseError> {
        self.policy.run("list_event_ids", || {
            let mut stmt = self.conn.prepare_cached("SELECT event_id FROM events")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<HashSet<_>>>()?;
            Ok(ids)
        })
    }

    /// All shift ids that already have a calendar event.
    pub fn list_shift_ids_with_events(&self) -> Result<HashSet<String>, DatabaseError> {
        self.policy.run("list_shift_ids_with_events", || {
            let mut stmt = self.conn.prepare_cached(
                "SELECT homebase_shift_id FROM events WHERE homebase_shift_id IS NOT NULL",
            )?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<HashSet<_>>>()?;
            Ok(ids)
        })
    }

    pub fn list_records(&self) -> Result<Vec<FingerprintRecord>, DatabaseError> {
        self.policy.run("list_records", || {
            let mut stmt = self.conn.prepare_cached(
                "SELECT event_id, hash, from_homebase, homebase_shift_id
                 FROM events ORDER BY event_id ASC",
            )?;
            let records = stmt
                .query_map([], FingerprintRecord::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    /// Close the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<(), DatabaseError> {
        self.conn.close().map_err(|(_, e)| e.into())
    }
}
