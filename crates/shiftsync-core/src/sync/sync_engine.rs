//! Reconciliation between the shift schedule and the calendar.
//!
//! One [`SyncEngine::run`] is a strictly sequential pass:
//!
//! - **A** hash every remote event and diff against the fingerprint store
//! - **B** prune fingerprints whose event is gone from the calendar
//! - **C** fetch shifts for the configured window
//! - **D** create an event for each shift not yet represented, re-running
//!   A and B after every creation
//!
//! Nothing here retries. Store contention is handled inside the store and
//! network failures are the adapters' concern; any error aborts the run.
//! Re-running is always safe because A and B start from scratch.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::integrations::traits::{CalendarAdapter, ShiftSource};
use crate::storage::{Config, FingerprintRecord, FingerprintStore};
use crate::sync::event_codec::{classify, content_hash, decode_shift_marker, shift_to_event};
use crate::sync::types::{RemoteEvent, ShiftRecord, SyncError};
use crate::sync::window::{DateWindow, SyncTimezone};

/// Run parameters that do not come from the adapters.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// `None` resolves to the adapter's primary calendar.
    pub calendar_id: Option<String>,
    pub window: DateWindow,
    pub timezone: SyncTimezone,
    /// Written into `source.url` of created events.
    pub source_url: String,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            calendar_id: config.calendar_id.clone(),
            window: config.window,
            timezone: config.timezone,
            source_url: config.source_url.clone(),
        }
    }
}

/// Store mutations made by one or more diff/prune passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub pruned: usize,
}

impl PassStats {
    /// Number of store writes.
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.pruned
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedEvent {
    pub shift_id: String,
    pub event_id: String,
}

/// Outcome of a full run. Fingerprint counters add up every pass of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub calendar_id: String,
    pub fingerprints_created: usize,
    pub fingerprints_updated: usize,
    pub fingerprints_pruned: usize,
    pub fingerprints_unchanged: usize,
    pub events_created: Vec<CreatedEvent>,
    pub shifts_seen: usize,
    pub shifts_skipped: usize,
}

impl ReconcileReport {
    fn absorb(&mut self, stats: PassStats) {
        self.fingerprints_created += stats.created;
        self.fingerprints_updated += stats.updated;
        self.fingerprints_unchanged += stats.unchanged;
        self.fingerprints_pruned += stats.pruned;
    }
}

// ============================================================================
// Phases A and B
// ============================================================================

/// Phase A: record every remote event's current hash.
///
/// New events are classified by their source title. Known events whose hash
/// changed only get the hash refreshed; provenance and origin shift keep
/// the values from first observation, even if the marker was since edited
/// away.
pub fn diff_remote(
    store: &FingerprintStore,
    events: &[RemoteEvent],
) -> Result<PassStats, SyncError> {
    let mut stats = PassStats::default();

    for event in events {
        let hash = content_hash(&event.body)?;

        match store.get(&event.id)? {
            None => {
                let (provenance, shift_id) = classify(event);
                let record = match shift_id {
                    Some(shift_id) => FingerprintRecord::system_created(&event.id, hash, shift_id),
                    None => FingerprintRecord::external(&event.id, hash),
                };
                store.upsert(&record)?;
                info!(
                    event_id = %event.id,
                    provenance = ?provenance,
                    shift_id = record.origin_shift_id.as_deref().unwrap_or("-"),
                    "fingerprint created"
                );
                stats.created += 1;
            }
            Some(existing) if existing.content_hash != hash => {
                store.upsert(&existing.with_hash(hash))?;
                info!(event_id = %event.id, "fingerprint updated");
                stats.updated += 1;
            }
            Some(_) => stats.unchanged += 1,
        }
    }

    Ok(stats)
}

/// Phase B: delete every fingerprint whose event id was not observed.
/// Returns the number of records removed.
pub fn prune_stale(
    store: &FingerprintStore,
    observed: &HashSet<String>,
) -> Result<usize, SyncError> {
    let mut stale: Vec<String> = store
        .list_event_ids()?
        .difference(observed)
        .cloned()
        .collect();
    stale.sort();

    for event_id in &stale {
        store.delete(event_id)?;
        info!(event_id = %event_id, "fingerprint pruned");
    }

    Ok(stale.len())
}

/// Whether `shift` already has an event, per the store or the live calendar.
pub fn is_represented(
    store: &FingerprintStore,
    shift: &ShiftRecord,
    remote: &[RemoteEvent],
) -> Result<bool, SyncError> {
    if store.get_by_shift(&shift.shift_id)?.is_some() {
        return Ok(true);
    }
    Ok(remote.iter().any(|event| {
        event.source_title.as_deref().and_then(decode_shift_marker) == Some(shift.shift_id.as_str())
    }))
}

// ============================================================================
// Engine
// ============================================================================

/// Owns the fingerprint store for the duration of a run.
pub struct SyncEngine<C, S> {
    store: FingerprintStore,
    calendar: C,
    shifts: S,
    options: EngineOptions,
}

impl<C, S> SyncEngine<C, S>
where
    C: CalendarAdapter,
    S: ShiftSource,
{
    pub fn new(store: FingerprintStore, calendar: C, shifts: S, options: EngineOptions) -> Self {
        Self {
            store,
            calendar,
            shifts,
            options,
        }
    }

    pub fn store(&self) -> &FingerprintStore {
        &self.store
    }

    pub fn calendar(&self) -> &C {
        &self.calendar
    }

    pub fn shift_source(&self) -> &S {
        &self.shifts
    }

    /// Give the store back, e.g. to close it.
    pub fn into_store(self) -> FingerprintStore {
        self.store
    }

    /// Execute phases A through D once.
    pub async fn run(&mut self) -> Result<ReconcileReport, SyncError> {
        // Validate the window before touching the store.
        let window = self.options.window.resolve(&self.options.timezone)?;
        let calendar_id = self.resolve_calendar_id().await?;
        info!(
            calendar_id = %calendar_id,
            start = %window.start_date,
            end = %window.end_date,
            "reconciliation started"
        );

        let mut report = ReconcileReport {
            calendar_id: calendar_id.clone(),
            ..ReconcileReport::default()
        };

        let mut remote = self.refresh(&calendar_id, &mut report).await?;

        let shifts = self.shifts.fetch_shifts(&window).await?;
        report.shifts_seen = shifts.len();
        debug!(count = shifts.len(), "shifts fetched");

        for shift in &shifts {
            if is_represented(&self.store, shift, &remote)? {
                debug!(shift_id = %shift.shift_id, "shift already on calendar");
                report.shifts_skipped += 1;
                continue;
            }

            let event = shift_to_event(shift, &self.options.timezone, &self.options.source_url)?;
            let event_id = self.calendar.create_event(&calendar_id, &event).await?;
            info!(
                shift_id = %shift.shift_id,
                event_id = %event_id,
                date = %shift.date,
                "calendar event created"
            );
            report.events_created.push(CreatedEvent {
                shift_id: shift.shift_id.clone(),
                event_id,
            });

            remote = self.refresh(&calendar_id, &mut report).await?;
        }

        info!(
            created = report.events_created.len(),
            skipped = report.shifts_skipped,
            pruned = report.fingerprints_pruned,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Phases A and B alone, without fetching shifts.
    pub async fn refresh_fingerprints(&self) -> Result<PassStats, SyncError> {
        let calendar_id = self.resolve_calendar_id().await?;
        let mut report = ReconcileReport::default();
        self.refresh(&calendar_id, &mut report).await?;
        Ok(PassStats {
            created: report.fingerprints_created,
            updated: report.fingerprints_updated,
            unchanged: report.fingerprints_unchanged,
            pruned: report.fingerprints_pruned,
        })
    }

    async fn refresh(
        &self,
        calendar_id: &str,
        report: &mut ReconcileReport,
    ) -> Result<Vec<RemoteEvent>, SyncError> {
        let remote = self.calendar.list_events(calendar_id).await?;

        let mut stats = diff_remote(&self.store, &remote)?;
        let observed: HashSet<String> = remote.iter().map(|e| e.id.clone()).collect();
        stats.pruned = prune_stale(&self.store, &observed)?;

        debug!(
            events = remote.len(),
            created = stats.created,
            updated = stats.updated,
            pruned = stats.pruned,
            "fingerprints refreshed"
        );
        report.absorb(stats);
        Ok(remote)
    }

    async fn resolve_calendar_id(&self) -> Result<String, SyncError> {
        match &self.options.calendar_id {
            Some(id) => Ok(id.clone()),
            None => Ok(self.calendar.primary_calendar().await?.id),
        }
    }
}
