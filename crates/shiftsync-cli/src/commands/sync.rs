//! One reconciliation pass against Homebase and Google Calendar.

use shiftsync_core::storage::{Config, FingerprintStore, RetryPolicy};
use shiftsync_core::sync::{EngineOptions, GoogleCalendarClient, SyncEngine};
use shiftsync_core::HomebaseClient;

/// Run the sync and print the run report as JSON.
pub fn run() -> shiftsync_core::error::Result<()> {
    let config = Config::load()?;

    let calendar = GoogleCalendarClient::from_config(&config)?;
    let shifts = HomebaseClient::from_config(&config)?;
    let store = FingerprintStore::open(&config.database_path, RetryPolicy::default())?;

    let mut engine = SyncEngine::new(store, calendar, shifts, EngineOptions::from_config(&config));
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(engine.run());

    // Close the store whether or not the run succeeded; the run error wins.
    let closed = engine.into_store().close();
    let report = result?;
    closed?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
