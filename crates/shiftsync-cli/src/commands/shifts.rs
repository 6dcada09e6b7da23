use shiftsync_core::storage::Config;
use shiftsync_core::{HomebaseClient, ShiftSource};

/// Fetch and print the shift list; neither the calendar nor the store is touched.
pub fn run() -> shiftsync_core::error::Result<()> {
    let config = Config::load()?;
    let window = config.window.resolve(&config.timezone)?;
    let client = HomebaseClient::from_config(&config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let shifts = runtime.block_on(client.fetch_shifts(&window))?;

    println!("{}", serde_json::to_string_pretty(&shifts)?);
    Ok(())
}
