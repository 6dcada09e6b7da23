use shiftsync_core::storage::{Config, FingerprintStore, Provenance, RetryPolicy};

pub fn run(shifts_only: bool) -> shiftsync_core::error::Result<()> {
    let path = Config::load_database_path()?;
    let store = FingerprintStore::open(&path, RetryPolicy::default())?;

    let records: Vec<_> = store
        .list_records()?
        .into_iter()
        .filter(|r| !shifts_only || r.provenance == Provenance::SystemCreated)
        .collect();
    store.close()?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
