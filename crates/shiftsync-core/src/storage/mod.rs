mod config;
pub mod fingerprint_store;
pub mod migrations;
pub mod retry;

pub use config::{Config, FileConfig, GoogleCredentials, HomebaseCredentials};
pub use fingerprint_store::{FingerprintRecord, FingerprintStore, Provenance};
pub use retry::RetryPolicy;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/shiftsync[-dev]/` based on SHIFTSYNC_ENV.
///
/// Set SHIFTSYNC_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("SHIFTSYNC_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("shiftsync-dev")
    } else {
        base_dir.join("shiftsync")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
