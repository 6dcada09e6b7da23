//! Environment-driven configuration.
//!
//! Values are resolved once at startup, in increasing priority:
//! - `<data_dir>/config.toml` for non-secret settings (database path,
//!   calendar id, timezone, endpoint overrides)
//! - a `.env` file in the working directory (loaded with dotenvy)
//! - the process environment
//!
//! Credentials and the shift identity are only read from the environment.

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::sync::window::{DateBound, DateWindow, SyncTimezone};

pub const DEFAULT_HOMEBASE_BASE_URL: &str = "https://app.joinhomebase.com";
pub const DEFAULT_GOOGLE_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_SOURCE_URL: &str = "https://app.joinhomebase.com/";

/// Homebase login and the roster identity whose shifts are synced.
#[derive(Debug, Clone)]
pub struct HomebaseCredentials {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Google OAuth client plus a long-lived refresh token.
#[derive(Debug, Clone)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Optional settings file at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub homebase_base_url: Option<String>,
    #[serde(default)]
    pub google_api_base_url: Option<String>,
    #[serde(default)]
    pub google_token_url: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl FileConfig {
    /// Read `path`; a missing file yields the defaults.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub homebase: HomebaseCredentials,
    pub google: GoogleCredentials,
    pub window: DateWindow,
    /// `None` means the account's primary calendar.
    pub calendar_id: Option<String>,
    pub timezone: SyncTimezone,
    pub database_path: PathBuf,
    pub homebase_base_url: String,
    pub google_api_base_url: String,
    pub google_token_url: String,
    pub source_url: String,
}

impl Config {
    /// Load `.env`, the optional TOML file and the environment.
    ///
    /// # Errors
    /// Returns an error if a required key is missing or a value cannot be
    /// parsed.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is fine; the variables may come from the shell.
        let _ = dotenvy::dotenv();

        let dir = data_dir()?;
        let file = FileConfig::read(&dir.join("config.toml"))?;
        Self::resolve(file, &dir, |key| std::env::var(key).ok())
    }

    /// Resolve only the fingerprint database location.
    ///
    /// Used by commands that read the store without contacting any remote
    /// service, so credentials are not required.
    pub fn load_database_path() -> Result<PathBuf, ConfigError> {
        let _ = dotenvy::dotenv();

        let dir = data_dir()?;
        let file = FileConfig::read(&dir.join("config.toml"))?;
        let from_env = std::env::var("CC_DATABASE_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty());
        Ok(database_path(from_env, file.database_path, &dir))
    }

    /// Build a config from file settings and a variable lookup.
    pub fn resolve<F>(file: FileConfig, data_dir: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| optional(key).ok_or_else(|| ConfigError::MissingKey(key.into()));

        let homebase = HomebaseCredentials {
            username: required("CC_HOMEBASE_USERNAME")?,
            password: required("CC_HOMEBASE_PASSWORD")?,
            first_name: required("CC_HOMEBASE_EMPLOYEE_FIRSTNAME")?,
            last_name: required("CC_HOMEBASE_EMPLOYEE_LASTNAME")?,
        };

        let google = GoogleCredentials {
            client_id: required("CC_GOOGLE_CLIENT_ID")?,
            client_secret: required("CC_GOOGLE_CLIENT_SECRET")?,
            refresh_token: required("CC_GOOGLE_REFRESH_TOKEN")?,
        };

        let start = parse_bound("CC_HOMEBASE_START_DATE", &required("CC_HOMEBASE_START_DATE")?)?;
        let end = parse_bound("CC_HOMEBASE_END_DATE", &required("CC_HOMEBASE_END_DATE")?)?;
        let window = DateWindow { start, end };

        let timezone = match optional("CC_TIMEZONE").or(file.timezone) {
            Some(name) => {
                let tz: Tz = name.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "CC_TIMEZONE".into(),
                    message: format!("unknown IANA timezone '{name}'"),
                })?;
                SyncTimezone::Named(tz)
            }
            None => SyncTimezone::Local,
        };

        let database_path = database_path(optional("CC_DATABASE_PATH"), file.database_path, data_dir);

        Ok(Self {
            homebase,
            google,
            window,
            calendar_id: optional("CC_GOOGLE_CALENDAR_ID").or(file.calendar_id),
            timezone,
            database_path,
            homebase_base_url: optional("CC_HOMEBASE_BASE_URL")
                .or(file.homebase_base_url)
                .unwrap_or_else(|| DEFAULT_HOMEBASE_BASE_URL.to_string()),
            google_api_base_url: optional("CC_GOOGLE_API_BASE_URL")
                .or(file.google_api_base_url)
                .unwrap_or_else(|| DEFAULT_GOOGLE_API_BASE_URL.to_string()),
            google_token_url: optional("CC_GOOGLE_TOKEN_URL")
                .or(file.google_token_url)
                .unwrap_or_else(|| DEFAULT_GOOGLE_TOKEN_URL.to_string()),
            source_url: file
                .source_url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
        })
    }
}

fn database_path(from_env: Option<String>, from_file: Option<PathBuf>, data_dir: &Path) -> PathBuf {
    from_env
        .map(PathBuf::from)
        .or(from_file)
        .unwrap_or_else(|| data_dir.join("events.db"))
}

fn parse_bound(key: &str, raw: &str) -> Result<DateBound, ConfigError> {
    raw.parse().map_err(|message| ConfigError::InvalidValue {
        key: key.into(),
        message,
    })
}
