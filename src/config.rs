use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db_mongo::{ConnectionUri, connection_uri};
use crate::error::StoreError;

pub const CONNECTION_TEMPLATE_KEY: &str = "MONGODB_CONNECTION_TEMPLATE";
pub const UID_KEY: &str = "MONGODB_UID";
pub const PWD_KEY: &str = "MONGODB_PWD";
pub const DATABASE_NAME_KEY: &str = "MONGODB_DATABASE_NAME";
pub const COLLECTION_NAME_KEY: &str = "MONGODB_COLLECTION_NAME";
pub const TIMEOUT_SECS_KEY: &str = "MONGODB_TIMEOUT_SECS";
pub const MAX_POOL_SIZE_KEY: &str = "MONGODB_MAX_POOL_SIZE";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_POOL_SIZE: u32 = 20;

/// Source of named string settings.
pub trait Settings {
    /// Fetch `key`. Absent and empty values are both reported as missing.
    fn get(&self, key: &str) -> Result<String, StoreError>;

    fn get_optional(&self, key: &str) -> Option<String> {
        self.get(key).ok()
    }
}

/// Settings read from the process environment after loading `.env`.
///
/// Loading happens before logging is installed, so the outcome is kept for
/// the caller to report.
#[derive(Debug, Default, Clone)]
pub struct EnvSettings {
    env_file: Option<PathBuf>,
    load_error: Option<String>,
}

impl EnvSettings {
    pub fn load() -> Self {
        Self::from_dotenv(dotenvy::dotenv())
    }

    fn from_dotenv(result: dotenvy::Result<PathBuf>) -> Self {
        match result {
            Ok(path) => Self {
                env_file: Some(path),
                load_error: None,
            },
            Err(e) => Self {
                env_file: None,
                load_error: Some(e.to_string()),
            },
        }
    }

    /// The `.env` file that was applied, if any.
    pub fn env_file(&self) -> Option<&Path> {
        self.env_file.as_deref()
    }

    /// Emit what `load` did. Call once a subscriber is installed.
    pub fn log_source(&self) {
        match (&self.env_file, &self.load_error) {
            (Some(path), _) => tracing::info!("Loaded settings from {}", path.display()),
            (None, Some(e)) => tracing::debug!("No .env file loaded: {}", e),
            (None, None) => tracing::debug!("Settings read from the process environment"),
        }
    }
}

impl Settings for EnvSettings {
    fn get(&self, key: &str) -> Result<String, StoreError> {
        std::env::var(key)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| StoreError::configuration(key))
    }
}

/// Fixed in-memory settings.
#[derive(Debug, Default, Clone)]
pub struct MapSettings(HashMap<String, String>);

impl MapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl Settings for MapSettings {
    fn get(&self, key: &str) -> Result<String, StoreError> {
        self.0
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or_else(|| StoreError::configuration(key))
    }
}

/// Everything needed to reach one collection.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub uri: ConnectionUri,
    pub database: String,
    pub collection: String,
    pub timeout: Duration,
    pub max_pool_size: u32,
}

impl StoreConfig {
    pub fn from_settings(settings: &impl Settings) -> Result<Self, StoreError> {
        let uri = connection_uri(settings)?;
        let database = settings.get(DATABASE_NAME_KEY)?;
        let collection = settings.get(COLLECTION_NAME_KEY)?;

        let timeout_secs = parse_or(settings, TIMEOUT_SECS_KEY, DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(StoreError::configuration(TIMEOUT_SECS_KEY));
        }
        let max_pool_size = parse_or(settings, MAX_POOL_SIZE_KEY, DEFAULT_MAX_POOL_SIZE)?;

        Ok(Self {
            uri,
            database,
            collection,
            timeout: Duration::from_secs(timeout_secs),
            max_pool_size,
        })
    }
}

fn parse_or<T: std::str::FromStr>(settings: &impl Settings, key: &str, default: T) -> Result<T, StoreError> {
    match settings.get_optional(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| StoreError::configuration(key)),
        None => Ok(default),
    }
}
