//! Runtime configuration, read from the environment (and an optional `.env`).

use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_DATABASE: &str = "TripSplit";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set when STORAGE_BACKEND is {1}")]
    Missing(&'static str, StorageBackend),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageBackend {
    #[default]
    Mongodb,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(Self::Mongodb),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend '{other}'")),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Mongodb => "mongodb",
            Self::Memory => "memory",
        })
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub storage: StorageBackend,
    /// Only `None` with the memory backend.
    pub mongodb_uri: Option<String>,
    pub database_name: String,
    pub http_host: String,
    pub http_port: u16,
    /// `None` means any origin is allowed.
    pub allowed_origin: Option<String>,
}

impl Config {
    /// Loads `.env` if present. Call before [`Config::log_level`] and [`Config::from_env`].
    pub fn load_dotenv() {
        dotenv::dotenv().ok();
    }

    pub fn log_level() -> String {
        env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let storage = parse_or(&lookup, "STORAGE_BACKEND", StorageBackend::default());
        let mongodb_uri = non_empty(&lookup, "MONGODB_URI");
        if storage == StorageBackend::Mongodb && mongodb_uri.is_none() {
            return Err(ConfigError::Missing("MONGODB_URI", storage));
        }

        Ok(Self {
            storage,
            mongodb_uri,
            database_name: non_empty(&lookup, "DATABASE_NAME")
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            http_host: non_empty(&lookup, "HTTP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            http_port: parse_or(&lookup, "HTTP_PORT", DEFAULT_PORT),
            allowed_origin: non_empty(&lookup, "ALLOWED_ORIGIN"),
        })
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match non_empty(lookup, key) {
        None => {
            info!("{key} not set, using default: {default}");
            default
        }
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}, using default: {default}");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn memory_backend_needs_no_uri() {
        let config = Config::from_lookup(lookup(&[("STORAGE_BACKEND", "memory")])).unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.database_name, "TripSplit");
        assert_eq!(config.http_host, "0.0.0.0");
        assert_eq!(config.http_port, 8080);
        assert!(config.allowed_origin.is_none());
    }

    #[test]
    fn mongodb_backend_requires_uri() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("MONGODB_URI", StorageBackend::Mongodb));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("MONGODB_URI", "mongodb://localhost:27017"),
            ("HTTP_PORT", "eighty"),
            ("STORAGE_BACKEND", "postgres"),
        ]))
        .unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.storage, StorageBackend::Mongodb);
    }
}
