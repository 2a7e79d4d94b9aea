//! Configuration loading
//!
//! Reads an optional JSON config file, then applies `MMIS_*` environment overrides.
//! Missing mandatory values are a startup error.

use crate::types::config::ServerConfig;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Configuration errors; all of them abort startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Missing mandatory setting {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Load configuration from `path` (if any) and the process environment
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an injectable environment lookup
pub fn load_config_with<F>(path: Option<&Path>, env: F) -> Result<ServerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            tracing::debug!(path = %path.display(), "Loaded config file");
            serde_json::from_str(&json)?
        }
        None => ServerConfig::default(),
    };

    apply_env(&mut config, &env)?;
    config.validate();

    if config.env_slug.is_empty() {
        return Err(ConfigError::Missing("MMIS_ENV_SLUG"));
    }
    if config.api_secret.trim().is_empty() {
        return Err(ConfigError::Missing("MMIS_API_SECRET"));
    }
    Ok(config)
}

fn apply_env<F>(config: &mut ServerConfig, env: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = env("MMIS_ENV_SLUG") {
        config.env_slug = v;
    }
    if let Some(v) = env("MMIS_API_SECRET") {
        config.api_secret = v;
    }
    if let Some(v) = env("MMIS_PORT") {
        config.port = parse("MMIS_PORT", &v)?;
    }
    if let Some(v) = env("MMIS_STORE_DIR") {
        config.store_dir = v.into();
    }
    if let Some(v) = env("MMIS_DATABASE_PATH") {
        config.database_path = v;
    }
    if let Some(v) = env("MMIS_CATALOG_URL") {
        config.catalog_url = Some(v);
    }
    if let Some(v) = env("MMIS_OBJECT_STORE_URL") {
        config.object_store_url = Some(v);
    }
    if let Some(v) = env("MMIS_SERVER_URL") {
        config.server_url = Some(v);
    }
    if let Some(v) = env("MMIS_POLL_INTERVAL_SECS") {
        config.poll_interval_secs = parse("MMIS_POLL_INTERVAL_SECS", &v)?;
    }
    if let Some(v) = env("MMIS_REGISTER_BACKOFF_SECS") {
        config.register_backoff_secs = parse("MMIS_REGISTER_BACKOFF_SECS", &v)?;
    }
    if let Some(v) = env("MMIS_WORKER_INTERVAL_SECS") {
        config.worker_interval_secs = parse("MMIS_WORKER_INTERVAL_SECS", &v)?;
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
