//! Persistent storage
//!
//! This module handles the shared artifact store, the model registry file, the job table
//! and the upstream catalog / object storage services.

pub mod artifacts;
pub mod catalog;
pub mod download;
pub mod jobs;
pub mod object_store;
pub mod registry;
pub mod settings;

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the artifact store and registry
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Runtime descriptor error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("Invalid model id: {0}")]
    InvalidModelId(String),
    #[error("Required file '{0}' not present in model artifact")]
    MissingMarker(&'static str),
    #[error("Could not determine data directory")]
    NoDataDir,
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Directory prefix of pending transfer requests under `models/`
pub const PENDING_PREFIX: &str = "temp_";

/// Path segments routed before `/uploadmodel/:model_id`
const RESERVED_MODEL_IDS: [&str; 2] = ["oss", "callback"];

static MODEL_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,255}$").expect("valid model id pattern"));

/// Reject identifiers that could escape the artifact store, collide with a pending
/// transfer directory, or shadow a fixed upload route
pub fn validate_model_id(model_id: &str) -> Result<&str, StorageError> {
    if model_id == "."
        || model_id == ".."
        || !MODEL_ID_PATTERN.is_match(model_id)
        || model_id.starts_with(PENDING_PREFIX)
        || RESERVED_MODEL_IDS.contains(&model_id)
    {
        return Err(StorageError::InvalidModelId(model_id.to_string()));
    }
    Ok(model_id)
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    directories::ProjectDirs::from("io", "mmis", "mmis")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StorageError::NoDataDir)
}
