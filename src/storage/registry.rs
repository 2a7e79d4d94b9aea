//! Model registry
//!
//! A single JSON file in the artifact store mapping model id to display name. Every
//! replica reads it before trusting its own cache, so each operation re-reads the file.
//! Writes are read-modify-write without locking: the last writer wins.

use crate::storage::StorageError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Handle to the registry file
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    path: PathBuf,
}

impl ModelRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries; a missing file is an empty registry
    pub async fn entries(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Display name registered for `model_id`
    pub async fn get(&self, model_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().await?.remove(model_id))
    }

    pub async fn contains(&self, model_id: &str) -> Result<bool, StorageError> {
        Ok(self.entries().await?.contains_key(model_id))
    }

    /// Add or replace an entry
    pub async fn insert(&self, model_id: &str, display_name: &str) -> Result<(), StorageError> {
        let mut entries = self.entries().await?;
        entries.insert(model_id.to_string(), display_name.to_string());
        self.write(&entries).await?;
        tracing::debug!(model_id = %model_id, "Registry entry written");
        Ok(())
    }

    /// Remove an entry, returning whether it existed
    pub async fn remove(&self, model_id: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries().await?;
        if entries.remove(model_id).is_none() {
            return Ok(false);
        }
        self.write(&entries).await?;
        tracing::debug!(model_id = %model_id, "Registry entry removed");
        Ok(true)
    }

    async fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Unique temp name so concurrent replicas never interleave partial writes.
        let temp_path = self.path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&temp_path, json).await?;
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}
