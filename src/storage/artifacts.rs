//! Artifact store
//!
//! Extracted model directories on the shared volume, one directory per model id.

use crate::storage::registry::ModelRegistry;
use crate::storage::{validate_model_id, StorageError};
use serde_json::Value;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Scoring entry point every artifact must ship
pub const SCORE_FILE: &str = "score.py";
/// Runtime descriptor every artifact must ship
pub const RUNTIME_FILE: &str = "runtime.yaml";
/// Registry file name at the store root
pub const REGISTRY_FILE: &str = "registry.json";

const MODELS_DIR: &str = "models";

/// Handle to the shared artifact store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one sub-directory per model
    pub fn models_dir(&self) -> PathBuf {
        self.root.join(MODELS_DIR)
    }

    /// Registry handle backed by this store
    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::new(self.root.join(REGISTRY_FILE))
    }

    pub fn model_dir(&self, model_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.models_dir().join(validate_model_id(model_id)?))
    }

    /// Create the store layout if needed
    pub async fn ensure_layout(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.models_dir()).await?;
        Ok(())
    }

    /// True when the model directory exists and is not empty
    pub async fn is_present(&self, model_id: &str) -> Result<bool, StorageError> {
        let dir = self.model_dir(model_id)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Ok(entries.next_entry().await?.is_some())
    }

    /// Extract an archive file into the model directory, replacing any previous content
    pub async fn extract_file(&self, model_id: &str, archive: &Path) -> Result<PathBuf, StorageError> {
        let dest = self.prepare_dir(model_id).await?;
        let archive = archive.to_path_buf();
        let target = dest.clone();
        let result = run_blocking(move || {
            let file = std::fs::File::open(&archive)?;
            unpack(file, &target)
        })
        .await;
        self.finish_extract(model_id, dest, result).await
    }

    /// Extract in-memory archive bytes into the model directory
    pub async fn extract_bytes(&self, model_id: &str, bytes: Vec<u8>) -> Result<PathBuf, StorageError> {
        let dest = self.prepare_dir(model_id).await?;
        let target = dest.clone();
        let result = run_blocking(move || unpack(Cursor::new(bytes), &target)).await;
        self.finish_extract(model_id, dest, result).await
    }

    /// Both marker files must be present
    pub async fn verify_markers(&self, model_id: &str) -> Result<(), StorageError> {
        let dir = self.model_dir(model_id)?;
        for marker in [SCORE_FILE, RUNTIME_FILE] {
            if !fs::try_exists(dir.join(marker)).await? {
                return Err(StorageError::MissingMarker(marker));
            }
        }
        Ok(())
    }

    /// Runtime descriptor contents as JSON
    pub async fn read_runtime(&self, model_id: &str) -> Result<Value, StorageError> {
        let path = self.model_dir(model_id)?.join(RUNTIME_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::MissingMarker(RUNTIME_FILE))
            }
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_yaml::from_str(&content)?;
        Ok(value)
    }

    /// Environment slug declared by the runtime descriptor
    pub async fn runtime_env_slug(&self, model_id: &str) -> Result<Option<String>, StorageError> {
        let runtime = self.read_runtime(model_id).await?;
        Ok(env_slug_of(&runtime).map(str::to_string))
    }

    /// Delete the model directory, returning whether it existed
    pub async fn remove(&self, model_id: &str) -> Result<bool, StorageError> {
        let dir = self.model_dir(model_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!(model_id = %model_id, "Deleted model artifact directory");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn prepare_dir(&self, model_id: &str) -> Result<PathBuf, StorageError> {
        let dest = self.model_dir(model_id)?;
        if fs::try_exists(&dest).await? {
            fs::remove_dir_all(&dest).await?;
            tracing::debug!(model_id = %model_id, "Recreating model artifact directory");
        }
        fs::create_dir_all(&dest).await?;
        Ok(dest)
    }

    async fn finish_extract(
        &self,
        model_id: &str,
        dest: PathBuf,
        result: Result<(), StorageError>,
    ) -> Result<PathBuf, StorageError> {
        match result {
            Ok(()) => {
                tracing::debug!(model_id = %model_id, dir = %dest.display(), "Extracted model artifacts");
                Ok(dest)
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&dest).await;
                Err(e)
            }
        }
    }
}

/// `MODEL_DEPLOYMENT.INFERENCE_CONDA_ENV.INFERENCE_ENV_SLUG`
pub fn env_slug_of(runtime: &Value) -> Option<&str> {
    runtime
        .pointer("/MODEL_DEPLOYMENT/INFERENCE_CONDA_ENV/INFERENCE_ENV_SLUG")
        .and_then(Value::as_str)
}

fn unpack<R: Read + Seek>(reader: R, dest: &Path) -> Result<(), StorageError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    archive.extract(dest)?;
    Ok(())
}

async fn run_blocking<F>(f: F) -> Result<(), StorageError>
where
    F: FnOnce() -> Result<(), StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}
