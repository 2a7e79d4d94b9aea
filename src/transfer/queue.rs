//! File-based transfer queue
//!
//! One pending request per model: `<store>/models/temp_<model_id>/model_loc.json`.
//! The directory doubles as the sidecar's download area.

use crate::storage::{validate_model_id, PENDING_PREFIX};
use crate::transfer::TransferError;
use crate::types::transfer::TransferRequest;
use std::path::{Path, PathBuf};
use tokio::fs;

const DESCRIPTOR_FILE: &str = "model_loc.json";

#[derive(Debug, Clone)]
pub struct TransferQueue {
    models_dir: PathBuf,
}

impl TransferQueue {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    /// Working directory of the pending request for `model_id`
    pub fn pending_dir(&self, model_id: &str) -> Result<PathBuf, TransferError> {
        let model_id = validate_model_id(model_id)?;
        Ok(self.models_dir.join(format!("{}{}", PENDING_PREFIX, model_id)))
    }

    /// Persist a request. Fails with `AlreadyPending` if one exists for the model.
    pub async fn enqueue(&self, request: &TransferRequest) -> Result<PathBuf, TransferError> {
        let dir = self.pending_dir(&request.model_id)?;
        fs::create_dir_all(&self.models_dir).await?;
        match fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(TransferError::AlreadyPending(request.model_id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let descriptor = dir.join(DESCRIPTOR_FILE);
        let temp = descriptor.with_extension("json.tmp");
        let write = async {
            fs::write(&temp, serde_json::to_vec_pretty(request)?).await?;
            fs::rename(&temp, &descriptor).await?;
            Ok::<(), TransferError>(())
        };
        if let Err(e) = write.await {
            let _ = fs::remove_dir_all(&dir).await;
            return Err(e);
        }
        tracing::info!(model_id = %request.model_id, "Queued transfer request");
        Ok(descriptor)
    }

    pub async fn is_pending(&self, model_id: &str) -> Result<bool, TransferError> {
        Ok(fs::try_exists(self.pending_dir(model_id)?).await?)
    }

    /// Oldest-named pending request addressed to `sidecar_secret`
    pub async fn next_for(&self, sidecar_secret: &str) -> Result<Option<TransferRequest>, TransferError> {
        let pattern = self
            .models_dir
            .join(format!("{}*", PENDING_PREFIX))
            .join(DESCRIPTOR_FILE);
        let pattern = pattern.to_string_lossy().to_string();
        let mut descriptors: Vec<PathBuf> = match glob::glob(&pattern) {
            Ok(paths) => paths.filter_map(Result::ok).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Invalid transfer queue pattern");
                return Ok(None);
            }
        };
        descriptors.sort();

        for path in descriptors {
            match read_descriptor(&path).await {
                Ok(request) if request.sidecar_secret == sidecar_secret => return Ok(Some(request)),
                Ok(request) => {
                    tracing::debug!(model_id = %request.model_id, "Skipping request addressed to another sidecar");
                }
                // Descriptor still being written, or removed by another process.
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable descriptor"),
            }
        }
        Ok(None)
    }

    /// Remove the pending request and its download area
    pub async fn discard(&self, model_id: &str) -> Result<(), TransferError> {
        match fs::remove_dir_all(self.pending_dir(model_id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_descriptor(path: &Path) -> Result<TransferRequest, TransferError> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
