//! Service errors
//!
//! The error taxonomy surfaced by the lifecycle and job managers. Each variant maps to
//! one HTTP status in the API layer.

use crate::storage::download::UpstreamError;
use crate::storage::jobs::JobStoreError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Model already present in the cache or the registry
    #[error("{0}")]
    Conflict(String),
    /// Validation failure caused by the request (env mismatch, empty payload, bad id)
    #[error("{0}")]
    BadRequest(String),
    /// Validation failure caused by the artifact or the scorer
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    NotFound(String),
    /// Secret mismatch on an internal endpoint
    #[error("{0}")]
    Unauthorized(String),
    /// A collaborator needed for the operation is not ready
    #[error("{0}")]
    Unavailable(String),
    #[error("Upstream call failed: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("Storage error: {0}")]
    Storage(StorageError),
    #[error("Job store error: {0}")]
    JobStore(#[from] JobStoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Short message shown as `err_message`
    pub fn summary(&self) -> &'static str {
        match self {
            ServiceError::Conflict(_) => "Conflict. Model already loaded",
            ServiceError::BadRequest(_) => "Bad Request",
            ServiceError::Unprocessable(_) => "Unprocessable request",
            ServiceError::NotFound(_) => "Resource not found",
            ServiceError::Unauthorized(_) => "Unauthorized",
            ServiceError::Unavailable(_) => "Service unavailable",
            ServiceError::Upstream(_) => "Upstream service error",
            ServiceError::Storage(_) | ServiceError::JobStore(_) | ServiceError::Internal(_) => {
                "Internal server error"
            }
        }
    }

    /// Whether the failure counts against the server rather than the request
    pub fn is_server_failure(&self) -> bool {
        matches!(
            self,
            ServiceError::Upstream(_)
                | ServiceError::Storage(_)
                | ServiceError::JobStore(_)
                | ServiceError::Internal(_)
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidModelId(id) => ServiceError::BadRequest(format!("Invalid model id: {}", id)),
            StorageError::MissingMarker(_) | StorageError::Archive(_) | StorageError::Yaml(_) => {
                ServiceError::Unprocessable(format!(
                    "Model artifact contents are corrupted and/or unrecognizable: {}",
                    e
                ))
            }
            other => ServiceError::Storage(other),
        }
    }
}
