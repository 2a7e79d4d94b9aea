//! Transfer types
//!
//! Descriptors exchanged between the model server and the transfer sidecar.

use serde::{Deserialize, Serialize};

/// Terminal outcome reported by the sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Failed => "FAILED",
        }
    }
}

/// Client request to install a model from the object store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreUpload {
    pub model_id: String,
    pub model_name: String,
    pub namespace: String,
    pub bucket_name: String,
    pub artifact_name: String,
}

/// Descriptor persisted in the transfer queue for the sidecar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub model_id: String,
    pub model_name: String,
    pub namespace: String,
    pub bucket_name: String,
    pub artifact_name: String,
    /// Environment slug of the requesting server
    pub server_env: String,
    /// Secret the server expects back in the callback
    pub server_secret: String,
    /// Secret of the sidecar that may serve this request
    pub sidecar_secret: String,
    pub callback_uri: String,
}

/// Callback sent by the sidecar once a request reaches a terminal outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCallback {
    pub model_id: String,
    pub model_name: String,
    pub status: TransferStatus,
    pub secret: String,
}
