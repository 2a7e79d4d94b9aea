//! Out-of-band model transfers
//!
//! The model server queues transfer requests in the artifact store; the sidecar
//! picks them up, installs the model, then calls the server back.

pub mod agent;
pub mod link;
pub mod queue;

pub use agent::{AgentOutcome, TransferAgent};
pub use link::{HttpServerLink, ServerLink};
pub use queue::TransferQueue;

use crate::storage::download::UpstreamError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid transfer descriptor: {0}")]
    Json(#[from] serde_json::Error),
    #[error("A transfer for model {0} is already pending")]
    AlreadyPending(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("Model server rejected the request: {0}")]
    Rejected(String),
    #[error("Environment mismatch: model requires {required}, server runs {server}")]
    EnvMismatch { required: String, server: String },
}
