//! Model lifecycle coordination
//!
//! Load, upload, removal and inference of model artifacts shared by all replicas
//! through the artifact store and its registry file.

pub mod cache;
pub mod manager;
pub mod scorer;
pub mod secrets;

pub use cache::ModelCache;
pub use manager::{
    CallbackOutcome, InferOutcome, LifecycleManager, LoadOutcome, RemoveOutcome, TransferAccepted,
};
pub use scorer::{Scorer, ScorerError, ScorerLoader, ScriptScorerLoader};
pub use secrets::SecretBook;
