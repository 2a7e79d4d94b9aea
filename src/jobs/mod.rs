//! Asynchronous batch jobs
//!
//! Clients submit scoring jobs to the [`AsyncJobManager`]; a separate
//! [`ScoringWorker`] process claims them from the job table and runs the pipeline.

pub mod backend;
pub mod manager;
pub mod worker;

pub use backend::{HttpInferenceBackend, InferenceBackend};
pub use manager::{AsyncJobManager, JobLookup};
pub use worker::{PipelineError, ScoringWorker};
