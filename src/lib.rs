//! mmis library
//!
//! Model lifecycle coordination for a replicated inference tier: the model server,
//! the transfer sidecar and the async scoring worker.

pub mod api;
pub mod app;
pub mod error;
pub mod jobs;
pub mod lifecycle;
pub mod storage;
pub mod system;
pub mod transfer;
pub mod types;
