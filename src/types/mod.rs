//! Shared type definitions
//!
//! Data model shared by the model server, the transfer sidecar and the scoring worker.

pub mod config;
pub mod job;
pub mod model;
pub mod transfer;
