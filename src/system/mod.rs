//! System utilities
//!
//! Runtime counters and resource usage reported by the server info endpoint.

pub mod resources;
pub mod stats;
