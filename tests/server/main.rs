//! Model server integration tests.
//!
//! Each test starts the real router on an ephemeral port and drives it with reqwest.

mod support;

mod jobs;
mod lifecycle;
mod transfer;
