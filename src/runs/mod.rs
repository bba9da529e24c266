//! Run Orchestration Module
//!
//! Runs started through the HTTP API:
//! - Registry (lifecycle, decisions, cancellation, committed results, retention)
//! - Relay (run views and live event feeds)

pub mod registry;
pub mod relay;

pub use registry::{spawn_cleanup_task, RunRegistry};
pub use relay::{follow, RunView};
