//! Ontology Diff Module
//!
//! Detecting what governance changed:
//! - Baseline parsing (original metadata in several loose formats)
//! - Schema diff (original tables vs. governed objects)
//! - Checkpoint diff (one snapshot of a thread vs. another)

pub mod baseline;
pub mod checkpoint;
pub mod schema;

pub use checkpoint::{CheckpointDiff, CheckpointDiffEngine};
pub use schema::{ExtendedFieldChanges, SchemaDiffEngine};
