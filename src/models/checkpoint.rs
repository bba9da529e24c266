//! Checkpoint records
//!
//! Checkpoints are written by the analysis backend at node boundaries.
//! This service only reads, diffs and asks the backend to restore them.

use crate::models::governance::{OntologyObject, Relationship, Term, ThinkingStep};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Counts and position recorded with each checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSummary {
    #[serde(default)]
    pub object_count: usize,
    #[serde(default)]
    pub relationship_count: usize,
    #[serde(default)]
    pub term_count: usize,
    #[serde(default)]
    pub current_node: Option<String>,
    #[serde(default)]
    pub executed_nodes: Vec<String>,
}

/// Lightweight checkpoint metadata, used for listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub thread_id: String,
    /// None only for the root of a thread
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub timestamp: String,
    pub step: i64,
    #[serde(default)]
    pub writes: Value,
    #[serde(default)]
    pub summary: CheckpointSummary,
}

impl Checkpoint {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Order checkpoints newest-first, so index 0 is the thread head
pub fn sort_newest_first(checkpoints: &mut [Checkpoint]) {
    checkpoints.sort_by(|a, b| b.step.cmp(&a.step));
}

/// Full ontology state captured by a checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointContent {
    #[serde(default)]
    pub objects: Vec<OntologyObject>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub knowledge: Vec<Value>,
    #[serde(default)]
    pub thinking_steps: Vec<ThinkingStep>,
    #[serde(default)]
    pub executed_nodes: Vec<String>,
    #[serde(default)]
    pub current_node: Option<String>,
}

/// Full snapshot of one checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointState {
    pub checkpoint_id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub step: i64,
    #[serde(default)]
    pub state: CheckpointContent,
}
