//! Checkpoint Diff Engine
//!
//! Compares two full ontology snapshots of a thread, entity by entity.
//! Only changes are reported; entities equal on both sides are left out.

use crate::models::{CheckpointState, OntologyObject, Relationship, Term};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Entities matched across snapshots by a stable id
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for OntologyObject {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Relationship {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Term {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Identity of one side of the comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRef {
    pub id: String,
    pub timestamp: String,
    pub step: i64,
}

impl From<&CheckpointState> for CheckpointRef {
    fn from(state: &CheckpointState) -> Self {
        Self {
            id: state.checkpoint_id.clone(),
            timestamp: state.timestamp.clone(),
            step: state.step,
        }
    }
}

/// An entity present on both sides with different content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedEntity<T> {
    pub before: T,
    pub after: T,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCounts {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl DiffCounts {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

/// Changes within one entity collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDiff<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
    pub modified: Vec<ModifiedEntity<T>>,
    pub summary: DiffCounts,
}

impl<T> EntityDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Complete comparison of two checkpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointDiff {
    pub checkpoint1: CheckpointRef,
    pub checkpoint2: CheckpointRef,
    pub objects_diff: EntityDiff<OntologyObject>,
    pub relationships_diff: EntityDiff<Relationship>,
    pub terms_diff: EntityDiff<Term>,
}

impl CheckpointDiff {
    /// No change between the two versions
    pub fn is_empty(&self) -> bool {
        self.objects_diff.is_empty() && self.relationships_diff.is_empty() && self.terms_diff.is_empty()
    }
}

/// The diff engine that compares checkpoint snapshots
pub struct CheckpointDiffEngine;

impl CheckpointDiffEngine {
    /// Compare `from` (older, version 1) with `to` (newer, version 2)
    pub fn diff(from: &CheckpointState, to: &CheckpointState) -> CheckpointDiff {
        CheckpointDiff {
            checkpoint1: CheckpointRef::from(from),
            checkpoint2: CheckpointRef::from(to),
            objects_diff: Self::diff_collection(&from.state.objects, &to.state.objects),
            relationships_diff: Self::diff_collection(&from.state.relationships, &to.state.relationships),
            terms_diff: Self::diff_collection(&from.state.terms, &to.state.terms),
        }
    }

    fn diff_collection<T>(from: &[T], to: &[T]) -> EntityDiff<T>
    where
        T: Keyed + Serialize + Clone,
    {
        // First occurrence wins when an id repeats
        let mut from_map: HashMap<&str, &T> = HashMap::new();
        for entity in from {
            from_map.entry(entity.key()).or_insert(entity);
        }
        let mut to_map: HashMap<&str, &T> = HashMap::new();
        for entity in to {
            to_map.entry(entity.key()).or_insert(entity);
        }

        let mut added = Vec::new();
        let mut modified = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();

        // Walk in source order so results are stable
        for entity in to {
            let key = entity.key();
            if !visited.insert(key) {
                continue;
            }
            match from_map.get(key) {
                None => added.push(entity.clone()),
                Some(before) => {
                    if !Self::same_content(*before, entity) {
                        modified.push(ModifiedEntity {
                            before: (*before).clone(),
                            after: entity.clone(),
                        });
                    }
                }
            }
        }

        let mut removed = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        for entity in from {
            let key = entity.key();
            if visited.insert(key) && !to_map.contains_key(key) {
                removed.push(entity.clone());
            }
        }

        let summary = DiffCounts {
            added: added.len(),
            removed: removed.len(),
            modified: modified.len(),
        };

        EntityDiff {
            added,
            removed,
            modified,
            summary,
        }
    }

    /// Deep comparison through JSON values, so object key order never matters
    fn same_content<T: Serialize>(a: &T, b: &T) -> bool {
        let a = serde_json::to_value(a).unwrap_or_default();
        let b = serde_json::to_value(b).unwrap_or_default();
        a == b
    }
}
