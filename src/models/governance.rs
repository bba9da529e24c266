//! Governance result graph
//!
//! The ontology produced by one analysis run: objects, relationships, terms,
//! plus the reasoning log the backend emitted while building it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reasoning stage label attached to a thinking step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    G,
    A,
    B,
    C,
}

/// One unit of the backend's reasoning log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingStep {
    pub phase: Phase,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: Vec<String>,
}

/// Attribute of a governed ontology object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_primary_key: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_dict: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_enum: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_mapping: Option<Value>,
    /// Original column name when the backend renamed the field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,
}

/// Business object in the governed ontology
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyObject {
    pub id: String,
    /// Technical name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Source columns as "table.column"
    #[serde(default)]
    pub mappings: Vec<String>,
    /// Fields the backend sends that this service does not model
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl OntologyObject {
    /// Baseline table this object was derived from, taken from its first mapping
    pub fn source_table(&self) -> Option<&str> {
        let mapping = self.mappings.first()?;
        let table = mapping.split('.').next()?.trim();
        if table.is_empty() {
            None
        } else {
            Some(table)
        }
    }
}

/// Directed link between two ontology objects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Source object id
    #[serde(default)]
    pub source: String,
    /// Target object id
    #[serde(default)]
    pub target: String,
    #[serde(rename = "type", default)]
    pub relation_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Business glossary term
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Aggregate root produced by one analysis run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceResult {
    #[serde(default)]
    pub thinking_steps: Vec<ThinkingStep>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub objects: Vec<OntologyObject>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub knowledge: Vec<Value>,
    #[serde(default)]
    pub sample_data: Value,
}

impl GovernanceResult {
    pub fn object(&self, id: &str) -> Option<&OntologyObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// Relationships whose endpoints are not both present in `objects`
    pub fn dangling_relationships(&self) -> Vec<&Relationship> {
        self.relationships
            .iter()
            .filter(|r| self.object(&r.source).is_none() || self.object(&r.target).is_none())
            .collect()
    }
}

/// Object summary proposed by the backend during a human-in-the-loop pause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedObject {
    pub name: String,
    #[serde(default)]
    pub chinese_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Number of attributes the backend intends to generate
    #[serde(default)]
    pub attributes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptData {
    #[serde(default)]
    pub objects: Vec<ProposedObject>,
}

/// Payload of an `interrupt` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptRequest {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: InterruptData,
}
