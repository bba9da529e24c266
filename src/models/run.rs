//! Run-related request/response DTOs

use crate::models::governance::{GovernanceResult, ProposedObject};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Request to start a governance analysis run
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    /// Backend thread to continue; a new one is allocated when absent
    #[validate(length(min = 1, max = 128, message = "Session id must be between 1 and 128 characters"))]
    pub session_id: Option<String>,
    #[validate(length(min = 1, message = "Instruction is required"))]
    pub instruction: String,
    /// Original metadata text attached by the user
    pub metadata: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub run_id: Uuid,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Confirm,
    Modify,
}

/// Human decision for a paused run
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub decision: DecisionKind,
    #[validate(length(min = 1, message = "Modified object list must not be empty"))]
    pub objects: Option<Vec<ProposedObject>>,
}

/// Request to diff original metadata against a governed result
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiffRequest {
    pub baseline: String,
    pub session_id: Option<String>,
    pub result: Option<GovernanceResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareQuery {
    pub checkpoint1: String,
    pub checkpoint2: String,
    /// Ask the backend to compute the diff instead of diffing locally
    #[serde(default)]
    pub remote: bool,
}
