//! Checkpoint routes
//!
//! Read-through to the backend's checkpoint history, plus local comparison.

use crate::diff::{CheckpointDiff, CheckpointDiffEngine};
use crate::error::{validation_error, ApiResult};
use crate::models::{Checkpoint, CheckpointState, CompareQuery, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    Json,
};

/// List a session's checkpoints, newest first
pub async fn list_checkpoints(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SuccessResponse<Vec<Checkpoint>>>> {
    let checkpoints = state.backend.list_checkpoints(&session_id).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Found {} checkpoints", checkpoints.len()),
        checkpoints,
    )))
}

/// Full state of one checkpoint
pub async fn get_checkpoint(
    State(state): State<SharedState>,
    Path((session_id, checkpoint_id)): Path<(String, String)>,
) -> ApiResult<Json<SuccessResponse<CheckpointState>>> {
    let checkpoint = state.backend.get_checkpoint(&session_id, &checkpoint_id).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Checkpoint at step {}", checkpoint.step),
        checkpoint,
    )))
}

/// Compare two checkpoints, locally by default
pub async fn compare_checkpoints(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    Query(query): Query<CompareQuery>,
) -> ApiResult<Json<SuccessResponse<CheckpointDiff>>> {
    if query.checkpoint1.trim().is_empty() || query.checkpoint2.trim().is_empty() {
        return Err(validation_error("Both checkpoint1 and checkpoint2 are required"));
    }

    let diff = if query.remote {
        state
            .backend
            .compare_checkpoints(&session_id, &query.checkpoint1, &query.checkpoint2)
            .await?
    } else {
        let (from, to) = tokio::try_join!(
            state.backend.get_checkpoint(&session_id, &query.checkpoint1),
            state.backend.get_checkpoint(&session_id, &query.checkpoint2),
        )?;
        CheckpointDiffEngine::diff(&from, &to)
    };

    let message = if diff.is_empty() {
        "No changes between checkpoints".to_string()
    } else {
        format!(
            "{} objects, {} relationships, {} terms changed",
            diff.objects_diff.summary.total(),
            diff.relationships_diff.summary.total(),
            diff.terms_diff.summary.total()
        )
    };

    Ok(Json(SuccessResponse::with_data(message, diff)))
}

/// Make a checkpoint the new head of the session
pub async fn restore_checkpoint(
    State(state): State<SharedState>,
    Path((session_id, checkpoint_id)): Path<(String, String)>,
) -> ApiResult<Json<SuccessResponse<CheckpointState>>> {
    let restored = state.backend.restore_checkpoint(&session_id, &checkpoint_id).await?;

    tracing::info!("Session {} restored to checkpoint {}", session_id, checkpoint_id);

    Ok(Json(SuccessResponse::with_data(
        format!("Restored to checkpoint {}", restored.checkpoint_id),
        restored,
    )))
}
