//! Schema diff route
//!
//! Compares the user's original metadata with what governance produced.

use crate::diff::{ExtendedFieldChanges, SchemaDiffEngine};
use crate::error::ApiResult;
use crate::models::{GovernanceResult, SchemaDiffRequest, SuccessResponse};
use crate::state::SharedState;
use axum::{extract::State, Json};

/// Field-level diff of a baseline against a governed result
///
/// The governed side is the result in the request, else the session's last
/// committed result, else an empty result.
pub async fn schema_diff(
    State(state): State<SharedState>,
    Json(payload): Json<SchemaDiffRequest>,
) -> ApiResult<Json<SuccessResponse<ExtendedFieldChanges>>> {
    let governed = match (payload.result, payload.session_id) {
        (Some(result), _) => result,
        (None, Some(session_id)) => state.runs.session_result(&session_id).await.unwrap_or_default(),
        (None, None) => GovernanceResult::default(),
    };

    let changes = SchemaDiffEngine::diff_text(&payload.baseline, &governed);
    let changed = changes.values().filter(|c| c.has_changes()).count();

    tracing::info!(
        "Schema diff: {} objects compared, {} with changes",
        changes.len(),
        changed
    );

    Ok(Json(SuccessResponse::with_data(
        format!("{} objects with field changes", changed),
        changes,
    )))
}
