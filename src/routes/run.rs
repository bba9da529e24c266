//! Governance run routes
//!
//! Start a run, observe it (polling or Server-Sent Events), answer its
//! human-in-the-loop pause and cancel it.

use crate::backend::AnalyzeRequest;
use crate::error::{validation_error, ApiResult, AppError};
use crate::models::{DecisionKind, DecisionRequest, StartRunRequest, StartRunResponse, SuccessResponse};
use crate::runs::{follow, RunView};
use crate::state::SharedState;
use crate::stream::Decision;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// Start a new analysis run
pub async fn start_run(
    State(state): State<SharedState>,
    Json(payload): Json<StartRunRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<StartRunResponse>>)> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let session_id = payload
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let handle = state.runs.create(session_id.clone()).await;

    let request = AnalyzeRequest {
        session_id: session_id.clone(),
        instruction: payload.instruction,
        metadata: payload.metadata,
    };

    match state.backend.start_run(&request).await {
        Ok(chunks) => state.runs.attach(handle.run_id, chunks).await?,
        Err(e) => {
            state.runs.fail(handle.run_id, &e.to_string()).await;
            return Err(e);
        }
    }

    info!("Run {} started for session {}", handle.run_id, session_id);

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data(
            "Run started",
            StartRunResponse {
                run_id: handle.run_id,
                session_id,
            },
        )),
    ))
}

/// Current state of a run
pub async fn get_run(
    State(state): State<SharedState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<RunView>>> {
    let view = state.runs.view(run_id).await?;

    Ok(Json(SuccessResponse::with_data(format!("Run is {}", view.phase), view)))
}

/// Live event feed of a run
pub async fn run_events(
    State(state): State<SharedState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (view, receiver) = state.runs.subscribe(run_id).await?;

    let events = follow(view, receiver).map(|event| {
        Ok::<_, Infallible>(
            Event::default()
                .event(event.name())
                .data(event.payload().to_string()),
        )
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Answer a paused run and continue it on the backend
pub async fn submit_decision(
    State(state): State<SharedState>,
    Path(run_id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> ApiResult<Json<SuccessResponse<RunView>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    let decision = to_decision(payload)?;

    let request = state.runs.decide(run_id, decision).await?;

    match state.backend.resume_run(&request).await {
        Ok(chunks) => state.runs.attach(run_id, chunks).await?,
        Err(e) => {
            state.runs.fail(run_id, &e.to_string()).await;
            return Err(e);
        }
    }

    let view = state.runs.view(run_id).await?;
    Ok(Json(SuccessResponse::with_data("Decision submitted", view)))
}

/// Abort a running or paused run
pub async fn cancel_run(
    State(state): State<SharedState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<RunView>>> {
    let view = state.runs.cancel(run_id).await?;

    Ok(Json(SuccessResponse::with_data("Cancellation requested", view)))
}

fn to_decision(payload: DecisionRequest) -> Result<Decision, AppError> {
    match (payload.decision, payload.objects) {
        (DecisionKind::Confirm, _) => Ok(Decision::Confirm),
        (DecisionKind::Modify, Some(objects)) => Ok(Decision::Modify(objects)),
        (DecisionKind::Modify, None) => Err(validation_error("A modify decision requires the edited objects")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProposedObject;

    fn object(name: &str) -> ProposedObject {
        ProposedObject {
            name: name.to_string(),
            chinese_name: "订单".to_string(),
            description: None,
            attributes: 3,
        }
    }

    #[test]
    fn test_confirm_ignores_objects() {
        let decision = to_decision(DecisionRequest {
            decision: DecisionKind::Confirm,
            objects: Some(vec![object("order")]),
        })
        .unwrap();
        assert_eq!(decision, Decision::Confirm);
    }

    #[test]
    fn test_modify_requires_objects() {
        let err = to_decision(DecisionRequest {
            decision: DecisionKind::Modify,
            objects: None,
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let decision = to_decision(DecisionRequest {
            decision: DecisionKind::Modify,
            objects: Some(vec![object("order")]),
        })
        .unwrap();
        assert_eq!(decision, Decision::Modify(vec![object("order")]));
    }

    #[test]
    fn test_empty_modified_list_fails_validation() {
        let request = DecisionRequest {
            decision: DecisionKind::Modify,
            objects: Some(Vec::new()),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_blank_instruction_fails_validation() {
        let request: StartRunRequest = serde_json::from_str(r#"{"instruction": ""}"#).unwrap();
        assert!(request.validate().is_err());

        let request: StartRunRequest =
            serde_json::from_str(r#"{"sessionId": "s1", "instruction": "治理订单域"}"#).unwrap();
        assert!(request.validate().is_ok());
    }
}
