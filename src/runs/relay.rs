//! Run view and event relay
//!
//! A run is observed two ways: a polled [`RunView`] kept current in a watch
//! channel, and a live feed of [`RelayEvent`]s fanned out over broadcast.

use crate::models::{GovernanceResult, InterruptRequest, ThinkingStep};
use crate::stream::{EventHandler, RunContext, RunHandle, RunPhase};
use chrono::{DateTime, Utc};
use futures::{stream, Stream};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{trace, warn};
use uuid::Uuid;

/// Externally visible state of one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    pub run_id: Uuid,
    pub session_id: String,
    pub phase: RunPhase,
    pub thinking_steps: Vec<ThinkingStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<InterruptRequest>,
    /// Only populated once the run is terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GovernanceResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// False for cancelled or truncated runs: the thinking log is partial
    pub complete: bool,
    /// SHA-256 of the result, set once the run completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunView {
    pub fn new(handle: &RunHandle) -> Self {
        let now = Utc::now();
        Self {
            run_id: handle.run_id,
            session_id: handle.session_id.clone(),
            phase: RunPhase::Running,
            thinking_steps: Vec::new(),
            pending_interrupt: None,
            result: None,
            error: None,
            complete: false,
            fingerprint: None,
            started_at: now,
            updated_at: now,
        }
    }
}

/// One item of a run's live feed
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// Current view, sent first to every subscriber
    Snapshot(Box<RunView>),
    Thinking(ThinkingStep),
    Progress(Value),
    Interrupt(InterruptRequest),
    Complete(Box<GovernanceResult>),
    Error(String),
    Cancelled,
    Incomplete,
}

impl RelayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::Snapshot(_) => "snapshot",
            RelayEvent::Thinking(_) => "thinking",
            RelayEvent::Progress(_) => "progress",
            RelayEvent::Interrupt(_) => "interrupt",
            RelayEvent::Complete(_) => "complete",
            RelayEvent::Error(_) => "error",
            RelayEvent::Cancelled => "cancelled",
            RelayEvent::Incomplete => "incomplete",
        }
    }

    pub fn payload(&self) -> Value {
        let value = match self {
            RelayEvent::Snapshot(view) => serde_json::to_value(view),
            RelayEvent::Thinking(step) => serde_json::to_value(step),
            RelayEvent::Progress(payload) => Ok(payload.clone()),
            RelayEvent::Interrupt(request) => serde_json::to_value(request),
            RelayEvent::Complete(result) => serde_json::to_value(result),
            RelayEvent::Error(message) => Ok(json!({ "message": message })),
            RelayEvent::Cancelled | RelayEvent::Incomplete => Ok(json!({})),
        };
        value.unwrap_or_default()
    }

    /// Nothing follows this event on the feed
    pub fn is_terminal(&self) -> bool {
        match self {
            RelayEvent::Snapshot(view) => view.phase.is_terminal(),
            RelayEvent::Complete(_) | RelayEvent::Error(_) | RelayEvent::Cancelled | RelayEvent::Incomplete => true,
            RelayEvent::Thinking(_) | RelayEvent::Progress(_) | RelayEvent::Interrupt(_) => false,
        }
    }
}

/// Fold the authoritative run state into the view
pub fn sync_view(view: &watch::Sender<RunView>, run: &RunContext) {
    view.send_modify(|v| {
        v.phase = run.coordinator.phase();
        v.pending_interrupt = run.coordinator.pending().cloned();
        v.thinking_steps = run.materializer.thinking_steps().to_vec();
        if v.phase.is_terminal() {
            v.result = run.materializer.result().cloned();
            v.complete = v.phase == RunPhase::Completed && run.materializer.is_complete();
            v.fingerprint = if v.complete { run.materializer.fingerprint() } else { None };
        }
        if let Some(error) = run.materializer.last_error() {
            v.error = Some(error.to_string());
        }
        v.updated_at = Utc::now();
    });
}

/// Event handler that mirrors dispatched events into a run's view and feed
pub struct RelayHandler {
    view: Arc<watch::Sender<RunView>>,
    events: broadcast::Sender<RelayEvent>,
    /// Result visible before this run, kept on failure or cancellation
    previous: Option<GovernanceResult>,
}

impl RelayHandler {
    pub fn new(
        view: Arc<watch::Sender<RunView>>,
        events: broadcast::Sender<RelayEvent>,
        previous: Option<GovernanceResult>,
    ) -> Self {
        Self { view, events, previous }
    }

    /// Stream ended without a terminal event
    pub fn on_incomplete(&mut self) {
        let previous = self.previous.clone();
        self.emit(RelayEvent::Incomplete, |v| {
            v.phase = RunPhase::Incomplete;
            v.result = previous;
            v.complete = false;
        });
    }

    /// Apply `modify` to the view and publish `event` under the same write lock
    fn emit(&self, event: RelayEvent, modify: impl FnOnce(&mut RunView)) {
        self.view.send_modify(|v| {
            modify(v);
            v.updated_at = Utc::now();
            if self.events.send(event).is_err() {
                trace!("No subscribers for run event");
            }
        });
    }
}

impl EventHandler for RelayHandler {
    fn on_thinking(&mut self, step: &ThinkingStep) {
        self.emit(RelayEvent::Thinking(step.clone()), |v| v.thinking_steps.push(step.clone()));
    }

    fn on_progress(&mut self, payload: &Value) {
        self.emit(RelayEvent::Progress(payload.clone()), |_| {});
    }

    fn on_interrupt(&mut self, request: &InterruptRequest) {
        self.emit(RelayEvent::Interrupt(request.clone()), |v| {
            v.phase = RunPhase::AwaitingHuman;
            v.pending_interrupt = Some(request.clone());
        });
    }

    fn on_complete(&mut self, result: &GovernanceResult) {
        self.emit(RelayEvent::Complete(Box::new(result.clone())), |v| {
            v.phase = RunPhase::Completed;
            v.pending_interrupt = None;
            v.result = Some(result.clone());
            v.error = None;
            v.complete = true;
        });
    }

    fn on_error(&mut self, message: &str) {
        let previous = self.previous.clone();
        self.emit(RelayEvent::Error(message.to_string()), |v| {
            v.phase = RunPhase::Failed;
            v.pending_interrupt = None;
            v.result = previous;
            v.error = Some(message.to_string());
            v.complete = false;
        });
    }

    fn on_cancelled(&mut self) {
        let previous = self.previous.clone();
        self.emit(RelayEvent::Cancelled, |v| {
            v.phase = RunPhase::Cancelled;
            v.pending_interrupt = None;
            v.result = previous;
            v.complete = false;
        });
    }
}

/// Live feed for one subscriber: the current view, then every event up to
/// and including the first terminal one
pub fn follow(view: RunView, receiver: broadcast::Receiver<RelayEvent>) -> impl Stream<Item = RelayEvent> + Send {
    let first = RelayEvent::Snapshot(Box::new(view));

    stream::unfold(Some((Some(first), receiver)), |state| async move {
        let Some((pending, mut receiver)) = state else {
            return None;
        };

        if let Some(event) = pending {
            let next = (!event.is_terminal()).then_some((None, receiver));
            return Some((event, next));
        }

        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let next = (!event.is_terminal()).then_some((None, receiver));
                    return Some((event, next));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Run subscriber lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Phase;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    fn step(title: &str) -> ThinkingStep {
        ThinkingStep {
            phase: Phase::B,
            title: title.to_string(),
            description: String::new(),
            details: Vec::new(),
        }
    }

    fn relay(previous: Option<GovernanceResult>) -> (RelayHandler, Arc<watch::Sender<RunView>>, broadcast::Receiver<RelayEvent>) {
        let (view, _) = watch::channel(RunView::new(&RunHandle::new("s1")));
        let view = Arc::new(view);
        let (events, receiver) = broadcast::channel(16);
        (RelayHandler::new(view.clone(), events, previous), view, receiver)
    }

    fn names(events: &[RelayEvent]) -> Vec<&'static str> {
        events.iter().map(RelayEvent::name).collect()
    }

    #[test]
    fn test_thinking_is_mirrored_and_published() {
        let (mut handler, view, mut receiver) = relay(None);
        handler.on_thinking(&step("识别实体"));

        assert_eq!(view.borrow().thinking_steps.len(), 1);
        assert!(matches!(receiver.try_recv(), Ok(RelayEvent::Thinking(s)) if s.title == "识别实体"));
    }

    #[test]
    fn test_error_keeps_previous_result() {
        let previous = GovernanceResult {
            summary: "last good".to_string(),
            ..Default::default()
        };
        let (mut handler, view, _receiver) = relay(Some(previous.clone()));

        handler.on_error("LLM timeout");

        let view = view.borrow();
        assert_eq!(view.phase, RunPhase::Failed);
        assert_eq!(view.result, Some(previous));
        assert_eq!(view.error.as_deref(), Some("LLM timeout"));
        assert!(!view.complete);
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let (view, _) = watch::channel(RunView::new(&RunHandle::new("s1")));
        let (events, _) = broadcast::channel(4);
        let mut handler = RelayHandler::new(Arc::new(view), events, None);

        handler.on_complete(&GovernanceResult::default());
        handler.on_incomplete();
    }

    #[test]
    fn test_payload_shapes() {
        assert_eq!(RelayEvent::Error("boom".to_string()).payload(), json!({ "message": "boom" }));
        assert_eq!(RelayEvent::Cancelled.payload(), json!({}));
        assert_eq!(RelayEvent::Thinking(step("x")).payload()["title"], json!("x"));
    }

    #[tokio::test]
    async fn test_follow_stops_after_terminal_event() {
        let (mut handler, view, receiver) = relay(None);
        let snapshot = view.borrow().clone();

        handler.on_thinking(&step("a"));
        handler.on_progress(&json!({ "p": 10 }));
        handler.on_complete(&GovernanceResult::default());
        handler.on_thinking(&step("late"));

        let events: Vec<RelayEvent> = follow(snapshot, receiver).collect().await;
        assert_eq!(names(&events), vec!["snapshot", "thinking", "progress", "complete"]);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_each_step_once() {
        let (view, _) = watch::channel(RunView::new(&RunHandle::new("s1")));
        let view = Arc::new(view);
        let (events, _) = broadcast::channel(16);
        let mut handler = RelayHandler::new(view.clone(), events.clone(), None);

        handler.on_thinking(&step("a"));
        let (snapshot, receiver) = {
            let current = view.borrow();
            (current.clone(), events.subscribe())
        };
        handler.on_thinking(&step("b"));
        handler.on_complete(&GovernanceResult::default());

        let events: Vec<RelayEvent> = follow(snapshot, receiver).collect().await;
        assert_eq!(names(&events), vec!["snapshot", "thinking", "complete"]);
        assert!(matches!(&events[0], RelayEvent::Snapshot(v) if v.thinking_steps.len() == 1));
        assert!(matches!(&events[1], RelayEvent::Thinking(s) if s.title == "b"));
    }

    #[tokio::test]
    async fn test_follow_finished_run_yields_snapshot_only() {
        let (mut handler, view, receiver) = relay(None);
        handler.on_cancelled();

        let snapshot = view.borrow().clone();
        let events: Vec<RelayEvent> = follow(snapshot, receiver).collect().await;
        assert_eq!(names(&events), vec!["snapshot"]);
    }

    #[tokio::test]
    async fn test_follow_continues_across_interrupt() {
        let (mut handler, view, receiver) = relay(None);
        let snapshot = view.borrow().clone();

        handler.on_interrupt(&InterruptRequest {
            kind: "confirm_objects".to_string(),
            message: String::new(),
            data: Default::default(),
        });
        handler.on_error("resume failed");

        let events: Vec<RelayEvent> = follow(snapshot, receiver).collect().await;
        assert_eq!(names(&events), vec!["snapshot", "interrupt", "error"]);
    }
}
