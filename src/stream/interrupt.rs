//! Interrupt Coordinator
//!
//! Tracks the lifecycle of one run and the human-in-the-loop pause:
//! `Running -> AwaitingHuman -> Running | Cancelled`, plus the terminal
//! states reached from `Running`.

use crate::models::{DecisionKind, InterruptRequest, ProposedObject};
use crate::stream::StreamError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Running,
    AwaitingHuman,
    Cancelled,
    Completed,
    Failed,
    /// Stream ended without a terminal event
    Incomplete,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunPhase::Running | RunPhase::AwaitingHuman)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Running => "running",
            RunPhase::AwaitingHuman => "awaiting_human",
            RunPhase::Cancelled => "cancelled",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
            RunPhase::Incomplete => "incomplete",
        };
        f.write_str(name)
    }
}

/// Human decision on a paused run
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Accept the proposed objects unchanged
    Confirm,
    /// Continue with an edited object list
    Modify(Vec<ProposedObject>),
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Confirm => DecisionKind::Confirm,
            Decision::Modify(_) => DecisionKind::Modify,
        }
    }
}

/// Request that resumes a paused thread on the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub session_id: String,
    pub decision: DecisionKind,
    pub objects: Vec<ProposedObject>,
}

#[derive(Debug, Clone)]
pub struct InterruptCoordinator {
    phase: RunPhase,
    pending: Option<InterruptRequest>,
}

impl InterruptCoordinator {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Running,
            pending: None,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Interrupt awaiting a decision, if any
    pub fn pending(&self) -> Option<&InterruptRequest> {
        self.pending.as_ref()
    }

    /// Pause the run until a decision is submitted
    pub fn suspend(&mut self, request: InterruptRequest) -> Result<(), StreamError> {
        self.expect(RunPhase::Running, "suspend")?;
        self.phase = RunPhase::AwaitingHuman;
        self.pending = Some(request);
        Ok(())
    }

    /// Resolve the pending interrupt. The returned request must be sent to
    /// the backend, whose response is a new stream for the same run.
    pub fn decide(
        &mut self,
        session_id: &str,
        decision: Decision,
    ) -> Result<ResumeRequest, StreamError> {
        self.expect(RunPhase::AwaitingHuman, "submit a decision")?;

        let kind = decision.kind();
        let objects = match decision {
            Decision::Confirm => self
                .pending
                .take()
                .map(|request| request.data.objects)
                .unwrap_or_default(),
            Decision::Modify(objects) => {
                self.pending = None;
                objects
            }
        };

        self.phase = RunPhase::Running;
        info!("Resuming session {} with {:?} decision ({} objects)", session_id, kind, objects.len());

        Ok(ResumeRequest {
            session_id: session_id.to_string(),
            decision: kind,
            objects,
        })
    }

    /// Abort the run. Legal only while running or paused.
    pub fn cancel(&mut self) -> Result<(), StreamError> {
        if self.phase.is_terminal() {
            return Err(self.invalid("cancel"));
        }
        self.phase = RunPhase::Cancelled;
        self.pending = None;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), StreamError> {
        self.expect(RunPhase::Running, "complete")?;
        self.phase = RunPhase::Completed;
        Ok(())
    }

    pub fn fail(&mut self) -> Result<(), StreamError> {
        self.expect(RunPhase::Running, "fail")?;
        self.phase = RunPhase::Failed;
        Ok(())
    }

    /// Stream closed without a terminal event
    pub fn end_of_stream(&mut self) -> Result<(), StreamError> {
        self.expect(RunPhase::Running, "end")?;
        self.phase = RunPhase::Incomplete;
        Ok(())
    }

    fn expect(&self, phase: RunPhase, action: &'static str) -> Result<(), StreamError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> StreamError {
        StreamError::InvalidTransition {
            action,
            phase: self.phase,
        }
    }
}

impl Default for InterruptCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InterruptData;
    use tokio_test::{assert_err, assert_ok};

    fn interrupt() -> InterruptRequest {
        InterruptRequest {
            kind: "confirm_objects".to_string(),
            message: "confirm".to_string(),
            data: InterruptData {
                objects: vec![ProposedObject {
                    name: "order".to_string(),
                    chinese_name: "订单".to_string(),
                    description: None,
                    attributes: 4,
                }],
            },
        }
    }

    #[test]
    fn test_confirm_keeps_proposed_objects() {
        let mut coordinator = InterruptCoordinator::new();
        assert_ok!(coordinator.suspend(interrupt()));
        assert_eq!(coordinator.phase(), RunPhase::AwaitingHuman);
        assert!(coordinator.pending().is_some());

        let resume = coordinator.decide("s1", Decision::Confirm).unwrap();
        assert_eq!(resume.decision, DecisionKind::Confirm);
        assert_eq!(resume.objects, interrupt().data.objects);
        assert_eq!(coordinator.phase(), RunPhase::Running);
        assert!(coordinator.pending().is_none());
    }

    #[test]
    fn test_modify_sends_edited_objects() {
        let mut coordinator = InterruptCoordinator::new();
        assert_ok!(coordinator.suspend(interrupt()));

        let edited = vec![ProposedObject {
            name: "customer".to_string(),
            chinese_name: "客户".to_string(),
            description: Some("edited".to_string()),
            attributes: 2,
        }];
        let resume = coordinator.decide("s1", Decision::Modify(edited.clone())).unwrap();
        assert_eq!(resume.decision, DecisionKind::Modify);
        assert_eq!(resume.objects, edited);
    }

    #[test]
    fn test_decision_requires_pause() {
        let mut coordinator = InterruptCoordinator::new();
        let err = coordinator.decide("s1", Decision::Confirm).unwrap_err();
        assert_eq!(
            err,
            StreamError::InvalidTransition { action: "submit a decision", phase: RunPhase::Running }
        );
    }

    #[test]
    fn test_cancel_legal_while_running_or_paused() {
        let mut running = InterruptCoordinator::new();
        assert_ok!(running.cancel());
        assert_eq!(running.phase(), RunPhase::Cancelled);
        assert_err!(running.cancel());

        let mut paused = InterruptCoordinator::new();
        assert_ok!(paused.suspend(interrupt()));
        assert_ok!(paused.cancel());
        assert!(paused.pending().is_none());

        let mut done = InterruptCoordinator::new();
        assert_ok!(done.complete());
        assert_err!(done.cancel());
    }

    #[test]
    fn test_terminal_transitions_only_from_running() {
        let mut coordinator = InterruptCoordinator::new();
        assert_ok!(coordinator.suspend(interrupt()));
        assert_err!(coordinator.complete());
        assert_err!(coordinator.fail());
        assert_err!(coordinator.end_of_stream());
    }
}
