//! Result Materializer
//!
//! Reduces the event stream of one run into a `GovernanceResult`. Thinking
//! steps accumulate into an advisory log; `complete` replaces the result
//! wholesale. Nothing from the in-flight log leaks into the final result.

use crate::models::{GovernanceResult, ThinkingStep};
use crate::stream::event::StreamEvent;
use sha2::{Digest, Sha256};

/// What a reduction did to the materialized state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Appended,
    Replaced,
    Failed,
    Ignored,
}

/// Accumulate reducer: append a step, never touching earlier ones
pub fn accumulate(mut log: Vec<ThinkingStep>, step: &ThinkingStep) -> Vec<ThinkingStep> {
    log.push(step.clone());
    log
}

/// Replace reducer: the authoritative payload supersedes whatever came before
pub fn replace(_previous: Option<GovernanceResult>, authoritative: &GovernanceResult) -> GovernanceResult {
    authoritative.clone()
}

#[derive(Debug, Clone, Default)]
pub struct Materializer {
    committed: Option<GovernanceResult>,
    thinking: Vec<ThinkingStep>,
    completed: bool,
    last_error: Option<String>,
}

impl Materializer {
    /// Start a run on top of the caller's previous result, if any
    pub fn new(previous: Option<GovernanceResult>) -> Self {
        Self {
            committed: previous,
            ..Default::default()
        }
    }

    pub fn reduce(&mut self, event: &StreamEvent) -> Reduction {
        match event {
            StreamEvent::Thinking(step) => {
                self.thinking = accumulate(std::mem::take(&mut self.thinking), step);
                Reduction::Appended
            }
            StreamEvent::Complete(result) => {
                self.committed = Some(replace(self.committed.take(), result));
                self.completed = true;
                self.last_error = None;
                Reduction::Replaced
            }
            StreamEvent::Error(message) => {
                self.last_error = Some(message.clone());
                Reduction::Failed
            }
            StreamEvent::Progress(_) | StreamEvent::Interrupt(_) => Reduction::Ignored,
        }
    }

    /// The authoritative result: this run's payload once complete, otherwise
    /// the result the run started from
    pub fn result(&self) -> Option<&GovernanceResult> {
        self.committed.as_ref()
    }

    /// Steps received during this run, in arrival order
    pub fn thinking_steps(&self) -> &[ThinkingStep] {
        &self.thinking
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// SHA-256 of the committed result's canonical JSON
    pub fn fingerprint(&self) -> Option<String> {
        let result = self.committed.as_ref()?;
        let bytes = serde_json::to_vec(result).ok()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Some(format!("{:x}", hasher.finalize()))
    }
}
