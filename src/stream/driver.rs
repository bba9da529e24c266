//! Run driver
//!
//! Consumes one response body for a run: chunks are read sequentially,
//! decoded into frames, parsed, reduced and dispatched strictly in arrival
//! order. Reading stops at the first terminal event, interrupt, cancellation
//! or end of stream.

use crate::models::{GovernanceResult, InterruptRequest};
use crate::stream::decoder::frames;
use crate::stream::event::{dispatch, parse_frame, EventHandler, StreamEvent};
use crate::stream::interrupt::{InterruptCoordinator, RunPhase};
use crate::stream::materializer::Materializer;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::pin::pin;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity and cancellation signal of one run. Cloning shares the signal.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub run_id: Uuid,
    /// Backend thread the run belongs to
    pub session_id: String,
    cancel: Arc<watch::Sender<bool>>,
}

impl RunHandle {
    pub fn new(session_id: impl Into<String>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            run_id: Uuid::new_v4(),
            session_id: session_id.into(),
            cancel: Arc::new(cancel),
        }
    }

    /// Signal cancellation. Safe to call any number of times from any state.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        // The sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Everything one run owns across its stream segments
#[derive(Debug)]
pub struct RunContext {
    pub handle: RunHandle,
    pub coordinator: InterruptCoordinator,
    pub materializer: Materializer,
}

impl RunContext {
    pub fn new(handle: RunHandle, previous: Option<GovernanceResult>) -> Self {
        Self {
            handle,
            coordinator: InterruptCoordinator::new(),
            materializer: Materializer::new(previous),
        }
    }
}

/// How a stream segment ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Box<GovernanceResult>),
    Failed(String),
    Interrupted(InterruptRequest),
    Cancelled,
    /// Stream closed before any terminal event
    Truncated,
}

/// Drive one stream segment of a run to its next stopping point
pub async fn drive<S, B, E, H>(chunks: S, run: &mut RunContext, handler: &mut H) -> RunOutcome
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    H: EventHandler + ?Sized,
{
    let handle = run.handle.clone();
    let mut frames = pin!(frames(chunks));

    loop {
        let next = tokio::select! {
            biased;
            _ = handle.cancelled() => None,
            next = frames.next() => Some(next),
        };

        let Some(next) = next else {
            return cancelled(run, handler);
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                let message = e.to_string();
                warn!("Run {} transport failure: {}", handle.run_id, message);
                return failed(run, handler, message);
            }
            None => {
                if let Err(e) = run.coordinator.end_of_stream() {
                    debug!("Run {}: {}", handle.run_id, e);
                }
                info!("Run {} stream ended without a terminal event", handle.run_id);
                return RunOutcome::Truncated;
            }
        };

        // Cancelled while this frame was being read
        if handle.is_cancelled() {
            return cancelled(run, handler);
        }

        let event = match parse_frame(&frame) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                warn!("Run {} received malformed frame: {}", handle.run_id, e);
                return failed(run, handler, e.to_string());
            }
        };

        debug!("Run {} dispatching '{}'", handle.run_id, event.name());
        run.materializer.reduce(&event);

        match &event {
            StreamEvent::Interrupt(request) => {
                if let Err(e) = run.coordinator.suspend(request.clone()) {
                    warn!("Run {}: {}", handle.run_id, e);
                }
                dispatch(&event, handler);
                return RunOutcome::Interrupted(request.clone());
            }
            StreamEvent::Complete(result) => {
                if let Err(e) = run.coordinator.complete() {
                    warn!("Run {}: {}", handle.run_id, e);
                }
                dispatch(&event, handler);
                info!("Run {} completed with {} objects", handle.run_id, result.objects.len());
                return RunOutcome::Completed(result.clone());
            }
            StreamEvent::Error(message) => {
                if let Err(e) = run.coordinator.fail() {
                    warn!("Run {}: {}", handle.run_id, e);
                }
                dispatch(&event, handler);
                warn!("Run {} failed: {}", handle.run_id, message);
                return RunOutcome::Failed(message.clone());
            }
            StreamEvent::Thinking(_) | StreamEvent::Progress(_) => dispatch(&event, handler),
        }
    }
}

fn failed<H: EventHandler + ?Sized>(run: &mut RunContext, handler: &mut H, message: String) -> RunOutcome {
    if let Err(e) = run.coordinator.fail() {
        debug!("Run {}: {}", run.handle.run_id, e);
    }
    handler.on_error(&message);
    RunOutcome::Failed(message)
}

fn cancelled<H: EventHandler + ?Sized>(run: &mut RunContext, handler: &mut H) -> RunOutcome {
    // Already cancelled while no stream was attached
    if run.coordinator.phase() != RunPhase::Cancelled {
        if let Err(e) = run.coordinator.cancel() {
            debug!("Run {}: {}", run.handle.run_id, e);
        }
        info!("Run {} cancelled", run.handle.run_id);
        handler.on_cancelled();
    }
    RunOutcome::Cancelled
}
