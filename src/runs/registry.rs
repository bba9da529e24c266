//! Run registry
//!
//! Owns every run started through this service. Each run's context sits
//! behind a mutex held by its driver task while a stream is attached, so
//! decisions and cancellation on a paused run never race a live stream.
//! Finished runs and committed results are dropped after the retention window.

use crate::config::RunConfig;
use crate::error::{not_found_error, AppError};
use crate::models::GovernanceResult;
use crate::runs::relay::{sync_view, RelayEvent, RelayHandler, RunView};
use crate::stream::{
    drive, ChunkStream, Decision, EventHandler, ResumeRequest, RunContext, RunHandle, RunOutcome, RunPhase,
    StreamError,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct RunEntry {
    handle: RunHandle,
    context: Arc<Mutex<RunContext>>,
    view: Arc<watch::Sender<RunView>>,
    events: broadcast::Sender<RelayEvent>,
}

impl RunEntry {
    fn relay(&self, run: &RunContext) -> RelayHandler {
        RelayHandler::new(self.view.clone(), self.events.clone(), run.materializer.result().cloned())
    }

    fn phase(&self) -> RunPhase {
        self.view.borrow().phase
    }
}

struct CommittedResult {
    result: GovernanceResult,
    committed_at: DateTime<Utc>,
}

/// In-memory registry of runs and of each session's last committed result
#[derive(Clone)]
pub struct RunRegistry {
    runs: Arc<RwLock<HashMap<Uuid, Arc<RunEntry>>>>,
    committed: Arc<RwLock<HashMap<String, CommittedResult>>>,
    event_buffer: usize,
    retention: Duration,
}

impl RunRegistry {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            committed: Arc::new(RwLock::new(HashMap::new())),
            event_buffer: config.event_buffer.max(1),
            retention: config.retention,
        }
    }

    /// Register a new run for `session_id`. Its materializer starts from the
    /// session's last committed result.
    pub async fn create(&self, session_id: String) -> RunHandle {
        self.cleanup_expired().await;

        let previous = self.session_result(&session_id).await;
        let handle = RunHandle::new(session_id);

        let (view, _) = watch::channel(RunView::new(&handle));
        let (events, _) = broadcast::channel(self.event_buffer);
        let entry = RunEntry {
            handle: handle.clone(),
            context: Arc::new(Mutex::new(RunContext::new(handle.clone(), previous))),
            view: Arc::new(view),
            events,
        };

        self.runs.write().await.insert(handle.run_id, Arc::new(entry));
        info!("Registered run {} for session {}", handle.run_id, handle.session_id);
        handle
    }

    /// Drive `chunks` to the run's next stopping point on a background task
    pub async fn attach(&self, run_id: Uuid, chunks: ChunkStream) -> Result<(), AppError> {
        self.spawn_driver(run_id, chunks).await.map(|_| ())
    }

    pub(crate) async fn spawn_driver(&self, run_id: Uuid, chunks: ChunkStream) -> Result<JoinHandle<RunOutcome>, AppError> {
        let entry = self.entry(run_id).await?;
        let registry = self.clone();

        Ok(tokio::spawn(async move {
            let mut context = entry.context.lock().await;
            let mut relay = entry.relay(&context);

            let mut outcome = drive(chunks, &mut context, &mut relay).await;

            // Cancelled after the interrupt was dispatched
            if matches!(outcome, RunOutcome::Interrupted(_)) && context.handle.is_cancelled() {
                if context.coordinator.cancel().is_ok() {
                    relay.on_cancelled();
                }
                outcome = RunOutcome::Cancelled;
            }

            match &outcome {
                RunOutcome::Completed(result) => {
                    registry.commit(&context.handle.session_id, (**result).clone()).await;
                }
                RunOutcome::Truncated => relay.on_incomplete(),
                RunOutcome::Interrupted(_) => debug!("Run {} paused for a decision", run_id),
                RunOutcome::Failed(_) | RunOutcome::Cancelled => {}
            }
            sync_view(&entry.view, &context);
            outcome
        }))
    }

    pub async fn view(&self, run_id: Uuid) -> Result<RunView, AppError> {
        let entry = self.entry(run_id).await?;
        let view = entry.view.borrow().clone();
        Ok(view)
    }

    /// Current view plus a receiver for everything after it
    pub async fn subscribe(&self, run_id: Uuid) -> Result<(RunView, broadcast::Receiver<RelayEvent>), AppError> {
        let entry = self.entry(run_id).await?;

        // Events are published under the view's write lock, so nothing can
        // land in both the snapshot and the receiver
        let (view, receiver) = {
            let current = entry.view.borrow();
            (current.clone(), entry.events.subscribe())
        };
        Ok((view, receiver))
    }

    /// Resolve a paused run. The caller sends the returned request to the
    /// backend and attaches the resulting stream.
    pub async fn decide(&self, run_id: Uuid, decision: Decision) -> Result<ResumeRequest, AppError> {
        let entry = self.entry(run_id).await?;
        let phase = entry.phase();
        if phase != RunPhase::AwaitingHuman {
            return Err(StreamError::InvalidTransition {
                action: "submit a decision",
                phase,
            }
            .into());
        }

        let mut context = entry.context.lock().await;
        if context.handle.is_cancelled() {
            return Err(AppError::Conflict(format!("Run {} has been cancelled", run_id)));
        }
        let session_id = context.handle.session_id.clone();
        let request = context.coordinator.decide(&session_id, decision)?;
        sync_view(&entry.view, &context);
        Ok(request)
    }

    /// Cancel a running or paused run
    pub async fn cancel(&self, run_id: Uuid) -> Result<RunView, AppError> {
        let entry = self.entry(run_id).await?;
        let phase = entry.phase();
        if phase.is_terminal() {
            return Err(StreamError::InvalidTransition { action: "cancel", phase }.into());
        }

        entry.handle.cancel();

        // A live driver stops on the signal and releases the context. A paused
        // run has no driver, so it is cancelled here.
        {
            let mut context = entry.context.lock().await;
            if context.coordinator.phase() == RunPhase::AwaitingHuman {
                context.coordinator.cancel()?;
                let mut relay = entry.relay(&context);
                relay.on_cancelled();
                sync_view(&entry.view, &context);
            }
        }

        info!("Cancellation requested for run {}", run_id);
        let view = entry.view.borrow().clone();
        Ok(view)
    }

    /// Record that the backend could not be reached for this run
    pub async fn fail(&self, run_id: Uuid, message: &str) {
        let Ok(entry) = self.entry(run_id).await else {
            return;
        };
        let mut context = entry.context.lock().await;
        let mut relay = entry.relay(&context);

        if context.handle.is_cancelled() {
            if context.coordinator.cancel().is_ok() {
                relay.on_cancelled();
            }
        } else if context.coordinator.fail().is_ok() {
            warn!("Run {} failed before streaming: {}", run_id, message);
            relay.on_error(message);
        }
        sync_view(&entry.view, &context);
    }

    /// Last result a run of this session completed with
    pub async fn session_result(&self, session_id: &str) -> Option<GovernanceResult> {
        self.committed
            .read()
            .await
            .get(session_id)
            .map(|committed| committed.result.clone())
    }

    /// Drop finished runs and committed results older than the retention window
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let expired = |at: DateTime<Utc>| {
            (now - at)
                .to_std()
                .map(|age| age >= self.retention)
                .unwrap_or(false)
        };

        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, entry| {
            let view = entry.view.borrow();
            !(view.phase.is_terminal() && expired(view.updated_at))
        });
        let evicted = before - runs.len();
        drop(runs);

        self.committed
            .write()
            .await
            .retain(|_, committed| !expired(committed.committed_at));

        if evicted > 0 {
            info!("Cleaned up {} finished runs", evicted);
        }
        evicted
    }

    async fn commit(&self, session_id: &str, result: GovernanceResult) {
        info!("Committed result for session {} ({} objects)", session_id, result.objects.len());
        let dangling = result.dangling_relationships().len();
        if dangling > 0 {
            warn!("Result for session {} has {} relationships to unknown objects", session_id, dangling);
        }
        self.committed.write().await.insert(
            session_id.to_string(),
            CommittedResult {
                result,
                committed_at: Utc::now(),
            },
        );
    }

    async fn entry(&self, run_id: Uuid) -> Result<Arc<RunEntry>, AppError> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or_else(|| not_found_error(format!("Run {} not found", run_id)))
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new(&RunConfig::default())
    }
}

/// Periodically drop expired runs
pub fn spawn_cleanup_task(registry: RunRegistry, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            registry.cleanup_expired().await;
        }
    })
}
