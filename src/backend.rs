//! Analysis backend client
//!
//! The backend runs the governance workflow and owns checkpoint history.
//! Streaming calls hand back the raw response body as a [`ChunkStream`];
//! request/response calls unwrap the backend's `{success, data}` envelope.

use crate::config::BackendConfig;
use crate::diff::CheckpointDiff;
use crate::error::AppError;
use crate::models::{sort_newest_first, Checkpoint, CheckpointState};
use crate::stream::{ChunkStream, ResumeRequest, StreamError};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

/// Body of a new analysis request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub session_id: String,
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, AppError> {
        if config.base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "BACKEND_URL '{}' cannot carry a path",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("govflow-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            timeout: config.timeout,
        })
    }

    /// Start a new analysis and return its event stream
    pub async fn start_run(&self, request: &AnalyzeRequest) -> Result<ChunkStream, AppError> {
        let url = self.endpoint(&["api", "governance", "analyze"]);
        info!("Starting analysis for session {}", request.session_id);
        self.open_stream(url, request).await
    }

    /// Resume a paused thread with a human decision
    pub async fn resume_run(&self, request: &ResumeRequest) -> Result<ChunkStream, AppError> {
        let url = self.endpoint(&["api", "governance", "resume"]);
        info!("Resuming session {} ({:?})", request.session_id, request.decision);
        self.open_stream(url, request).await
    }

    /// List a thread's checkpoints, newest first
    pub async fn list_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>, AppError> {
        let url = self.endpoint(&["api", "checkpoints", session_id]);
        let payload: Value = self.get_json(url).await?;

        // Some backend versions nest the list under "checkpoints"
        let list = match payload {
            Value::Object(mut map) if map.contains_key("checkpoints") => {
                map.remove("checkpoints").unwrap_or_default()
            }
            other => other,
        };

        let mut checkpoints: Vec<Checkpoint> = decode(list)?;
        sort_newest_first(&mut checkpoints);
        if let Some(oldest) = checkpoints.last().filter(|c| !c.is_root()) {
            debug!("Checkpoint history of {} is truncated at {}", session_id, oldest.checkpoint_id);
        }
        Ok(checkpoints)
    }

    pub async fn get_checkpoint(&self, session_id: &str, checkpoint_id: &str) -> Result<CheckpointState, AppError> {
        let url = self.endpoint(&["api", "checkpoints", session_id, checkpoint_id]);
        self.get_json(url).await
    }

    /// Backend-side comparison of two checkpoints
    pub async fn compare_checkpoints(
        &self,
        session_id: &str,
        checkpoint1: &str,
        checkpoint2: &str,
    ) -> Result<CheckpointDiff, AppError> {
        let mut url = self.endpoint(&["api", "checkpoints", session_id, "compare"]);
        url.query_pairs_mut()
            .append_pair("checkpoint1", checkpoint1)
            .append_pair("checkpoint2", checkpoint2);
        self.get_json(url).await
    }

    /// Make `checkpoint_id` the new head of the thread
    pub async fn restore_checkpoint(&self, session_id: &str, checkpoint_id: &str) -> Result<CheckpointState, AppError> {
        let url = self.endpoint(&["api", "checkpoints", session_id, checkpoint_id, "restore"]);
        info!("Restoring session {} to checkpoint {}", session_id, checkpoint_id);

        let response = self.http.post(url).timeout(self.timeout).send().await?;
        let response = check_response(response).await?;
        let body: Value = response.json().await?;
        decode(unwrap_envelope(body)?)
    }

    /// Build `{base}/{segments...}`; each segment is percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn open_stream<T: Serialize>(&self, url: Url, body: &T) -> Result<ChunkStream, AppError> {
        debug!("POST {} (streaming)", url);
        let request = self
            .http
            .post(url.clone())
            .header(ACCEPT, "text/event-stream")
            .json(body)
            .send();

        // Only the handshake is bounded; the body stays open for the whole analysis
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                error!("Backend did not answer {} within {:?}", url, self.timeout);
                AppError::Backend {
                    status: 504,
                    message: format!("No response from backend within {}s", self.timeout.as_secs()),
                }
            })??;
        let response = check_response(response).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk.map(|bytes| bytes.to_vec()).map_err(|e| {
                    error!("Backend stream failed: {}", e);
                    StreamError::Transport(e.to_string())
                })
            })
            .boxed())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        debug!("GET {}", url);
        let response = self.http.get(url).timeout(self.timeout).send().await?;
        let response = check_response(response).await?;
        let body: Value = response.json().await?;
        decode(unwrap_envelope(body)?)
    }
}

/// Turn non-success statuses into [`AppError::Backend`] carrying the body verbatim
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, AppError> {
    if !resp.status().is_success() {
        return Err(AppError::Backend {
            status: resp.status().as_u16(),
            message: resp.text().await.unwrap_or_default(),
        });
    }
    Ok(resp)
}

/// Strip a `{success, data}` envelope; bare payloads pass through
fn unwrap_envelope(body: Value) -> Result<Value, AppError> {
    let mut map = match body {
        Value::Object(map) => map,
        other => return Ok(other),
    };

    match map.get("success").and_then(Value::as_bool) {
        Some(true) if map.contains_key("data") => Ok(map.remove("data").unwrap_or_default()),
        Some(false) => {
            let message = ["error", "message"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .unwrap_or("Backend reported failure")
                .to_string();
            Err(AppError::Backend { status: 200, message })
        }
        _ => Ok(Value::Object(map)),
    }
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, AppError> {
    serde_json::from_value(payload).map_err(|e| AppError::Protocol(format!("Unexpected backend payload: {}", e)))
}
