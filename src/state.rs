//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::backend::BackendClient;
use crate::config::Settings;
use crate::error::AppError;
use crate::runs::RunRegistry;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Client for the analysis backend
    pub backend: BackendClient,

    /// Live and finished runs, plus each session's committed result
    pub runs: RunRegistry,
}

impl AppState {
    pub fn new(settings: &Settings) -> Result<Self, AppError> {
        Ok(Self {
            backend: BackendClient::new(&settings.backend)?,
            runs: RunRegistry::new(&settings.runs),
        })
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
