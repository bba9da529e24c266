//! Result Delivery Module
//!
//! Consumes the analysis backend's streaming response and turns it into
//! governance results:
//! - Frame decoding (chunk-boundary safe)
//! - Event parsing and dispatch
//! - Human-in-the-loop interrupt coordination
//! - Result materialization

pub mod decoder;
pub mod driver;
pub mod event;
pub mod interrupt;
pub mod materializer;

pub use driver::{drive, RunContext, RunHandle, RunOutcome};
pub use event::EventHandler;
pub use interrupt::{Decision, ResumeRequest, RunPhase};

use crate::error::AppError;
use futures::stream::BoxStream;
use thiserror::Error;

/// Response body of the backend, as raw chunks
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, StreamError>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed '{event}' frame: {message}")]
    Protocol { event: String, message: String },

    #[error("Cannot {action} while run is {phase}")]
    InvalidTransition { action: &'static str, phase: RunPhase },
}

impl From<StreamError> for AppError {
    fn from(err: StreamError) -> Self {
        let message = err.to_string();
        match err {
            StreamError::Transport(msg) => AppError::Backend { status: 502, message: msg },
            StreamError::Protocol { .. } => AppError::Protocol(message),
            StreamError::InvalidTransition { .. } => AppError::Conflict(message),
        }
    }
}
