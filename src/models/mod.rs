//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains the governance result graph, checkpoint records and the
//! request/response structures used by the API.

pub mod checkpoint;
pub mod governance;
pub mod run;

// Re-export commonly used types
pub use checkpoint::*;
pub use governance::*;
pub use run::*;

use serde::Serialize;

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}
