//! Error types for rollcall front ends

use thiserror::Error;

use crate::SubjectId;

/// Errors raised before a request reaches the session engine
#[derive(Debug, Error)]
pub enum RollcallError {
    #[error("Subject not found: {0}")]
    SubjectNotFound(SubjectId),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Capture error: {0}")]
    CaptureError(String),
}

impl RollcallError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::CaptureError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RollcallError>;
