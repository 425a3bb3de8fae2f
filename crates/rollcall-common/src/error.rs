//! Common error types for Roll Call components.

use thiserror::Error;

/// Errors surfaced by the attendance client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollCallError {
    /// Camera or location permission was refused
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Liveness challenges could not be loaded (or the list was empty)
    #[error("Could not load liveness challenges: {0}")]
    ChallengeFetchFailed(String),

    /// Camera capture or frame processing failed
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// Server refused the attendance submission
    #[error("{0}")]
    SubmissionRejected(String),

    /// Transport-level failure, message passed through
    #[error("Network error: {0}")]
    Network(String),

    /// Request took longer than the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Server answered 401; the session has been dropped
    #[error("Session expired: {0}")]
    Unauthorized(String),

    /// QR code rejected by the server
    #[error("QR code rejected: {0}")]
    QrRejected(String),

    /// Non-success API response outside the capture flow
    #[error("{0}")]
    Api(String),

    /// Secure storage read/write error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RollCallError {
    /// Message suitable for showing to the student as-is
    pub fn user_message(&self) -> String {
        match self {
            Self::SubmissionRejected(msg) | Self::Api(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Returns true if a manual retry has a reasonable chance of succeeding
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Timeout(_)
                | Self::CaptureFailed(_)
                | Self::ChallengeFetchFailed(_)
                | Self::SubmissionRejected(_)
        )
    }
}
