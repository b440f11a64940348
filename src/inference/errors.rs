//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Each variant maps
//! onto one class of the failure taxonomy (see [`ErrorKind`]) so callers can
//! match exhaustively and translate into a user-facing status and message.

use thiserror::Error;

/// Failure class of a [`VeniceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing API key or unreadable configuration. Raised before any network call.
    Configuration,
    /// The request itself is unusable (no messages, blank content).
    InvalidRequest,
    /// The provider could not be reached, or the connection broke mid-stream.
    Transport,
    /// The provider answered with a non-2xx status.
    Provider,
    /// The provider answered 2xx but the body is missing or unusable.
    Protocol,
}

/// Errors that can occur while talking to the Venice API.
#[derive(Debug, Error)]
pub enum VeniceError {
    /// No API key was configured.
    #[error("Venice API key is required")]
    MissingApiKey,

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    /// The request failed local validation.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// TCP/HTTP connection to the endpoint failed.
    #[error("Connection error: failed to reach {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The endpoint did not respond within the configured deadline.
    #[error("Connection error: request timed out after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response. `details` holds the parsed JSON error body, if any.
    #[error("{message}")]
    ApiError {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// A streaming response arrived without a readable body.
    #[error("No response body received from Venice API")]
    NoResponseBody,

    /// The byte stream failed after the response headers were received.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// A 2xx body that could not be read or decoded.
    #[error("invalid response body: {reason}")]
    InvalidResponse { reason: String },
}

impl VeniceError {
    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VeniceError::MissingApiKey | VeniceError::ConfigError { .. } => {
                ErrorKind::Configuration
            }
            VeniceError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            VeniceError::ConnectionFailed { .. }
            | VeniceError::Timeout { .. }
            | VeniceError::StreamError { .. } => ErrorKind::Transport,
            VeniceError::ApiError { .. } => ErrorKind::Provider,
            VeniceError::NoResponseBody | VeniceError::InvalidResponse { .. } => {
                ErrorKind::Protocol
            }
        }
    }

    /// HTTP-status-like code for this error.
    ///
    /// Provider errors carry the provider's own status. Transport failures
    /// report 503. Configuration and protocol failures have no status of
    /// their own; the caller decides (usually 500).
    pub fn status_code(&self) -> Option<u16> {
        match self {
            VeniceError::ApiError { status, .. } => Some(*status),
            VeniceError::InvalidRequest { .. } => Some(400),
            VeniceError::ConnectionFailed { .. }
            | VeniceError::Timeout { .. }
            | VeniceError::StreamError { .. } => Some(503),
            _ => None,
        }
    }

    /// Message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            VeniceError::ApiError { status: 429, .. } => {
                "Rate limit exceeded. Please try again in a moment.".to_string()
            }
            VeniceError::ApiError { status: 401, .. } => {
                "Authentication failed. Please check your Venice API key.".to_string()
            }
            VeniceError::ApiError { status: 503, .. } => {
                "Venice API is temporarily unavailable. Please try again later.".to_string()
            }
            VeniceError::ApiError { message, .. } => message.clone(),
            e if e.kind() == ErrorKind::Transport => {
                "Connection to Venice API failed. Please check your internet connection."
                    .to_string()
            }
            other => other.to_string(),
        }
    }

    /// The parsed provider error body, if this is an `ApiError` that had one.
    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            VeniceError::ApiError { details, .. } => details.as_ref(),
            _ => None,
        }
    }
}
