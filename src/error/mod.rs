//! Error types for iam-session.

use thiserror::Error;

/// Primary error type for all session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backend answered with a non-2xx status.
    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        /// Backend body parsed as JSON, when it was JSON.
        body: Option<serde_json::Value>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("No refresh token on record")]
    NoRefreshToken,

    #[error("Refresh already in progress")]
    RefreshInProgress,

    #[error("Refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Network,
    Server,
    Api,
    RefreshPrecondition,
    Configuration,
    Serialization,
    Storage,
}

impl SessionError {
    /// Build an API error from a status and raw body.
    ///
    /// The message is the backend's `message` field when the body is JSON
    /// carrying one, otherwise the raw body.
    pub fn api(status: u16, raw_body: &str) -> Self {
        let body = serde_json::from_str::<serde_json::Value>(raw_body).ok();
        let message = body
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| raw_body.to_string());
        Self::Api {
            status,
            message,
            body,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) => ErrorCategory::Network,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::NoRefreshToken | Self::RefreshInProgress => ErrorCategory::RefreshPrecondition,
            Self::RefreshFailed(_) => ErrorCategory::Authentication,
            Self::Configuration(_) | Self::InvalidRequest(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) | Self::Storage(_) => ErrorCategory::Storage,
        }
    }

    /// Network failure or non-2xx response.
    ///
    /// These are the failures the refresh call retries with backoff.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Api { .. })
    }

    /// A condition that resolves by itself shortly and must not end the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RefreshInProgress)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SessionError>;
