//! Cloud access error types

use thiserror::Error;

/// Errors raised while talking to the identity, compute and network endpoints
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Network failure calling {endpoint}: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API error from {endpoint} (status {status}): {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Transport-level failure (connection refused, timeout, ...)
    pub fn is_network(&self) -> bool {
        matches!(self, CloudError::Network { .. })
    }

    /// HTTP status of an API-level failure
    pub fn status(&self) -> Option<u16> {
        match self {
            CloudError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
