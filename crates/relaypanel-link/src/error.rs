use std::time::Duration;
use thiserror::Error;

/// Agent link errors. Each one is scoped to a single call.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("agent {url} unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("{method} call {call_id} timed out after {timeout:?}")]
    Timeout {
        method: &'static str,
        call_id: String,
        timeout: Duration,
    },

    #[error("link to {0} was closed")]
    Closed(String),

    #[error("failed to encode agent request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid agent endpoint: {0}")]
    InvalidEndpoint(String),
}

impl LinkError {
    pub(crate) fn unreachable(url: &str, reason: impl ToString) -> Self {
        LinkError::Unreachable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout { .. })
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, LinkError::Unreachable { .. })
    }
}

pub type LinkResult<T> = Result<T, LinkError>;
