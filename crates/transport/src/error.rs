use model::Subsystem;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Endpoint families with their own deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Health,
    Api,
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Health => f.write_str("health"),
            Self::Api => f.write_str("api"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timeout of {}ms exceeded ({endpoint} endpoint)", .after.as_millis())]
    Timeout {
        endpoint: EndpointClass,
        after: Duration,
    },

    #[error("Network Error: {0}")]
    Network(String),

    /// The server answered but flagged one of its dependent services.
    #[error("{subsystem} failure (status {status}): {detail}")]
    Subsystem {
        subsystem: Subsystem,
        status: u16,
        detail: String,
    },

    #[error("Request failed with status code {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub(crate) fn from_reqwest(err: reqwest::Error, endpoint: EndpointClass, after: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout { endpoint, after }
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Subsystem { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}
