use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Transport error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Router returned {status} for {endpoint}: {body}")]
    Protocol {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("{resource} '{id}' not found on router")]
    NotFound { resource: &'static str, id: String },
    #[error("Failed to decode {resource} response: {message}")]
    Decode {
        resource: &'static str,
        message: String,
    },
    #[error("Invalid router client configuration: {0}")]
    Config(String),
}

impl RouterError {
    /// Whether a caller may reasonably retry the same request later.
    /// Network failures are; protocol failures only when the router itself failed (5xx).
    pub fn is_retryable(&self) -> bool {
        match self {
            RouterError::Transport { .. } => true,
            RouterError::Protocol { status, .. } => status.is_server_error(),
            RouterError::NotFound { .. } | RouterError::Decode { .. } | RouterError::Config(_) => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RouterError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}
