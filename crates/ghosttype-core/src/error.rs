use thiserror::Error;

use crate::provider::Provider;
use crate::state::RequestStatus;

/// Failures reported while talking to a model gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network failure reaching the gateway (connect, timeout, broken stream)
    #[error("transport error: {0}")]
    Transport(String),

    /// Gateway answered with a non-success HTTP status
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// Response body could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Gateway reported an error inside an otherwise successful response
    #[error("provider error: {0}")]
    Provider(String),

    #[error("no API key configured for {}", .0.display_name())]
    MissingApiKey(Provider),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Malformed(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Malformed(err.to_string())
    }
}

/// Why a chat submission was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendRejected {
    #[error("a response is still in progress ({0})")]
    Busy(RequestStatus),

    #[error("message is empty")]
    Empty,
}
