//! Remote link error types

use thiserror::Error;

/// Failure reported by a [`RemoteLink`](super::RemoteLink) call.
///
/// The message is whatever the agent or transport said; callers treat it as opaque.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The agent executed the call and reported a failure
    #[error("{0}")]
    Remote(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// The response could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl LinkError {
    pub fn remote(message: impl Into<String>) -> Self {
        LinkError::Remote(message.into())
    }

    /// Human-readable message without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            LinkError::Remote(m)
            | LinkError::Timeout(m)
            | LinkError::NotConnected(m)
            | LinkError::Transport(m)
            | LinkError::Protocol(m) => m,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout(_))
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::Protocol(err.to_string())
    }
}

impl serde::Serialize for LinkError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
