//! Error taxonomy for the auto-peering engine.
//!
//! Components decide what to absorb by asking [`PeeringError::is_client_error`]:
//! only errors reported by the provider API itself are ever logged and
//! skipped. Everything else fails the invocation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PeeringError>;

#[derive(Debug, Error)]
pub enum PeeringError {
    /// The provider rejected a request (e.g. `RouteAlreadyExists`,
    /// `InvalidRoute.NotFound`, `OperationNotPermitted`).
    #[error("provider error {code}: {message}")]
    Provider { code: String, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("peering connection {connection_id} did not exist after {attempts} attempts")]
    WaitTimeout {
        connection_id: String,
        attempts: u32,
    },

    #[error("invalid trigger event: {0}")]
    InvalidEvent(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PeeringError {
    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the error was reported by the provider API rather than by
    /// transport, decoding or local validation.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }

    /// Provider error code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Provider { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<quick_xml::DeError> for PeeringError {
    fn from(error: quick_xml::DeError) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<serde_json::Error> for PeeringError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidEvent(error.to_string())
    }
}
