//! Hub-wide error type.
//!
//! Every library API in the workspace returns [`HubResult`]. The enum is
//! serialisable so an error raised by a service travels unchanged through the
//! resolver and the gateway to the remote caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    Unauthorized,
    Forbidden,
    NotFound,
    Transport,
    Fatal,
    Other,
}

/// Errors raised anywhere in the hub core.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HubError {
    /// Empty identifier, malformed PEM, undecodable payload.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A capability was exported under a method name the service does not implement.
    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    /// Bad credentials, expired or forged token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller's role is not admitted to the capability.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A capability or method is not in the inventory.
    #[error("not found: {0}")]
    NotFound(String),

    /// No server method and no unknown-method handler for a call.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// Connection closed, dial failure or broken capability handle.
    #[error("transport error: {0}")]
    Transport(String),

    /// The caller gave up on the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Unrecoverable startup condition such as a missing CA.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the workspace.
pub type HubResult<T> = Result<T, HubError>;

impl HubError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map the variant onto the propagation table.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::UnknownMethod(_) => ErrorKind::InvalidInput,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) | Self::Unimplemented(_) => ErrorKind::NotFound,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Fatal(_) => ErrorKind::Fatal,
            Self::Cancelled | Self::Internal(_) => ErrorKind::Other,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
