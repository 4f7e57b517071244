//! Error types surfaced to callers of either transport.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::RpcError;

/// Coarse error category, so callers can tell a daemon-reported failure
/// apart from a local one without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The daemon answered with a JSON-RPC error object.
    Rpc,
    /// The connection or HTTP exchange failed.
    Transport,
    /// The daemon sent something that is not a valid response.
    Protocol,
    /// The client was misconfigured or misused.
    Usage,
}

/// Client error types.
///
/// These errors provide actionable messages for common failure modes
/// when talking to the Lightning daemon.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The rpc path is not usable (e.g. relative).
    #[error("Invalid rpc path {}: {reason}", .path.display())]
    InvalidPath { path: PathBuf, reason: &'static str },

    /// The socket client needs a tokio runtime to drive its connection.
    #[error("Lightning client must be created inside a tokio runtime")]
    NoRuntime,

    /// A name that is not in the method registry.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Response payload did not have the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The daemon returned a JSON-RPC error for this call.
    #[error("lightning error {}: {}", .0.code, .0.message)]
    Rpc(RpcError),

    /// The configured request timeout elapsed.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection task stopped before the call completed.
    #[error("Lightning client is closed")]
    Closed,

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status without a JSON-RPC error body.
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

impl From<RpcError> for ClientError {
    fn from(err: RpcError) -> Self {
        ClientError::Rpc(err)
    }
}

impl ClientError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Rpc(_) => ErrorCategory::Rpc,
            ClientError::Timeout(_)
            | ClientError::Closed
            | ClientError::Http(_)
            | ClientError::HttpStatus { .. } => ErrorCategory::Transport,
            ClientError::Protocol(_) => ErrorCategory::Protocol,
            ClientError::InvalidPath { .. }
            | ClientError::NoRuntime
            | ClientError::UnknownMethod(_) => ErrorCategory::Usage,
        }
    }

    /// The daemon's error object, if this is a daemon-reported error.
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            ClientError::Rpc(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_rpc(&self) -> bool {
        self.category() == ErrorCategory::Rpc
    }
}
