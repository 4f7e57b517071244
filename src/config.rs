//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::discovery::default_rpc_path;

/// Environment variable overriding the socket (or data directory) path.
pub const RPC_PATH_ENV: &str = "LIGHTNING_RPC_PATH";

/// Default header carrying the REST credential.
pub const DEFAULT_CREDENTIAL_HEADER: &str = "Rune";

/// Reconnect backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Wait held before any connection has succeeded. It is doubled before
    /// the first retry is scheduled.
    pub initial: Duration,
    /// Wait restored after every successful connect.
    pub floor: Duration,
    /// Upper bound on the wait.
    pub ceiling: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(16),
        }
    }
}

/// Configuration for the socket client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Socket path, or a network / data directory containing `lightning-rpc`.
    /// Must be absolute.
    pub rpc_path: PathBuf,
    pub backoff: BackoffConfig,
    /// Per-call limit. `None` waits for the daemon indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_path: default_rpc_path(),
            backoff: BackoffConfig::default(),
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new(rpc_path: impl Into<PathBuf>) -> Self {
        Self {
            rpc_path: rpc_path.into(),
            ..Self::default()
        }
    }

    /// Defaults, with `rpc_path` taken from `LIGHTNING_RPC_PATH` when set.
    pub fn from_env() -> Self {
        match std::env::var_os(RPC_PATH_ENV) {
            Some(path) if !path.is_empty() => Self::new(path),
            _ => Self::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// Configuration for the REST client.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub base_url: Url,
    pub credential: String,
    pub header: String,
    pub request_timeout: Option<Duration>,
}

impl HttpConfig {
    pub fn new(base_url: Url, credential: impl Into<String>) -> Self {
        Self {
            base_url,
            credential: credential.into(),
            header: DEFAULT_CREDENTIAL_HEADER.to_string(),
            request_timeout: None,
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
