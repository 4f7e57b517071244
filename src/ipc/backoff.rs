//! Reconnect delay bookkeeping.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Delay before the next reconnect attempt.
///
/// Starts at `initial`, doubles on every failed or lost connection up to
/// `ceiling`, and drops back to `floor` once a connection succeeds. With the
/// defaults the waits run 1s, 2s, 4s, 8s, 16s, 16s, ...
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    wait: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            wait: config.initial,
            config,
        }
    }

    /// Record a failed or lost connection and return the wait to apply.
    pub fn on_failure(&mut self) -> Duration {
        self.wait = (self.wait * 2).min(self.config.ceiling);
        self.wait
    }

    /// Record a successful connection.
    pub fn on_connected(&mut self) {
        self.wait = self.config.floor;
    }
}
