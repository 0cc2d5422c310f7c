//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server base URL, e.g. `https://erp.example.com/api`.
    pub server_url: String,
    /// Failed attempts after which an entry is no longer drained.
    pub max_retries: u32,
    /// Maximum entries handled by one push run.
    pub push_batch_size: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Period of the background sync cycle.
    pub sync_interval: Duration,
}

impl SyncConfig {
    /// Creates a configuration with default limits.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            max_retries: 3,
            push_batch_size: 100,
            timeout: Duration::from_secs(30),
            sync_interval: Duration::from_secs(60),
        }
    }

    /// Sets the retry cap.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the push batch size.
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the background sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}
