//! Configuration for the client orchestration core.
//!
//! Supports loading from environment variables with fallback to defaults.

use std::time::Duration;

/// Runtime configuration shared by all components.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Fixed interval between document status reconciliation ticks.
    pub poll_interval: Duration,
    /// Timeout for single-shot requests (status polls, directory loads).
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            poll_interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// - `DOCCHAT_BASE_URL`: backend base URL (default: `http://localhost:8000`)
    /// - `DOCCHAT_POLL_INTERVAL_SECS`: reconciliation interval (default: 2)
    /// - `DOCCHAT_REQUEST_TIMEOUT_SECS`: request timeout (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("DOCCHAT_BASE_URL").unwrap_or(defaults.base_url),
            poll_interval: Duration::from_secs(
                std::env::var("DOCCHAT_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
            ),
            request_timeout: Duration::from_secs(
                std::env::var("DOCCHAT_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
