//! Engine-level execution settings.

use std::time::Duration;

/// Execution settings shared by every run of an engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Maximum number of provider calls in flight at once.
    pub max_concurrency: usize,

    /// Deadline for a single provider call.
    pub request_timeout: Duration,

    /// Total attempts for retryable failures (first call included).
    pub max_attempts: usize,

    /// First backoff delay between attempts.
    pub backoff_min: Duration,

    /// Upper bound on the backoff delay.
    pub backoff_max: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            request_timeout: Duration::from_secs(60),
            max_attempts: 3,
            backoff_min: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
        }
    }
}

impl EngineSettings {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = max.max(min);
        self
    }
}
