//! Runtime configuration and shared constants

use std::time::Duration;

use crate::runtime::RetryConfig;

// ═══════════════════════════════════════════════════════════════
// HTTP client limits (built-in functions, LLM providers)
// ═══════════════════════════════════════════════════════════════

/// Timeout for establishing HTTP connections
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for plain HTTP requests (http_request builtin)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for LLM inference calls
pub const LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum number of HTTP redirects to follow
pub const REDIRECT_LIMIT: usize = 5;

/// Per-run knobs for the scheduler
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Maximum tasks in flight at once; None = frontier-wide parallelism
    pub max_in_flight: Option<usize>,
    /// Whole-run deadline layered on top of per-task timeouts
    pub run_timeout: Option<Duration>,
    /// Backoff shape between retry attempts
    pub retry: RetryConfig,
}

impl RunConfig {
    pub fn with_max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = Some(n.max(1));
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Redact an API key down to its edges for logs
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
