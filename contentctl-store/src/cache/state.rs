//! Connection state machine and reconnection policy
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Ready
//!      ^                        |                |
//!      |                        | attempts       | transport error
//!      |                        v exhausted      |
//!      |                     Failed (terminal)   |
//!      +-----------------------------------------+
//! ```

use std::fmt;
use std::time::Duration;

use crate::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    /// Reconnection attempts exhausted; a new client is needed to retry
    Failed,
}

impl ConnectionState {
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Failed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Linear backoff with a cap on attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_reconnect_attempts, config.reconnect_base_delay())
    }

    /// Delay before reconnection attempt `attempt` (1-based).
    ///
    /// `attempt × base_delay` while `attempt <= max_attempts`, `None` once the
    /// budget is spent (the caller moves to `Failed`).
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay.saturating_mul(attempt))
    }
}
