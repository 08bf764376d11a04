//! Reconnection delay policies.

use std::time::Duration;

/// Controls how long the run loop waits between reconnection attempts.
pub trait ReconnectPolicy: Send {
    /// Delay before reconnection attempt number `attempt` (0-indexed), or
    /// `None` to stop reconnecting.
    fn next_delay(&self, attempt: usize) -> Option<Duration>;
}

/// Always wait the same amount of time between attempts.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl ReconnectPolicy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }
}

/// Delays grow as `initial * 2^attempt`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<usize>,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }
        let millis = (self.initial_delay.as_millis() as u64)
            .saturating_mul(2u64.saturating_pow(attempt.min(32) as u32));
        Some(Duration::from_millis(
            millis.min(self.max_delay.as_millis() as u64),
        ))
    }
}
