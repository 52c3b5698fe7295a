//! Backoff and reconnect policies.

use std::time::Duration;

/// Exponential backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Base delay for first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number, counting from zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(exponent);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter = delay * self.jitter.clamp(0.0, 1.0) * (rand::random::<f64>() * 2.0 - 1.0);
        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }
}

/// What to do when the event stream ends.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Resubscribe attempts before giving up. Zero stops the driver on the
    /// first disconnect.
    pub max_attempts: u32,

    pub backoff: BackoffPolicy,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl ReconnectPolicy {
    /// Stop on the first disconnect.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }
}
