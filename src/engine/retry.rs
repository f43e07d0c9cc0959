use std::time::Duration;

/// Bounded exponential backoff for index-lag retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
    /// Total cost-basis attempts per epoch, the initial fetch included.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            factor: 1.5,
            max_delay_ms: 5000,
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `min(base * factor^retry, max)`.
    pub fn delay_ms(&self, retry: u32) -> u64 {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let raw = self.base_delay_ms as f64 * self.factor.powi(exp);
        if !raw.is_finite() || raw >= self.max_delay_ms as f64 {
            return self.max_delay_ms;
        }
        raw as u64
    }

    pub fn delay(&self, retry: u32) -> Duration {
        Duration::from_millis(self.delay_ms(retry))
    }

    /// Whether another attempt is allowed after `failed` attempts.
    pub fn allows_another(&self, failed: u32) -> bool {
        failed < self.max_attempts
    }
}
