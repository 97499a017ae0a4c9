use std::time::Duration;

pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Policy used when a client lost its bridge: 1s, 2s, 4s between attempts.
    pub fn reconnect() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(8))
    }

    pub fn exponential_backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt);
        let delay = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }

    /// Add jitter so that clients dropped together do not reconnect together
    pub fn exponential_backoff_with_jitter(&self, attempt: u32) -> Duration {
        let base_delay = self.exponential_backoff(attempt);
        let jitter_ms = rand::random::<u64>() % (base_delay.as_millis() as u64 / 4 + 1);
        base_delay + Duration::from_millis(jitter_ms)
    }
}
