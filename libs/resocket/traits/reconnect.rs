use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// Implement this trait to control how long the scheduler waits before
/// each connection attempt and when it gives up.
///
/// The retry count passed in follows the scheduler's counter: `-1` before
/// any attempt, `0` for the first attempt (or the first attempt after a
/// connection proved stable), growing by one per failed attempt.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay to wait before the attempt numbered `retry_count`
    fn next_delay(&self, retry_count: i64) -> Duration;

    /// Check whether another attempt may start
    ///
    /// # Returns
    /// * `true` - Continue reconnecting
    /// * `false` - Retries are exhausted
    fn should_reconnect(&self, retry_count: i64) -> bool;

    /// Maximum number of retries, if bounded
    fn max_retries(&self) -> Option<u32>;
}

/// Growing backoff reconnection strategy
///
/// The first attempt (and the first attempt after a stable connection) is
/// immediate. Later attempts wait `min_delay * grow_factor^(retry_count - 1)`,
/// capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct GrowingBackoff {
    min_delay: Duration,
    max_delay: Duration,
    grow_factor: f64,
    max_retries: Option<u32>,
}

impl GrowingBackoff {
    /// Create a new growing backoff strategy
    ///
    /// # Arguments
    /// * `min_delay` - Delay before the second attempt
    /// * `max_delay` - Upper bound for any delay
    /// * `grow_factor` - Multiplier applied per failed attempt
    /// * `max_retries` - Maximum number of retries (None = unlimited)
    pub fn new(
        min_delay: Duration,
        max_delay: Duration,
        grow_factor: f64,
        max_retries: Option<u32>,
    ) -> Self {
        Self {
            min_delay,
            max_delay,
            grow_factor,
            max_retries,
        }
    }
}

impl ReconnectionStrategy for GrowingBackoff {
    fn next_delay(&self, retry_count: i64) -> Duration {
        if retry_count <= 0 {
            return Duration::ZERO;
        }

        let exponent = (retry_count - 1).min(i32::MAX as i64) as i32;
        let delay_ms = self.min_delay.as_millis() as f64 * self.grow_factor.powi(exponent);
        let max_ms = self.max_delay.as_millis() as f64;

        Duration::from_millis(delay_ms.min(max_ms).round() as u64)
    }

    fn should_reconnect(&self, retry_count: i64) -> bool {
        self.max_retries
            .map_or(true, |max| retry_count < i64::from(max))
    }

    fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }
}
