use crate::traits::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnection and buffering policy
///
/// Field names follow the option names used on the wire config; all
/// durations are milliseconds. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Upper bound for any backoff delay
    pub max_reconnection_delay_ms: u64,
    /// Delay before the second attempt
    pub min_reconnection_delay_ms: u64,
    /// Multiplier applied per failed attempt
    pub reconnection_delay_grow_factor: f64,
    /// Time a connection must stay open before the retry count resets
    pub min_uptime_ms: u64,
    /// Time allowed for the handshake before a synthetic TIMEOUT error
    pub connection_timeout_ms: u64,
    /// Maximum retries (None = unlimited)
    pub max_retries: Option<u32>,
    /// Outbound queue capacity while disconnected (None = unlimited)
    pub max_enqueued_messages: Option<usize>,
    /// Do not connect until `reconnect()` is called
    pub start_closed: bool,
    /// Trace every scheduler step
    pub debug: bool,
}

impl RetryPolicy {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_reconnection_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnection_delay_ms)
    }

    pub fn min_uptime(&self) -> Duration {
        Duration::from_millis(self.min_uptime_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Backoff strategy described by this policy
    pub fn strategy(&self) -> GrowingBackoff {
        GrowingBackoff::new(
            self.min_delay(),
            self.max_delay(),
            self.reconnection_delay_grow_factor,
            self.max_retries,
        )
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.min_reconnection_delay_ms > self.max_reconnection_delay_ms {
            return Err(SocketError::Configuration(format!(
                "min_reconnection_delay_ms ({}) exceeds max_reconnection_delay_ms ({})",
                self.min_reconnection_delay_ms, self.max_reconnection_delay_ms
            )));
        }
        if !(self.reconnection_delay_grow_factor >= 1.0) {
            return Err(SocketError::Configuration(format!(
                "reconnection_delay_grow_factor must be >= 1, got {}",
                self.reconnection_delay_grow_factor
            )));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    /// Defaults are computed per call: the minimum delay carries random
    /// jitter in `1000..5000` ms so that clients started together spread out.
    fn default() -> Self {
        Self {
            max_reconnection_delay_ms: 10_000,
            min_reconnection_delay_ms: rand::thread_rng().gen_range(1000..5000),
            reconnection_delay_grow_factor: 1.3,
            min_uptime_ms: 5000,
            connection_timeout_ms: 4000,
            max_retries: None,
            max_enqueued_messages: None,
            start_closed: false,
            debug: false,
        }
    }
}

/// How inbound messages are held while deferral is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeferStrategy {
    /// Keep every message, in arrival order
    #[default]
    KeepAll,
    /// Keep only the latest message per kind
    KeepLast,
}

/// Facade-level behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Identifier carried in readiness events and log lines
    pub connection_id: String,
    /// Buffer inbound messages until deferral is switched off
    pub defer_updates: bool,
    pub defer_strategy: DeferStrategy,
    /// Force a reconnect on becoming visible after a long silence
    pub watch_for_halted_state: bool,
    /// Arm the idle watchdog on every message
    pub watch_message_for_state: bool,
    /// Reconnect instead of reporting Idle when the watchdog fires
    pub reconnect_on_idle_state: bool,
    pub idle_window_ms: u64,
    pub halted_threshold_ms: u64,
    /// Requested sub-protocols
    pub protocols: Vec<String>,
    pub binary_mode: BinaryMode,
}

impl ConnectionOptions {
    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
    }

    pub fn halted_threshold(&self) -> Duration {
        Duration::from_millis(self.halted_threshold_ms)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connection_id: "resocket".to_string(),
            defer_updates: true,
            defer_strategy: DeferStrategy::KeepAll,
            watch_for_halted_state: false,
            watch_message_for_state: false,
            reconnect_on_idle_state: false,
            idle_window_ms: 2 * 60 * 1000,
            halted_threshold_ms: 40 * 1000,
            protocols: Vec::new(),
            binary_mode: BinaryMode::Bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_jitter_in_range() {
        for _ in 0..50 {
            let policy = RetryPolicy::default();
            assert!((1000..5000).contains(&policy.min_reconnection_delay_ms));
            assert!(policy.validate().is_ok());
        }
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let policy = RetryPolicy {
            min_reconnection_delay_ms: 20_000,
            max_reconnection_delay_ms: 10_000,
            ..RetryPolicy::default()
        };
        assert!(matches!(policy.validate(), Err(SocketError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_shrinking_factor() {
        let policy = RetryPolicy {
            reconnection_delay_grow_factor: 0.5,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());

        let nan = RetryPolicy {
            reconnection_delay_grow_factor: f64::NAN,
            ..RetryPolicy::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_partial_options_deserialize_with_defaults() {
        let options: ConnectionOptions = serde_json::from_str(
            r#"{"defer_updates": false, "defer_strategy": "keeplast"}"#,
        )
        .unwrap();
        assert!(!options.defer_updates);
        assert_eq!(options.defer_strategy, DeferStrategy::KeepLast);
        assert_eq!(options.idle_window(), Duration::from_secs(120));
        assert_eq!(options.halted_threshold(), Duration::from_secs(40));
    }
}
