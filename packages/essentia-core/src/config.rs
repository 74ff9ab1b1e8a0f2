//! Session configuration.
//!
//! All tunable timing and supervision parameters for a device session live
//! here. Protocol-mandated values (zone counts, wire scales) are in
//! [`crate::constants`] and are not configurable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ACTIVITY_DEBOUNCE_SECS, DEFAULT_ACTIVITY_HOLDOVER_SECS, DEFAULT_COMMAND_SPACING_MS,
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FAILURE_CEILING, DEFAULT_HEARTBEAT_INTERVAL_SECS,
    DEFAULT_RECONNECT_BACKOFF_BASE_SECS, DEFAULT_RECONNECT_BACKOFF_MAX_SECS,
    DEFAULT_VALIDATION_TIMEOUT_SECS, EVENT_CHANNEL_CAPACITY, FAILURE_WARN_THRESHOLDS,
    MAX_COMMAND_SPACING_MS, MIN_COMMAND_SPACING_MS, MIN_HEARTBEAT_INTERVAL_SECS,
};

/// Configuration for one device session.
///
/// All fields except `host` have sensible defaults. Out-of-range timing
/// values are clamped into their supported range by the accessor methods
/// rather than rejected, so a host platform can pass user preferences
/// through without pre-validating them.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    // Transport
    /// Hostname or IP of the TCP-to-RS232 serial bridge.
    pub host: String,

    /// TCP port of the serial bridge.
    pub port: u16,

    /// TCP connect timeout (seconds).
    pub connect_timeout_secs: u64,

    // Command queue
    /// Minimum spacing between queued command transmissions (milliseconds).
    pub command_spacing_ms: u64,

    /// Whether outbound commands are paced through the queue.
    ///
    /// When disabled, commands are transmitted synchronously with no spacing.
    pub queue_enabled: bool,

    // Connection supervision
    /// Time allowed for the validation probe round trip (seconds).
    pub validation_timeout_secs: u64,

    /// Interval between heartbeat polls while connected (seconds).
    pub heartbeat_interval_secs: u64,

    /// Base reconnect backoff (seconds); doubles per consecutive failure.
    pub reconnect_backoff_base_secs: u64,

    /// Cap on the reconnect backoff (seconds).
    pub reconnect_backoff_max_secs: u64,

    /// Consecutive-failure counts that trigger a warning alert.
    pub failure_warn_thresholds: Vec<u32>,

    /// Consecutive-failure count that triggers a critical alert.
    /// Retrying continues past the ceiling.
    pub failure_ceiling: u32,

    /// Whether to re-poll full state for all zones on promotion to CONNECTED.
    pub refresh_on_connect: bool,

    // Source activity
    /// Debounce before recomputing source activity (seconds).
    pub activity_debounce_secs: u64,

    /// Hold-over window before a derived "playing" flag flips false (seconds).
    pub activity_holdover_secs: u64,

    // Eventing
    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 23,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            command_spacing_ms: DEFAULT_COMMAND_SPACING_MS,
            queue_enabled: true,
            validation_timeout_secs: DEFAULT_VALIDATION_TIMEOUT_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            reconnect_backoff_base_secs: DEFAULT_RECONNECT_BACKOFF_BASE_SECS,
            reconnect_backoff_max_secs: DEFAULT_RECONNECT_BACKOFF_MAX_SECS,
            failure_warn_thresholds: FAILURE_WARN_THRESHOLDS.to_vec(),
            failure_ceiling: DEFAULT_FAILURE_CEILING,
            refresh_on_connect: true,
            activity_debounce_secs: DEFAULT_ACTIVITY_DEBOUNCE_SECS,
            activity_holdover_secs: DEFAULT_ACTIVITY_HOLDOVER_SECS,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Creates a configuration for the given serial bridge endpoint with
    /// default timing parameters.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("host must not be empty".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.reconnect_backoff_base_secs == 0 {
            return Err("reconnect_backoff_base_secs must be >= 1".to_string());
        }
        if self.reconnect_backoff_max_secs < self.reconnect_backoff_base_secs {
            return Err("reconnect_backoff_max_secs must be >= base".to_string());
        }
        if self.failure_ceiling == 0 {
            return Err("failure_ceiling must be >= 1".to_string());
        }
        Ok(())
    }

    /// Bridge endpoint in `host:port` form.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Command spacing, clamped to the supported range.
    #[must_use]
    pub fn command_spacing(&self) -> Duration {
        Duration::from_millis(
            self.command_spacing_ms
                .clamp(MIN_COMMAND_SPACING_MS, MAX_COMMAND_SPACING_MS),
        )
    }

    /// Heartbeat interval, clamped to the enforced minimum.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(MIN_HEARTBEAT_INTERVAL_SECS))
    }

    /// TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    /// Validation probe timeout.
    #[must_use]
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs.max(1))
    }

    /// Source-activity recompute debounce.
    #[must_use]
    pub fn activity_debounce(&self) -> Duration {
        Duration::from_secs(self.activity_debounce_secs)
    }

    /// Source-activity hold-over window.
    #[must_use]
    pub fn activity_holdover(&self) -> Duration {
        Duration::from_secs(self.activity_holdover_secs)
    }

    /// Reconnect delay for the given consecutive-failure count.
    ///
    /// Exponential: `base * 2^(failures-1)`, capped at the configured maximum.
    #[must_use]
    pub fn reconnect_backoff(&self, consecutive_failures: u32) -> Duration {
        let exp = consecutive_failures.saturating_sub(1).min(16);
        let secs = self
            .reconnect_backoff_base_secs
            .saturating_mul(1u64 << exp)
            .min(self.reconnect_backoff_max_secs);
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sensible() {
        let config = SessionConfig::new("192.168.2.50", 4999);
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint(), "192.168.2.50:4999");
        assert_eq!(config.command_spacing(), Duration::from_millis(500));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(25));
    }

    #[test]
    fn rejects_empty_host_and_zero_capacity() {
        assert!(SessionConfig::default().validate().is_err());

        let mut config = SessionConfig::new("host", 23);
        config.event_channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn command_spacing_is_clamped_to_supported_range() {
        let mut config = SessionConfig::new("host", 23);
        config.command_spacing_ms = 10;
        assert_eq!(config.command_spacing(), Duration::from_millis(100));
        config.command_spacing_ms = 60_000;
        assert_eq!(config.command_spacing(), Duration::from_millis(5000));
    }

    #[test]
    fn heartbeat_interval_enforces_minimum() {
        let mut config = SessionConfig::new("host", 23);
        config.heartbeat_interval_secs = 5;
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(15));
    }

    #[test]
    fn reconnect_backoff_doubles_and_caps() {
        let config = SessionConfig::new("host", 23);
        assert_eq!(config.reconnect_backoff(1), Duration::from_secs(10));
        assert_eq!(config.reconnect_backoff(2), Duration::from_secs(20));
        assert_eq!(config.reconnect_backoff(4), Duration::from_secs(80));
        // 10 * 2^9 = 5120, capped at 300
        assert_eq!(config.reconnect_backoff(10), Duration::from_secs(300));
        // Large counts must not overflow
        assert_eq!(config.reconnect_backoff(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn backoff_max_below_base_is_rejected() {
        let mut config = SessionConfig::new("host", 23);
        config.reconnect_backoff_base_secs = 60;
        config.reconnect_backoff_max_secs = 30;
        assert!(config.validate().is_err());
    }
}
