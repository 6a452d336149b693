//! Client configuration.
//!
//! Defaults match the values the event subscriber has always run with; every knob can be
//! overridden programmatically or from JSON.

use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Receive timeout handed to the bus subscriber.
pub const SUBSCRIBER_TIMEOUT_MS: u64 = 2_000;
/// Interval between heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
/// Maximum number of pending values in the shared queue before new events are dropped.
pub const QUEUE_MAX_SIZE: usize = 10_240;
/// Number of latency samples averaged by the tracker.
pub const LATENCY_WINDOW: usize = 10;
/// Period of the counters aggregator.
pub const STATS_INTERVAL: Duration = Duration::from_secs(1);
/// Largest payload, in bytes, a bus adapter hands over per record.
pub const EVENT_BUFFER_SIZE: usize = 4_096;

/// Validated configuration for an [`EventClient`](crate::EventClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventClientConfig {
    use_cache: bool,
    receive_timeout: Duration,
    heartbeat_interval: Duration,
    queue_capacity: usize,
    latency_window: usize,
    stats_interval: Duration,
    max_payload_bytes: usize,
}

impl Default for EventClientConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            receive_timeout: Duration::from_millis(SUBSCRIBER_TIMEOUT_MS),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            queue_capacity: QUEUE_MAX_SIZE,
            latency_window: LATENCY_WINDOW,
            stats_interval: STATS_INTERVAL,
            max_payload_bytes: EVENT_BUFFER_SIZE,
        }
    }
}

/// Wire form accepted by [`EventClientConfig::from_json`]. Durations are milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    use_cache: Option<bool>,
    receive_timeout_ms: Option<u64>,
    heartbeat_interval_ms: Option<u64>,
    queue_capacity: Option<usize>,
    latency_window: Option<usize>,
    stats_interval_ms: Option<u64>,
    max_payload_bytes: Option<usize>,
}

impl EventClientConfig {
    /// Parse a JSON object; absent fields keep their defaults.
    ///
    /// ```
    /// use evbridge::EventClientConfig;
    /// let cfg = EventClientConfig::from_json(r#"{"queue_capacity": 64}"#).unwrap();
    /// assert_eq!(cfg.queue_capacity(), 64);
    /// ```
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let d = Self::default();
        let cfg = Self {
            use_cache: raw.use_cache.unwrap_or(d.use_cache),
            receive_timeout: raw
                .receive_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(d.receive_timeout),
            heartbeat_interval: raw
                .heartbeat_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(d.heartbeat_interval),
            queue_capacity: raw.queue_capacity.unwrap_or(d.queue_capacity),
            latency_window: raw.latency_window.unwrap_or(d.latency_window),
            stats_interval: raw
                .stats_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(d.stats_interval),
            max_payload_bytes: raw.max_payload_bytes.unwrap_or(d.max_payload_bytes),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.receive_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration { name: "receive_timeout" });
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroDuration { name: "heartbeat_interval" });
        }
        if self.stats_interval.is_zero() {
            return Err(ConfigError::ZeroDuration { name: "stats_interval" });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity { name: "queue_capacity", provided: 0 });
        }
        if self.latency_window == 0 {
            return Err(ConfigError::ZeroCapacity { name: "latency_window", provided: 0 });
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::ZeroCapacity { name: "max_payload_bytes", provided: 0 });
        }
        Ok(())
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        self.receive_timeout = timeout;
        self.validate()?;
        Ok(self)
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        self.heartbeat_interval = interval;
        self.validate()?;
        Ok(self)
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity { name: "queue_capacity", provided: capacity });
        }
        self.queue_capacity = capacity;
        Ok(self)
    }

    pub fn with_latency_window(mut self, window: usize) -> Result<Self, ConfigError> {
        if window == 0 {
            return Err(ConfigError::ZeroCapacity { name: "latency_window", provided: window });
        }
        self.latency_window = window;
        Ok(self)
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        self.stats_interval = interval;
        self.validate()?;
        Ok(self)
    }

    pub fn with_max_payload_bytes(mut self, bytes: usize) -> Result<Self, ConfigError> {
        if bytes == 0 {
            return Err(ConfigError::ZeroCapacity { name: "max_payload_bytes", provided: bytes });
        }
        self.max_payload_bytes = bytes;
        Ok(self)
    }

    /// Whether the subscriber should replay from the bus cache on init.
    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    /// Upper bound on a single bus receive call.
    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Queue length at or above which new events are dropped.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn latency_window(&self) -> usize {
        self.latency_window
    }

    pub fn stats_interval(&self) -> Duration {
        self.stats_interval
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_subscriber_constants() {
        let cfg = EventClientConfig::default();
        assert!(cfg.use_cache());
        assert_eq!(cfg.receive_timeout(), Duration::from_millis(2_000));
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(2));
        assert_eq!(cfg.queue_capacity(), 10_240);
        assert_eq!(cfg.latency_window(), 10);
        assert_eq!(cfg.stats_interval(), Duration::from_secs(1));
        assert_eq!(cfg.max_payload_bytes(), 4_096);
    }

    #[test]
    fn json_overrides_only_named_fields() {
        let cfg = EventClientConfig::from_json(
            r#"{"use_cache": false, "heartbeat_interval_ms": 500, "queue_capacity": 2}"#,
        )
        .unwrap();
        assert!(!cfg.use_cache());
        assert_eq!(cfg.heartbeat_interval(), Duration::from_millis(500));
        assert_eq!(cfg.queue_capacity(), 2);
        assert_eq!(cfg.receive_timeout(), Duration::from_millis(SUBSCRIBER_TIMEOUT_MS));
    }

    #[test]
    fn json_rejects_unknown_and_zero_values() {
        assert!(matches!(
            EventClientConfig::from_json(r#"{"bogus": 1}"#),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(
            EventClientConfig::from_json(r#"{"stats_interval_ms": 0}"#),
            Err(ConfigError::ZeroDuration { name: "stats_interval" })
        );
    }

    #[test]
    fn builders_validate() {
        let cfg = EventClientConfig::default();
        assert!(cfg.clone().with_queue_capacity(0).is_err());
        assert!(cfg.clone().with_receive_timeout(Duration::ZERO).is_err());
        let cfg = cfg.with_latency_window(3).unwrap().with_use_cache(false);
        assert_eq!(cfg.latency_window(), 3);
        assert!(!cfg.use_cache());
    }
}
