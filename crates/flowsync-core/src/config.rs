//! Session configuration
//!
//! Durations are stored as milliseconds so the struct round-trips through
//! TOML unchanged; accessors hand out `Duration`s.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Heartbeat period of a graph session's consumer
    pub heartbeat_interval_ms: u64,
    /// Pause before re-subscribing after the watch channel closed
    pub reconnect_backoff_ms: u64,
    /// Bound on each edge validation call
    pub validation_timeout_ms: u64,
    /// Bound on port sample simulation during inspection
    pub inspect_timeout_ms: u64,
    /// Deadline for `*_sync` store writes
    pub write_timeout_ms: u64,
    /// Capacity of the consumer to dispatcher channel
    pub event_channel_capacity: usize,
    /// Only metrics with this prefix are forwarded as stats
    pub edge_metric_prefix: String,
    pub readiness_poll_interval_ms: u64,
    pub readiness_timeout_ms: u64,
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML; absent keys keep their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self, SyncError> {
        toml::from_str(raw).map_err(|e| SyncError::Config(e.to_string()))
    }

    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = millis(interval);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff_ms = millis(backoff);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout_ms = millis(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_readiness(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.readiness_poll_interval_ms = millis(poll_interval);
        self.readiness_timeout_ms = millis(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_edge_metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.edge_metric_prefix = prefix.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    #[inline]
    #[must_use]
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    #[inline]
    #[must_use]
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub fn inspect_timeout(&self) -> Duration {
        Duration::from_millis(self.inspect_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms.max(1))
    }

    #[inline]
    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 2_000,
            reconnect_backoff_ms: 1_000,
            validation_timeout_ms: 3_000,
            inspect_timeout_ms: 3_000,
            write_timeout_ms: 30_000,
            event_channel_capacity: 256,
            edge_metric_prefix: "edge_".to_string(),
            readiness_poll_interval_ms: 200,
            readiness_timeout_ms: 5_000,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::new();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(2));
        assert_eq!(config.reconnect_backoff(), Duration::from_secs(1));
        assert_eq!(config.edge_metric_prefix, "edge_");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            heartbeat_interval_ms = 500
            edge_metric_prefix = "link_"
            "#,
        )
        .unwrap();
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(500));
        assert_eq!(config.edge_metric_prefix, "link_");
        assert_eq!(config.validation_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = SyncConfig::from_toml_str("heartbeat_interval_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn builders() {
        let config = SyncConfig::new()
            .with_heartbeat(Duration::from_millis(250))
            .with_readiness(Duration::from_millis(10), Duration::from_millis(100));
        assert_eq!(config.heartbeat_interval_ms, 250);
        assert_eq!(config.readiness_timeout(), Duration::from_millis(100));
    }
}
