//! Runtime settings for the hub and its reader loops.

use crate::error::ConfigError;
use std::time::Duration;

/// Tunables for a [`ChatService`](crate::ws::service::ChatService).
///
/// Build one with [`HubConfig::default`] and the `with_*` methods, or read it
/// from the environment with [`HubConfig::from_env`]:
///
/// | variable | field |
/// |---|---|
/// | `HUB_EVENT_CAPACITY` | `event_capacity` |
/// | `HUB_KEEPALIVE_SECS` | `keepalive_interval` |
/// | `HUB_IDLE_TIMEOUT_SECS` | `idle_timeout` |
/// | `HUB_WRITE_TIMEOUT_SECS` | `write_timeout` |
/// | `HUB_MAX_FRAME_BYTES` | `max_frame_size` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of the hub's inbound event queue. Full queues back-pressure readers.
    pub event_capacity: usize,
    /// How often every live connection receives a `ping` text frame.
    pub keepalive_interval: Duration,
    /// Read deadline, renewed before every receive.
    pub idle_timeout: Duration,
    /// Upper bound for a single socket write performed by the hub.
    pub write_timeout: Duration,
    /// Largest inbound frame accepted at upgrade time, in bytes.
    pub max_frame_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            keepalive_interval: Duration::from_secs(3 * 60),
            idle_timeout: Duration::from_secs(5 * 60),
            write_timeout: Duration::from_secs(10),
            max_frame_size: 256 * 1024,
        }
    }
}

impl HubConfig {
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// Reads overrides from the process environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`HubConfig::from_env`], with an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(n) = read_number(&lookup, "HUB_EVENT_CAPACITY")? {
            config.event_capacity = n as usize;
        }
        if let Some(secs) = read_number(&lookup, "HUB_KEEPALIVE_SECS")? {
            config.keepalive_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = read_number(&lookup, "HUB_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read_number(&lookup, "HUB_WRITE_TIMEOUT_SECS")? {
            config.write_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = read_number(&lookup, "HUB_MAX_FRAME_BYTES")? {
            config.max_frame_size = n as usize;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects zero capacities and durations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::Zero("event_capacity"));
        }
        if self.keepalive_interval.is_zero() {
            return Err(ConfigError::Zero("keepalive_interval"));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Zero("idle_timeout"));
        }
        if self.write_timeout.is_zero() {
            return Err(ConfigError::Zero("write_timeout"));
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::Zero("max_frame_size"));
        }
        Ok(())
    }
}

fn read_number<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
    }
}
