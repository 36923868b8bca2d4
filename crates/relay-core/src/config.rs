//! Centralized configuration for the relay components
//!
//! Consolidates the tunables of the command bus, the datagram channel, the
//! stream bridge and the registry monitor into one validated structure, so
//! the server binary can load a single TOML document.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

// ----------------------------------------------------------------------------
// Command Bus Configuration
// ----------------------------------------------------------------------------

/// Configuration for the command bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Deadline applied when `request` is called without an explicit timeout
    pub default_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
        }
    }
}

impl BusConfig {
    /// Configuration optimized for testing (fast timeouts)
    pub fn testing() -> Self {
        Self {
            default_timeout: Duration::from_millis(250),
        }
    }
}

// ----------------------------------------------------------------------------
// Datagram Channel Configuration
// ----------------------------------------------------------------------------

/// Configuration for the reliable datagram channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpChannelConfig {
    /// Interval between retransmission sweeps over every peer's pending set
    pub retransmit_interval: Duration,
    /// Client-role heartbeat interval
    pub ping_interval: Duration,
    /// Payload of the reliable welcome sent on REGISTER
    pub welcome_message: String,
    /// Receive buffer size for one datagram
    pub recv_buffer_size: usize,
}

impl Default for UdpChannelConfig {
    fn default() -> Self {
        Self {
            retransmit_interval: Duration::from_secs(1),
            ping_interval: Duration::from_secs(30),
            welcome_message: "WELCOME".to_string(),
            recv_buffer_size: 1024,
        }
    }
}

impl UdpChannelConfig {
    /// Configuration optimized for testing (fast ticks)
    pub fn testing() -> Self {
        Self {
            retransmit_interval: Duration::from_millis(20),
            ping_interval: Duration::from_millis(100),
            ..Self::default()
        }
    }
}

// ----------------------------------------------------------------------------
// Stream Bridge Configuration
// ----------------------------------------------------------------------------

/// Configuration for the durable stream bridge and publisher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Stream key holding producer messages
    pub stream: String,
    /// Consumer group name
    pub group: String,
    /// Consumer name within the group
    pub consumer: String,
    /// Maximum entries fetched per read
    pub batch_count: usize,
    /// Blocking interval of one group read
    pub block_interval: Duration,
    /// Initial reconnect backoff
    pub backoff_base: Duration,
    /// Reconnect backoff ceiling
    pub backoff_max: Duration,
    /// Approximate stream length the publisher trims to
    pub publish_maxlen: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            stream: "client-messages".to_string(),
            group: "relay-bridge".to_string(),
            consumer: "bridge-1".to_string(),
            batch_count: 16,
            block_interval: Duration::from_millis(2000),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(10),
            publish_maxlen: 10_000,
        }
    }
}

impl BridgeConfig {
    /// Configuration optimized for testing (fast reconnects)
    pub fn testing() -> Self {
        Self {
            block_interval: Duration::from_millis(50),
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(80),
            ..Self::default()
        }
    }
}

// ----------------------------------------------------------------------------
// Registry Monitor Configuration
// ----------------------------------------------------------------------------

/// Configuration for the periodic registry diagnostics pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Whether the periodic pass runs at all
    pub enabled: bool,
    /// Interval between diagnostic reports
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
        }
    }
}

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Master configuration consolidating every relay component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Command bus configuration
    #[serde(default)]
    pub bus: BusConfig,
    /// Datagram channel configuration
    #[serde(default)]
    pub udp: UdpChannelConfig,
    /// Stream bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Registry monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            bus: BusConfig::testing(),
            udp: UdpChannelConfig::testing(),
            bridge: BridgeConfig::testing(),
            monitor: MonitorConfig::default(),
        }
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.bus.default_timeout.is_zero() {
            return Err(RelayError::config_error("Bus default timeout cannot be zero"));
        }
        if self.udp.retransmit_interval.is_zero() {
            return Err(RelayError::config_error(
                "UDP retransmit interval cannot be zero",
            ));
        }
        if self.udp.recv_buffer_size == 0 {
            return Err(RelayError::config_error(
                "UDP receive buffer size cannot be zero",
            ));
        }
        if self.bridge.stream.is_empty() || self.bridge.group.is_empty() {
            return Err(RelayError::config_error(
                "Bridge stream and group names cannot be empty",
            ));
        }
        if self.bridge.batch_count == 0 {
            return Err(RelayError::config_error("Bridge batch count cannot be zero"));
        }
        if self.bridge.backoff_base > self.bridge.backoff_max {
            return Err(RelayError::config_error(
                "Bridge backoff base cannot exceed backoff max",
            ));
        }
        if self.monitor.enabled && self.monitor.interval.is_zero() {
            return Err(RelayError::config_error(
                "Monitor interval cannot be zero when enabled",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(RelayConfig::default().validate().is_ok());
        assert!(RelayConfig::testing().validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = RelayConfig::default();
        config.bus.default_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_backoff_bounds_are_rejected() {
        let mut config = RelayConfig::default();
        config.bridge.backoff_base = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }
}
