//! Application configuration
//!
//! Loads the server's TOML configuration and applies CLI overrides on top.
//! Component tunables live in [`RelayConfig`]; this file adds the bind
//! addresses and external service endpoints only the binary cares about.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use relay_core::RelayConfig;

use crate::cli::Cli;
use crate::error::{Result, ServerError};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Full configuration of the relay server binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// WebSocket listener address
    pub ws_bind: SocketAddr,
    /// The single logical endpoint path clients must request
    pub endpoint_path: String,
    /// UDP channel listener address
    pub udp_bind: SocketAddr,
    /// Redis URL for the stream bridge and publisher
    pub redis_url: String,
    /// Base URL of the external auth validation service
    pub auth_base_url: String,
    /// Component tunables
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_bind: SocketAddr::from(([0, 0, 0, 0], 4242)),
            endpoint_path: "/ws".to_string(),
            udp_bind: SocketAddr::from(([0, 0, 0, 0], 4243)),
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            auth_base_url: "http://127.0.0.1:8080".to_string(),
            relay: RelayConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|err| ServerError::config(format!("invalid configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides on top of the loaded configuration
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(ws_bind) = cli.ws_bind {
            self.ws_bind = ws_bind;
        }
        if let Some(udp_bind) = cli.udp_bind {
            self.udp_bind = udp_bind;
        }
        if let Some(redis_url) = &cli.redis_url {
            self.redis_url = redis_url.clone();
        }
        if let Some(auth_url) = &cli.auth_url {
            self.auth_base_url = auth_url.clone();
        }
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<()> {
        if !self.endpoint_path.starts_with('/') {
            return Err(ServerError::config("endpoint path must start with '/'"));
        }
        if self.redis_url.is_empty() {
            return Err(ServerError::config("redis URL cannot be empty"));
        }
        if self.auth_base_url.is_empty() {
            return Err(ServerError::config("auth base URL cannot be empty"));
        }
        self.relay
            .validate()
            .map_err(|err| ServerError::config(err.to_string()))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
