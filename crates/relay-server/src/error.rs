//! Error types for the relay server binary

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors surfaced by the server façade
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Relay(#[from] relay_core::RelayError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] relay_bridge::BridgeError),

    #[error("Datagram channel error: {0}")]
    Udp(#[from] relay_udp::UdpChannelError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Auth service error: {0}")]
    Auth(#[from] reqwest::Error),

    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl ServerError {
    /// Create a configuration error with a reason
    pub fn config<T: Into<String>>(reason: T) -> Self {
        ServerError::Config {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = core::result::Result<T, ServerError>;
