//! Error types for the datagram channel

use std::net::SocketAddr;

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the reliable datagram channel
#[derive(Debug, Error)]
pub enum UdpChannelError {
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown peer: {addr}")]
    UnknownPeer { addr: SocketAddr },

    #[error("Inbound channel closed")]
    InboundChannelClosed,
}

pub type Result<T> = core::result::Result<T, UdpChannelError>;
