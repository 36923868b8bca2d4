//! Command line interface for the relay server

use std::net::SocketAddr;

use clap::Parser;

// ----------------------------------------------------------------------------
// CLI Arguments
// ----------------------------------------------------------------------------

/// Relay service: WebSocket clients, legacy UDP devices, stream producers
#[derive(Debug, Parser)]
#[command(name = "relayd", version, about)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the WebSocket bind address
    #[arg(long)]
    pub ws_bind: Option<SocketAddr>,

    /// Override the UDP channel bind address
    #[arg(long)]
    pub udp_bind: Option<SocketAddr>,

    /// Override the Redis URL
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Override the auth service base URL
    #[arg(long)]
    pub auth_url: Option<String>,

    /// Disable the UDP channel
    #[arg(long)]
    pub no_udp: bool,

    /// Disable the stream bridge
    #[arg(long)]
    pub no_bridge: bool,
}
