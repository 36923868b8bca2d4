//! Reliable datagram channel
//!
//! Best-effort-but-eventually-delivered messaging over a lossy, unordered
//! UDP transport. Each outbound message gets a per-peer sequence id and is
//! retransmitted on a fixed tick until the peer acknowledges it; sequence
//! ids exist for acknowledgment correlation, not for reordering.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod client;
pub mod error;
pub mod frame;
pub mod peer;
pub mod server;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use client::UdpChannelClient;
pub use error::UdpChannelError;
pub use frame::DatagramFrame;
pub use peer::{PeerTable, UdpPeer};
pub use server::{InboundDatagram, UdpChannelServer};
