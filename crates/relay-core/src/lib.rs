//! Relay protocol core
//!
//! This crate provides the foundational pieces of the relay service: the
//! colon-delimited wire codec, the correlating command bus, the client
//! identity registry and the shared configuration types. It performs no
//! network I/O of its own; transports live in the sibling crates.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod bus;
pub mod config;
pub mod errors;
pub mod monitor;
pub mod params;
pub mod registry;
pub mod types;
pub mod wire;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use bus::{CommandBus, CommandHandler, OutboundWriter};
pub use config::{BridgeConfig, BusConfig, MonitorConfig, RelayConfig, UdpChannelConfig};
pub use errors::{BusError, CodecError, ParamError, RegistryError, RelayError, Result};
pub use monitor::{IdentityState, RegistryReport};
pub use params::{send_message_params, send_message_spec, KeySpec, ParamSpec, ParsedParams};
pub use registry::ClientRegistry;
pub use types::{ClientIdentity, ConnectionHandle, ConnectionId};
pub use wire::{CommandKind, CommandMessage};
