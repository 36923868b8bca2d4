//! Durable stream bridge
//!
//! At-least-once consumption of the shared Redis stream by a named consumer
//! group, with crash-safe resumption, reconnect backoff and bounded-effort
//! forwarding into the relay's command protocol; plus the publisher used by
//! the SEND_MESSAGE handler to append entries for other consumers.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod backoff;
pub mod consumer;
pub mod error;
pub mod publisher;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use backoff::Backoff;
pub use consumer::{BridgeState, ForwardOutcome, StreamBridge};
pub use error::BridgeError;
pub use publisher::{Publish, StreamPublisher};
