//! Core types for the relay service
//!
//! This module defines the fundamental identity and connection types used
//! throughout the relay, using newtype patterns for semantic validation.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::RegistryError;

// ----------------------------------------------------------------------------
// Client Identity
// ----------------------------------------------------------------------------

/// Composite identity of one logical client slot: `userId:deviceId`.
///
/// Derived from a validated auth token, never chosen by the client. Both
/// components are opaque, non-empty strings with no further structure
/// assumed. A user running multiple devices holds one identity per device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientIdentity {
    user_id: String,
    device_id: String,
}

impl ClientIdentity {
    /// Create a new identity from its components.
    ///
    /// Fails fast on empty components or components containing the `:`
    /// separator, so a malformed key can never reach the registry maps.
    pub fn new<U: Into<String>, D: Into<String>>(
        user_id: U,
        device_id: D,
    ) -> Result<Self, RegistryError> {
        let user_id = user_id.into();
        let device_id = device_id.into();

        if user_id.is_empty() {
            return Err(RegistryError::invalid_identity(
                format!("{user_id}:{device_id}"),
                "empty userId",
            ));
        }
        if device_id.is_empty() {
            return Err(RegistryError::invalid_identity(
                format!("{user_id}:{device_id}"),
                "empty deviceId",
            ));
        }
        if user_id.contains(':') {
            return Err(RegistryError::invalid_identity(
                format!("{user_id}:{device_id}"),
                "userId must not contain ':'",
            ));
        }

        Ok(Self { user_id, device_id })
    }

    /// The user component of the composite key
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The device component of the composite key
    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.device_id)
    }
}

impl FromStr for ClientIdentity {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((user, device)) => Self::new(user, device),
            None => Err(RegistryError::invalid_identity(
                s,
                "expected userId:deviceId",
            )),
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Identifier
// ----------------------------------------------------------------------------

/// Unique identifier for one physical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Connection Handle
// ----------------------------------------------------------------------------

/// Cheap-to-clone handle to a live client connection.
///
/// Carries the outbound text sender for the connection's writer task.
/// Equality and hashing are by connection id only, so two handles compare
/// equal exactly when they refer to the same physical connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    remote: String,
    sender: mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    /// Create a handle for a freshly accepted connection
    pub fn new<R: Into<String>>(remote: R, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: ConnectionId::generate(),
            remote: remote.into(),
            sender,
        }
    }

    /// The connection's unique id
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address description for diagnostics
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Whether the connection's writer is still accepting frames
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue a raw text frame for delivery to this connection.
    ///
    /// Returns false if the connection's writer task has gone away.
    pub fn send(&self, frame: String) -> bool {
        self.sender.send(frame).is_ok()
    }

    /// The raw outbound sender, for rebinding the bus writer
    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.sender.clone()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl core::hash::Hash for ConnectionHandle {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
