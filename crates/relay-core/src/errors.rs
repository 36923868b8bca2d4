//! Error types for the relay protocol core
//!
//! This module contains the error types used throughout the relay core,
//! including codec errors, command bus errors, registry errors, and the main
//! RelayError type that unifies them all.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors produced while encoding or decoding wire frames
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed frame: expected at least 3 tokens, got {tokens}")]
    TooFewTokens { tokens: usize },
    #[error("Unknown message kind: {kind}")]
    UnknownKind { kind: String },
    #[error("Empty frame")]
    EmptyFrame,
}

/// Errors produced by the command bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Request '{name}' timed out after {after_ms}ms")]
    Timeout { name: String, after_ms: u64 },
    #[error("No outbound writer is bound to the bus")]
    NoWriter,
    #[error("Outbound channel closed while sending frame")]
    WriterClosed,
    #[error("Reply channel closed before a response arrived")]
    ReplyChannelClosed,
}

/// Errors produced by the client registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid client identity '{raw}': {reason}")]
    InvalidIdentity { raw: String, reason: String },
}

/// Errors produced while parsing structured command parameters
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error("Malformed parameter '{raw}': expected KEY:VALUE")]
    Malformed { raw: String },
    #[error("Unknown parameter key: '{key}'")]
    UnknownKey { key: String },
    #[error("Empty value not allowed for key: {key}")]
    EmptyValue { key: String },
    #[error("Duplicate key not allowed: {key}")]
    DuplicateKey { key: String },
    #[error("Missing required key: {key}")]
    MissingKey { key: String },
}

// ----------------------------------------------------------------------------
// Top-Level Error Type
// ----------------------------------------------------------------------------

/// Core error type for the relay protocol
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl RelayError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        RelayError::Configuration {
            reason: reason.into(),
        }
    }
}

impl RegistryError {
    /// Create an invalid identity error
    pub fn invalid_identity<R: Into<String>, S: Into<String>>(raw: R, reason: S) -> Self {
        RegistryError::InvalidIdentity {
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, RelayError>;
