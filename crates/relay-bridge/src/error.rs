//! Error types for the stream bridge

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the stream bridge and publisher
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Consumer group setup failed: {reason}")]
    GroupSetup { reason: String },
}

pub type Result<T> = core::result::Result<T, BridgeError>;
