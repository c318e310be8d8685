//! Error types for the gateway.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for store and policy operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Infrastructure failures. Policy rejections are not errors.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Redis unreachable or command failed
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Gave up waiting for a critical section lock
    #[error("timed out after {waited:?} waiting for lock '{name}'")]
    LockTimeout { name: String, waited: Duration },

    /// A quota counter that is not a decimal integer
    #[error("counter '{key}' holds non-numeric value '{value}'")]
    CorruptCounter { key: String, value: String },

    /// The task running a critical section panicked or was shut down
    #[error("critical section task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
