//! Error types for the core library.

use thiserror::Error;

/// Errors raised while loading a store snapshot.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store snapshot is structurally invalid.
    #[error("Invalid snapshot: {0}")]
    Snapshot(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
