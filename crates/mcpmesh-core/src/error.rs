//! Error types shared across the mcpmesh workspace.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Top-level error type for operations that span multiple components.
///
/// Individual crates (`mcpmesh-discovery`, `mcpmesh-bridge`, ...) define
/// their own focused error enums; this one is for cross-cutting failures
/// surfaced at the binary boundary.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Configuration could not be loaded or was invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure reading or watching the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for conditions that should never normally occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MeshError {
    /// Build a configuration error with a formatted message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build an internal error with a formatted message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
