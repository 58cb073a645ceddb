//! Error types for ToolCache
//!
//! Every error in this layer is non-fatal to the underlying tool: callers
//! degrade a failed `get` to a miss and log-and-swallow failed writes.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// ToolCache error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Key derivation
    // ========================================================================
    #[error("Key derivation failed: {tool} - {message}")]
    KeyDerivation { tool: String, message: String },

    // ========================================================================
    // Storage
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // General
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // External error conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========================================================================
    // Misc
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Key derivation error helper
    pub fn key_derivation(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::KeyDerivation {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Whether the caller should treat this error as a plain cache miss
    pub fn degrades_to_miss(&self) -> bool {
        matches!(
            self,
            Error::KeyDerivation { .. } | Error::Storage(_) | Error::Sqlite(_) | Error::NotFound(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
