//! Error types for tabrelay
//!
//! Per-message problems never surface here: they are logged and dropped by
//! the router. `BridgeError` covers the failures a caller has to act on.

use thiserror::Error;

/// Errors that can occur while configuring or talking to the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// `setup` was called again with a different base URI or manifest
    #[error("Conflicting setup: bridge already configured for '{existing}', refusing '{requested}'")]
    ConflictingSetup { existing: String, requested: String },

    /// The control task has stopped and no longer accepts commands
    #[error("Bridge control task has shut down")]
    Shutdown,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
