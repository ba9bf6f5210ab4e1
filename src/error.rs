//! Error types for the Saathi client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Saathi client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone unavailable or access denied
    #[error("microphone unavailable: {0}")]
    PermissionDenied(String),

    /// Audio capture/playback error
    #[error("audio error: {0}")]
    Audio(String),

    /// Capture pipeline misuse (e.g. concurrent begin)
    #[error("capture error: {0}")]
    Capture(String),

    /// Network or response-parse failure talking to the chat backend
    #[error("transport error: {0}")]
    Transport(String),

    /// Persisted client state could not be read or written
    #[error("storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
