//! Error types for the voice consultation client

use thiserror::Error;

/// Result type alias for consultation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a live consultation
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone access was refused by the platform
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No usable audio device or device configuration
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Audio stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Remote connection failed to open or dropped mid-stream
    #[error("connection error: {0}")]
    Connection(String),

    /// Payload could not be decoded
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Operation not valid in the current session state
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// Session start was aborted by a stop request
    #[error("session start cancelled")]
    Cancelled,

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

impl Error {
    /// Whether the session can keep running after this error
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedPayload(_))
    }

    /// Whether the error means the user must grant or attach a microphone
    #[must_use]
    pub const fn is_device_error(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::DeviceUnavailable(_))
    }
}
