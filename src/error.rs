//! Error types for guac-gateway

use thiserror::Error;

use crate::protocol::Status;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GuacError {
    /// I/O error (socket failure or timeout)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A frame on the wire could not be parsed
    #[error("Malformed instruction: {0}")]
    Malformed(String),

    /// The guacd handshake did not follow the expected sequence
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// guacd acknowledged a stream with a non-zero status
    #[error("Server error {status}: {message}")]
    Server {
        /// Guacamole status reported by guacd
        status: Status,
        /// Server-supplied message from the `ack` instruction
        message: String,
    },

    /// The tunnel was closed while an intercept was still active
    #[error("Intercept cancelled: tunnel closed")]
    Cancelled,
}

/// Result type alias for GuacError
pub type Result<T> = std::result::Result<T, GuacError>;

impl From<serde_yaml::Error> for GuacError {
    fn from(err: serde_yaml::Error) -> Self {
        GuacError::Config(err.to_string())
    }
}
