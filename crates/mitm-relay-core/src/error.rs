//! Error types for the mitm relay.

use thiserror::Error;

/// Result type alias for mitm-relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while setting up or running the relay.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake failure.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The TLS identity could not be loaded, parsed or generated.
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// The upstream server could not be reached.
    #[error("Failed to connect to server {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A host or host:port string could not be understood.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A read produced no data within the idle window.
    #[error("Idle timeout")]
    Timeout,
}

impl Error {
    pub(crate) fn certificate(msg: impl Into<String>) -> Self {
        Error::Certificate(msg.into())
    }
}
