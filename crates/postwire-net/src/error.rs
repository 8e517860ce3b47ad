//! Error types for the transport layer.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur at the transport level.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// No response arrived before the deadline expired.
    ///
    /// Distinct from [`Error::ConnectionClosed`]: the connection is still
    /// open, the server just did not answer in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The peer closed the stream while a response was outstanding.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// The stream is not in a state that allows the operation
    /// (e.g. STARTTLS on an already-encrypted stream).
    #[error("Invalid stream state: {0}")]
    InvalidStreamState(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
