//! Error types for the IMAP library.

use thiserror::Error;

use crate::protocol::StateKind;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure (I/O, TLS, timeout, connection closed).
    #[error(transparent)]
    Net(#[from] postwire_net::Error),

    /// SASL negotiation failure.
    #[error("authentication failed: {0}")]
    Sasl(#[from] postwire_sasl::Error),

    /// Protocol parsing error.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Server returned NO response.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD response.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Command issued in the wrong session state. Detected before any
    /// bytes are written.
    #[error("invalid state: expected {expected}, currently {actual}")]
    InvalidState {
        /// State the command requires.
        expected: StateKind,
        /// State the session is actually in.
        actual: StateKind,
    },

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The session task serving this handle has shut down.
    #[error("session task terminated")]
    SessionClosed,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
