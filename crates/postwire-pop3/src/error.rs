//! Error types for POP3 operations.

use crate::state::SessionState;

/// Result type alias for POP3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// POP3 error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure (I/O, TLS, timeout, connection closed).
    #[error(transparent)]
    Net(#[from] postwire_net::Error),

    /// SASL negotiation failure.
    #[error("authentication failed: {0}")]
    Sasl(#[from] postwire_sasl::Error),

    /// Server answered `-ERR`.
    #[error("server error: {0}")]
    Server(String),

    /// Command issued in the wrong session state. Detected before any
    /// bytes are written.
    #[error("invalid state: expected {expected}, currently {actual}")]
    InvalidState {
        /// State the command requires.
        expected: SessionState,
        /// State the session is actually in.
        actual: SessionState,
    },

    /// Protocol error (unexpected or unparsable response).
    #[error("protocol error: {0}")]
    Protocol(String),
}
