//! Error types for SMTP operations.

use crate::state::SessionState;
use crate::types::EnhancedStatusCode;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure (I/O, TLS, timeout, connection closed).
    #[error(transparent)]
    Net(#[from] postwire_net::Error),

    /// SASL negotiation failure.
    #[error("authentication failed: {0}")]
    Sasl(#[from] postwire_sasl::Error),

    /// Server rejected a command.
    #[error("SMTP error {code}: {message}")]
    Server {
        /// Reply code (e.g., 550).
        code: u16,
        /// Enhanced status code (RFC 3463), when the server sent one.
        enhanced: Option<EnhancedStatusCode>,
        /// Error message from server.
        message: String,
    },

    /// Command issued in the wrong session state. Detected before any
    /// bytes are written.
    #[error("invalid state: expected {expected}, currently {actual}")]
    InvalidState {
        /// State the command requires.
        expected: SessionState,
        /// State the session is actually in.
        actual: SessionState,
    },

    /// Protocol error (unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),
}

impl Error {
    /// Creates a server-rejection error from a reply.
    #[must_use]
    pub fn from_reply(reply: &crate::types::Reply) -> Self {
        Self::Server {
            code: reply.code.as_u16(),
            enhanced: reply.enhanced_status(),
            message: reply.message_text(),
        }
    }

    /// Returns true if this is a permanent server error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Server { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient server error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Server { code, .. } if *code >= 400 && *code < 500)
    }
}
