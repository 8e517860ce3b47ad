//! Error types for SASL negotiation.

use thiserror::Error;

/// Errors that can occur during SASL negotiation.
///
/// A mechanism failure aborts only the current authentication attempt;
/// the session object stays usable for a retry with different
/// credentials or a weaker mechanism.
#[derive(Debug, Error)]
pub enum Error {
    /// None of the mechanisms offered by the server is supported with
    /// the given credentials.
    #[error("no supported authentication mechanism offered by the server")]
    NoSupportedMechanism,

    /// The mechanism cannot be used with the given credentials
    /// (wrong secret kind, or `-PLUS` without channel binding).
    #[error("mechanism {mechanism} not usable: {reason}")]
    MechanismUnusable {
        /// Wire name of the mechanism.
        mechanism: &'static str,
        /// Why it cannot be driven.
        reason: &'static str,
    },

    /// A SCRAM challenge was missing a required attribute.
    #[error("incomplete SCRAM challenge: missing {missing}")]
    IncompleteChallenge {
        /// The attribute that was absent (`r`, `s` or `i`).
        missing: &'static str,
    },

    /// A challenge was structurally invalid or the server proved
    /// untrustworthy (nonce mismatch, server-reported error).
    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),

    /// The server's signature did not verify against the derived key.
    ///
    /// Either the password is wrong or the server does not know the
    /// proof it claims to know; the exchange must not be completed.
    #[error("server signature verification failed")]
    IncorrectHash,

    /// A challenge or response was not valid base64.
    #[error("invalid base64 in SASL exchange")]
    InvalidBase64(#[from] base64::DecodeError),

    /// The underlying crypto primitive rejected its input.
    #[error("cryptographic primitive unavailable")]
    CryptoUnavailable,

    /// A challenge arrived after the exchange already completed.
    #[error("authentication exchange already completed")]
    AlreadyAuthenticated,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
