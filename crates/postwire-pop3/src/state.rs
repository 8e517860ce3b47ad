//! Session state machine.
//!
//! POP3 names its phases AUTHORIZATION and TRANSACTION; they map onto
//! the same forward-only lifecycle the other postwire clients use:
//!
//! ```text
//! Disconnected → Connected → Authenticating → Authenticated
//! ```
//!
//! Transaction commands (`STAT`, `LIST`, `RETR`, `DELE`, ...) require
//! `Authenticated`; credential commands require `Connected`. A
//! violation produces [`crate::Error::InvalidState`] and writes
//! nothing to the transport.

use crate::error::{Error, Result};

/// Connection lifecycle state of a POP3 session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport open.
    #[default]
    Disconnected,
    /// Banner received, in the AUTHORIZATION phase.
    Connected,
    /// SASL exchange in flight.
    Authenticating,
    /// In the TRANSACTION phase.
    Authenticated,
}

impl SessionState {
    /// Requires exactly `expected`, failing fast otherwise.
    pub(crate) fn require(self, expected: Self) -> Result<()> {
        if self == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected,
                actual: self,
            })
        }
    }

    /// Requires any state with an open transport.
    pub(crate) fn require_open(self) -> Result<()> {
        if self == Self::Disconnected {
            Err(Error::InvalidState {
                expected: Self::Connected,
                actual: self,
            })
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
            Self::Authenticating => "Authenticating",
            Self::Authenticated => "Authenticated",
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_require_reports_both_states() {
        let err = SessionState::Connected
            .require(SessionState::Authenticated)
            .unwrap_err();
        match err {
            Error::InvalidState { expected, actual } => {
                assert_eq!(expected, SessionState::Authenticated);
                assert_eq!(actual, SessionState::Connected);
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn test_require_open() {
        assert!(SessionState::Connected.require_open().is_ok());
        assert!(SessionState::Authenticated.require_open().is_ok());
        assert!(SessionState::Disconnected.require_open().is_err());
    }
}
