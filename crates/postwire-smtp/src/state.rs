//! Session state machine.
//!
//! SMTP sessions move strictly forward:
//!
//! ```text
//! Disconnected → Connected → Authenticating → Authenticated
//! ```
//!
//! except for explicit disconnect. Commands are checked against the
//! current state before serialization; a violation produces
//! [`crate::Error::InvalidState`] and writes nothing to the transport.

use crate::error::{Error, Result};

/// Connection lifecycle state of an SMTP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport open.
    #[default]
    Disconnected,
    /// Greeting received, not authenticated.
    Connected,
    /// SASL exchange in flight.
    Authenticating,
    /// Authentication accepted.
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

    /// Requires `Connected` or `Authenticated` (mail transactions are
    /// legal without AUTH on servers that permit it).
    pub(crate) fn require_ready(self) -> Result<()> {
        match self {
            Self::Connected | Self::Authenticated => Ok(()),
            other => Err(Error::InvalidState {
                expected: Self::Authenticated,
                actual: other,
            }),
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
    fn test_require_matches() {
        assert!(SessionState::Connected.require(SessionState::Connected).is_ok());
    }

    #[test]
    fn test_require_carries_both_states() {
        let err = SessionState::Disconnected
            .require(SessionState::Connected)
            .unwrap_err();
        match err {
            Error::InvalidState { expected, actual } => {
                assert_eq!(expected, SessionState::Connected);
                assert_eq!(actual, SessionState::Disconnected);
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn test_require_ready() {
        assert!(SessionState::Connected.require_ready().is_ok());
        assert!(SessionState::Authenticated.require_ready().is_ok());
        assert!(SessionState::Disconnected.require_ready().is_err());
        assert!(SessionState::Authenticating.require_ready().is_err());
    }
}
