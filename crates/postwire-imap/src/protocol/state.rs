//! Session state types.
//!
//! IMAP connections move through the states of RFC 9051 section 3:
//!
//! ```text
//! NotAuthenticated → Authenticated → Selected(mailbox)
//!                                  ← (CLOSE/UNSELECT, failed SELECT)
//! any state → Logout
//! ```
//!
//! The engine checks every command against this state before encoding
//! it; a violation produces [`crate::Error::InvalidState`] carrying
//! both the expected and the actual state, and nothing is written to
//! the transport.

/// Session state of an IMAP connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for credentials.
    #[default]
    NotAuthenticated,
    /// Logged in, no mailbox open.
    Authenticated,
    /// A mailbox is open.
    Selected(SelectedState),
    /// LOGOUT sent or BYE received; no more commands.
    Logout,
}

impl SessionState {
    /// Collapses to the payload-free kind used in error reporting.
    #[must_use]
    pub const fn kind(&self) -> StateKind {
        match self {
            Self::NotAuthenticated => StateKind::NotAuthenticated,
            Self::Authenticated => StateKind::Authenticated,
            Self::Selected(_) => StateKind::Selected,
            Self::Logout => StateKind::Logout,
        }
    }

    /// Returns true if authenticated (or further).
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Selected(_))
    }

    /// Returns the selected mailbox name, if any.
    #[must_use]
    pub fn selected_mailbox(&self) -> Option<&str> {
        match self {
            Self::Selected(state) => Some(&state.mailbox),
            _ => None,
        }
    }
}

/// State information when a mailbox is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedState {
    /// Name of the selected mailbox.
    pub mailbox: String,
    /// Whether the mailbox is read-only (EXAMINE vs SELECT).
    pub read_only: bool,
}

/// Payload-free state discriminant, carried by `InvalidState` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Waiting for credentials.
    NotAuthenticated,
    /// Logged in, no mailbox open.
    Authenticated,
    /// A mailbox is open.
    Selected,
    /// Connection is shutting down.
    Logout,
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotAuthenticated => "NotAuthenticated",
            Self::Authenticated => "Authenticated",
            Self::Selected => "Selected",
            Self::Logout => "Logout",
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
    fn test_default_state() {
        assert_eq!(SessionState::default(), SessionState::NotAuthenticated);
    }

    #[test]
    fn test_is_authenticated() {
        assert!(!SessionState::NotAuthenticated.is_authenticated());
        assert!(SessionState::Authenticated.is_authenticated());
        assert!(
            SessionState::Selected(SelectedState {
                mailbox: "INBOX".to_string(),
                read_only: false,
            })
            .is_authenticated()
        );
        assert!(!SessionState::Logout.is_authenticated());
    }

    #[test]
    fn test_selected_mailbox() {
        assert_eq!(SessionState::Authenticated.selected_mailbox(), None);
        assert_eq!(
            SessionState::Selected(SelectedState {
                mailbox: "Drafts".to_string(),
                read_only: true,
            })
            .selected_mailbox(),
            Some("Drafts")
        );
    }

    #[test]
    fn test_kind() {
        assert_eq!(
            SessionState::NotAuthenticated.kind(),
            StateKind::NotAuthenticated
        );
        assert_eq!(
            SessionState::Selected(SelectedState {
                mailbox: "INBOX".to_string(),
                read_only: false,
            })
            .kind(),
            StateKind::Selected
        );
    }
}
