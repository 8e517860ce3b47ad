//! Core IMAP types.

mod response_code;
mod tag;

pub use response_code::ResponseCode;
pub use tag::{Tag, TagGenerator};

/// Status of a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// OK - success.
    Ok,
    /// NO - operational error.
    No,
    /// BAD - protocol error.
    Bad,
    /// PREAUTH - greeting of an already-authenticated connection.
    PreAuth,
    /// BYE - server is closing the connection.
    Bye,
}

impl Status {
    /// Parses a status word (case-insensitive).
    #[must_use]
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }

    /// Returns true for OK and PREAUTH.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

/// Counters and metadata of the selected mailbox, updated from
/// untagged responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages (EXISTS).
    pub exists: u32,
    /// Number of recent messages (RECENT).
    pub recent: u32,
    /// Defined flags (FLAGS).
    pub flags: Vec<String>,
    /// UIDVALIDITY response code value.
    pub uid_validity: Option<u32>,
    /// UIDNEXT response code value.
    pub uid_next: Option<u32>,
    /// UNSEEN response code value.
    pub unseen: Option<u32>,
    /// Whether the mailbox was opened read-only (EXAMINE or READ-ONLY).
    pub read_only: bool,
}

/// One entry of a LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Name attributes (`\Noselect`, `\HasChildren`, ...).
    pub attributes: Vec<String>,
    /// Hierarchy delimiter, if any.
    pub delimiter: Option<char>,
    /// Mailbox name.
    pub mailbox: String,
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
    fn test_status_parse() {
        assert_eq!(Status::parse("OK"), Some(Status::Ok));
        assert_eq!(Status::parse("no"), Some(Status::No));
        assert_eq!(Status::parse("PREAUTH"), Some(Status::PreAuth));
        assert_eq!(Status::parse("WAT"), None);
    }

    #[test]
    fn test_status_is_ok() {
        assert!(Status::Ok.is_ok());
        assert!(Status::PreAuth.is_ok());
        assert!(!Status::No.is_ok());
        assert!(!Status::Bye.is_ok());
    }
}
