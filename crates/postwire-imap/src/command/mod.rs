//! IMAP command builders and serialization.
//!
//! [`Command::serialize`] produces exactly the wire bytes for one
//! command: `<tag> <VERB> <args>\r\n`, with string arguments emitted as
//! atoms, quoted strings, or `{N}`-prefixed literals depending on their
//! content.

mod serialize;

pub use serialize::write_astring;

use serialize::write_string_arg;

use crate::types::Tag;

/// Fetch item selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// `FAST` macro (FLAGS INTERNALDATE RFC822.SIZE).
    Fast,
    /// `ALL` macro.
    All,
    /// `FULL` macro.
    Full,
    /// A verbatim item list, e.g. `(UID BODY.PEEK[])`.
    ///
    /// Message payloads come back as raw bytes for the message layer;
    /// this client does not interpret the attribute grammar.
    Items(String),
}

impl FetchItems {
    fn write(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Fast => buf.extend_from_slice(b"FAST"),
            Self::All => buf.extend_from_slice(b"ALL"),
            Self::Full => buf.extend_from_slice(b"FULL"),
            Self::Items(items) => buf.extend_from_slice(items.as_bytes()),
        }
    }
}

/// Flag update actions for STORE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// `FLAGS (...)` - replace all flags.
    SetFlags(Vec<String>),
    /// `+FLAGS (...)` - add flags.
    AddFlags(Vec<String>),
    /// `-FLAGS (...)` - remove flags.
    RemoveFlags(Vec<String>),
}

impl StoreAction {
    fn write(&self, buf: &mut Vec<u8>) {
        let (prefix, flags) = match self {
            Self::SetFlags(f) => ("FLAGS", f),
            Self::AddFlags(f) => ("+FLAGS", f),
            Self::RemoveFlags(f) => ("-FLAGS", f),
        };
        buf.extend_from_slice(prefix.as_bytes());
        buf.extend_from_slice(b" (");
        for (i, flag) in flags.iter().enumerate() {
            if i > 0 {
                buf.push(b' ');
            }
            buf.extend_from_slice(flag.as_bytes());
        }
        buf.push(b')');
    }
}

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY.
    Capability,
    /// NOOP.
    Noop,
    /// LOGIN with plaintext credentials.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE with a SASL mechanism.
    Authenticate {
        /// Mechanism wire name.
        mechanism: String,
        /// Base64 initial response (SASL-IR), when the mechanism has one.
        initial_response: Option<String>,
    },
    /// STARTTLS.
    StartTls,
    /// SELECT a mailbox read-write.
    Select {
        /// Mailbox name.
        mailbox: String,
    },
    /// EXAMINE a mailbox read-only.
    Examine {
        /// Mailbox name.
        mailbox: String,
    },
    /// LIST mailboxes.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern (`*`, `%`, ...).
        pattern: String,
    },
    /// SEARCH with verbatim criteria.
    Search {
        /// Criteria text, e.g. `UNSEEN SINCE 1-Jan-2026`.
        criteria: String,
    },
    /// FETCH message data.
    Fetch {
        /// Sequence set, e.g. `1:10` or `2,4,7`.
        sequence: String,
        /// Items to fetch.
        items: FetchItems,
    },
    /// STORE flag updates.
    Store {
        /// Sequence set.
        sequence: String,
        /// Flag action.
        action: StoreAction,
    },
    /// EXPUNGE deleted messages.
    Expunge,
    /// CLOSE the selected mailbox (expunging).
    Close,
    /// UNSELECT the selected mailbox (without expunging).
    Unselect,
    /// LOGOUT.
    Logout,
}

impl Command {
    /// Serializes the command under `tag`, CRLF included.
    ///
    /// String arguments that cannot travel as atoms or quoted strings
    /// (8-bit bytes, CR/LF) are emitted as `{N}`-prefixed literals.
    #[must_use]
    pub fn serialize(&self, tag: &Tag) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_str().as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_string_arg(&mut buf, username);
                buf.push(b' ');
                write_string_arg(&mut buf, password);
            }
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                buf.extend_from_slice(mechanism.as_bytes());
                if let Some(resp) = initial_response {
                    buf.push(b' ');
                    // An empty initial response is sent as "=" (RFC 4959).
                    if resp.is_empty() {
                        buf.push(b'=');
                    } else {
                        buf.extend_from_slice(resp.as_bytes());
                    }
                }
            }
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_string_arg(&mut buf, mailbox);
            }
            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_string_arg(&mut buf, mailbox);
            }
            Self::List { reference, pattern } => {
                buf.extend_from_slice(b"LIST ");
                write_string_arg(&mut buf, reference);
                buf.push(b' ');
                write_string_arg(&mut buf, pattern);
            }
            Self::Search { criteria } => {
                buf.extend_from_slice(b"SEARCH ");
                buf.extend_from_slice(criteria.as_bytes());
            }
            Self::Fetch { sequence, items } => {
                buf.extend_from_slice(b"FETCH ");
                buf.extend_from_slice(sequence.as_bytes());
                buf.push(b' ');
                items.write(&mut buf);
            }
            Self::Store { sequence, action } => {
                buf.extend_from_slice(b"STORE ");
                buf.extend_from_slice(sequence.as_bytes());
                buf.push(b' ');
                action.write(&mut buf);
            }
            Self::Expunge => buf.extend_from_slice(b"EXPUNGE"),
            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Unselect => buf.extend_from_slice(b"UNSELECT"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
        }

        buf.extend_from_slice(b"\r\n");
        buf
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

    fn tag() -> Tag {
        Tag::new("A0001")
    }

    #[test]
    fn test_serialize_simple() {
        assert_eq!(Command::Noop.serialize(&tag()), b"A0001 NOOP\r\n");
        assert_eq!(Command::Capability.serialize(&tag()), b"A0001 CAPABILITY\r\n");
    }

    #[test]
    fn test_serialize_login_atoms() {
        let cmd = Command::Login {
            username: "joe".to_string(),
            password: "hunter2".to_string(),
        };
        assert_eq!(cmd.serialize(&tag()), b"A0001 LOGIN joe hunter2\r\n");
    }

    #[test]
    fn test_serialize_login_quoted() {
        let cmd = Command::Login {
            username: "joe@example.com".to_string(),
            password: "pass word".to_string(),
        };
        assert_eq!(
            cmd.serialize(&tag()),
            b"A0001 LOGIN joe@example.com \"pass word\"\r\n"
        );
    }

    #[test]
    fn test_serialize_login_literal_password() {
        // CRLF in an argument forces a literal.
        let cmd = Command::Login {
            username: "joe".to_string(),
            password: "pa\r\nss".to_string(),
        };
        assert_eq!(cmd.serialize(&tag()), b"A0001 LOGIN joe {6}\r\npa\r\nss\r\n");
    }

    #[test]
    fn test_serialize_select_quoted_mailbox() {
        let cmd = Command::Select {
            mailbox: "Sent Items".to_string(),
        };
        assert_eq!(cmd.serialize(&tag()), b"A0001 SELECT \"Sent Items\"\r\n");
    }

    #[test]
    fn test_serialize_authenticate_with_initial_response() {
        let cmd = Command::Authenticate {
            mechanism: "PLAIN".to_string(),
            initial_response: Some("AGpvZQBodW50ZXIy".to_string()),
        };
        assert_eq!(
            cmd.serialize(&tag()),
            b"A0001 AUTHENTICATE PLAIN AGpvZQBodW50ZXIy\r\n"
        );
    }

    #[test]
    fn test_serialize_fetch() {
        let cmd = Command::Fetch {
            sequence: "1:10".to_string(),
            items: FetchItems::Fast,
        };
        assert_eq!(cmd.serialize(&tag()), b"A0001 FETCH 1:10 FAST\r\n");

        let cmd = Command::Fetch {
            sequence: "7".to_string(),
            items: FetchItems::Items("(UID BODY.PEEK[])".to_string()),
        };
        assert_eq!(cmd.serialize(&tag()), b"A0001 FETCH 7 (UID BODY.PEEK[])\r\n");
    }

    #[test]
    fn test_serialize_store() {
        let cmd = Command::Store {
            sequence: "3".to_string(),
            action: StoreAction::AddFlags(vec![r"\Seen".to_string(), r"\Flagged".to_string()]),
        };
        assert_eq!(
            cmd.serialize(&tag()),
            b"A0001 STORE 3 +FLAGS (\\Seen \\Flagged)\r\n"
        );
    }
}
