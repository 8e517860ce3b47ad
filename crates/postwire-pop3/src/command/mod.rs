//! POP3 command builder.

/// POP3 command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// USER - supply the mailbox name
    User {
        /// Mailbox name.
        name: String,
    },
    /// PASS - supply the password
    Pass {
        /// Password.
        password: String,
    },
    /// APOP - digest authentication from the banner timestamp
    Apop {
        /// Mailbox name.
        name: String,
        /// Hex MD5 digest of `timestamp + password`.
        digest: String,
    },
    /// AUTH - begin SASL authentication (RFC 5034)
    Auth {
        /// Mechanism wire name.
        mechanism: String,
        /// Base64 initial response, when the mechanism has one.
        initial_response: Option<String>,
    },
    /// CAPA - capability discovery
    Capa,
    /// STLS - upgrade to TLS
    Stls,
    /// STAT - maildrop summary
    Stat,
    /// LIST - scan listing (all messages or one)
    List {
        /// Specific message, or `None` for the whole maildrop.
        msg: Option<u32>,
    },
    /// UIDL - unique-id listing (all messages or one)
    Uidl {
        /// Specific message, or `None` for the whole maildrop.
        msg: Option<u32>,
    },
    /// RETR - retrieve a message
    Retr {
        /// Message number.
        msg: u32,
    },
    /// TOP - retrieve headers plus the first n body lines
    Top {
        /// Message number.
        msg: u32,
        /// Number of body lines.
        lines: u32,
    },
    /// DELE - mark a message deleted
    Dele {
        /// Message number.
        msg: u32,
    },
    /// RSET - unmark deleted messages
    Rset,
    /// NOOP - no operation
    Noop,
    /// QUIT - commit deletions and close
    Quit,
}

impl Command {
    /// Serializes the command to wire bytes, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::User { name } => format!("USER {name}"),
            Self::Pass { password } => format!("PASS {password}"),
            Self::Apop { name, digest } => format!("APOP {name} {digest}"),
            Self::Auth {
                mechanism,
                initial_response,
            } => match initial_response {
                Some(resp) if resp.is_empty() => format!("AUTH {mechanism} ="),
                Some(resp) => format!("AUTH {mechanism} {resp}"),
                None => format!("AUTH {mechanism}"),
            },
            Self::Capa => "CAPA".to_string(),
            Self::Stls => "STLS".to_string(),
            Self::Stat => "STAT".to_string(),
            Self::List { msg: Some(n) } => format!("LIST {n}"),
            Self::List { msg: None } => "LIST".to_string(),
            Self::Uidl { msg: Some(n) } => format!("UIDL {n}"),
            Self::Uidl { msg: None } => "UIDL".to_string(),
            Self::Retr { msg } => format!("RETR {msg}"),
            Self::Top { msg, lines } => format!("TOP {msg} {lines}"),
            Self::Dele { msg } => format!("DELE {msg}"),
            Self::Rset => "RSET".to_string(),
            Self::Noop => "NOOP".to_string(),
            Self::Quit => "QUIT".to_string(),
        };

        let mut buf = line.into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns true if a success reply to this command is followed by
    /// multiline data.
    #[must_use]
    pub const fn expects_multiline(&self) -> bool {
        matches!(
            self,
            Self::Capa
                | Self::List { msg: None }
                | Self::Uidl { msg: None }
                | Self::Retr { .. }
                | Self::Top { .. }
        )
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
    fn test_serialize_credentials() {
        assert_eq!(
            Command::User {
                name: "joe".to_string()
            }
            .serialize(),
            b"USER joe\r\n"
        );
        assert_eq!(
            Command::Pass {
                password: "secret".to_string()
            }
            .serialize(),
            b"PASS secret\r\n"
        );
    }

    #[test]
    fn test_serialize_list_variants() {
        assert_eq!(Command::List { msg: None }.serialize(), b"LIST\r\n");
        assert_eq!(Command::List { msg: Some(3) }.serialize(), b"LIST 3\r\n");
    }

    #[test]
    fn test_serialize_top() {
        assert_eq!(
            Command::Top { msg: 2, lines: 10 }.serialize(),
            b"TOP 2 10\r\n"
        );
    }

    #[test]
    fn test_serialize_auth() {
        let cmd = Command::Auth {
            mechanism: "SCRAM-SHA-256".to_string(),
            initial_response: Some("biwsbg==".to_string()),
        };
        assert_eq!(cmd.serialize(), b"AUTH SCRAM-SHA-256 biwsbg==\r\n");
    }

    #[test]
    fn test_expects_multiline() {
        assert!(Command::Retr { msg: 1 }.expects_multiline());
        assert!(Command::List { msg: None }.expects_multiline());
        assert!(Command::Capa.expects_multiline());
        assert!(!Command::List { msg: Some(1) }.expects_multiline());
        assert!(!Command::Stat.expects_multiline());
        assert!(!Command::Dele { msg: 1 }.expects_multiline());
    }
}
