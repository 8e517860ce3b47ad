//! SMTP command builder.

use crate::types::Address;

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin SASL authentication
    Auth {
        /// Mechanism wire name
        mechanism: String,
        /// Base64 initial response (SASL-IR), when the mechanism has one
        initial_response: Option<String>,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
        /// BODY parameter (7BIT, 8BITMIME)
        body: Option<String>,
        /// SIZE parameter
        size: Option<usize>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to wire bytes, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Helo { hostname } => {
                buf.extend_from_slice(b"HELO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::Ehlo { hostname } => {
                buf.extend_from_slice(b"EHLO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::StartTls => {
                buf.extend_from_slice(b"STARTTLS");
            }
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTH ");
                buf.extend_from_slice(mechanism.as_bytes());
                if let Some(resp) = initial_response {
                    buf.push(b' ');
                    // An empty initial response is sent as "=" per RFC 4954.
                    if resp.is_empty() {
                        buf.push(b'=');
                    } else {
                        buf.extend_from_slice(resp.as_bytes());
                    }
                }
            }
            Self::MailFrom { from, body, size } => {
                buf.extend_from_slice(b"MAIL FROM:<");
                buf.extend_from_slice(from.as_str().as_bytes());
                buf.push(b'>');
                if let Some(body_type) = body {
                    buf.extend_from_slice(b" BODY=");
                    buf.extend_from_slice(body_type.as_bytes());
                }
                if let Some(msg_size) = size {
                    buf.extend_from_slice(format!(" SIZE={msg_size}").as_bytes());
                }
            }
            Self::RcptTo { to } => {
                buf.extend_from_slice(b"RCPT TO:<");
                buf.extend_from_slice(to.as_str().as_bytes());
                buf.push(b'>');
            }
            Self::Data => buf.extend_from_slice(b"DATA"),
            Self::Rset => buf.extend_from_slice(b"RSET"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Quit => buf.extend_from_slice(b"QUIT"),
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

    #[test]
    fn test_serialize_ehlo() {
        let cmd = Command::Ehlo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"EHLO client.example.com\r\n");
    }

    #[test]
    fn test_serialize_mail_from_with_params() {
        let cmd = Command::MailFrom {
            from: Address::new("a@b.com").unwrap(),
            body: Some("8BITMIME".to_string()),
            size: Some(1024),
        };
        assert_eq!(
            cmd.serialize(),
            b"MAIL FROM:<a@b.com> BODY=8BITMIME SIZE=1024\r\n"
        );
    }

    #[test]
    fn test_serialize_auth_with_initial_response() {
        let cmd = Command::Auth {
            mechanism: "PLAIN".to_string(),
            initial_response: Some("AGpvZQBodW50ZXIy".to_string()),
        };
        assert_eq!(cmd.serialize(), b"AUTH PLAIN AGpvZQBodW50ZXIy\r\n");
    }

    #[test]
    fn test_serialize_auth_bare() {
        let cmd = Command::Auth {
            mechanism: "CRAM-MD5".to_string(),
            initial_response: None,
        };
        assert_eq!(cmd.serialize(), b"AUTH CRAM-MD5\r\n");
    }

    #[test]
    fn test_serialize_auth_empty_initial_response() {
        let cmd = Command::Auth {
            mechanism: "SOME-MECH".to_string(),
            initial_response: Some(String::new()),
        };
        assert_eq!(cmd.serialize(), b"AUTH SOME-MECH =\r\n");
    }

    #[test]
    fn test_serialize_bare_commands() {
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
    }
}
