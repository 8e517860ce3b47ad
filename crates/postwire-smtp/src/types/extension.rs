//! SMTP extension types.

/// SMTP extensions discovered from EHLO response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS - TLS upgrade
    StartTls,
    /// AUTH - advertised SASL mechanism names, verbatim.
    ///
    /// Kept as raw strings: mechanism selection (including rejecting
    /// names this client cannot drive) belongs to `postwire-sasl`.
    Auth(Vec<String>),
    /// SIZE - Maximum message size
    Size(Option<usize>),
    /// 8BITMIME - 8-bit MIME transport
    EightBitMime,
    /// PIPELINING - Command pipelining
    Pipelining,
    /// SMTPUTF8 - UTF-8 email addresses
    SmtpUtf8,
    /// DSN - Delivery status notifications
    Dsn,
    /// ENHANCEDSTATUSCODES - RFC 2034 status codes in replies
    EnhancedStatusCodes,
    /// Unknown extension
    Unknown(String),
}

impl Extension {
    /// Parses an extension line from an EHLO response.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(keyword) = parts.first() else {
            return Self::Unknown(line.to_string());
        };

        match keyword.to_uppercase().as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(parts[1..].iter().map(ToString::to_string).collect()),
            "SIZE" => Self::Size(parts.get(1).and_then(|s| s.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            "SMTPUTF8" => Self::SmtpUtf8,
            "DSN" => Self::Dsn,
            "ENHANCEDSTATUSCODES" => Self::EnhancedStatusCodes,
            _ => Self::Unknown(line.to_string()),
        }
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
    fn test_parse_starttls() {
        assert_eq!(Extension::parse("STARTTLS"), Extension::StartTls);
        assert_eq!(Extension::parse("starttls"), Extension::StartTls);
    }

    #[test]
    fn test_parse_auth_keeps_raw_names() {
        let ext = Extension::parse("AUTH PLAIN LOGIN SCRAM-SHA-256 GSSAPI");
        assert_eq!(
            ext,
            Extension::Auth(vec![
                "PLAIN".to_string(),
                "LOGIN".to_string(),
                "SCRAM-SHA-256".to_string(),
                "GSSAPI".to_string(),
            ])
        );
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(Extension::parse("SIZE 35882577"), Extension::Size(Some(35882577)));
        assert_eq!(Extension::parse("SIZE"), Extension::Size(None));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            Extension::parse("X-CUSTOM thing"),
            Extension::Unknown("X-CUSTOM thing".to_string())
        );
    }
}
