//! Bracketed response codes (`[CAPABILITY ...]`, `[UIDVALIDITY n]`, ...).

/// A response code carried inside `[...]` on a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// `[ALERT]` - message must be shown to the user.
    Alert,
    /// `[CAPABILITY ...]` - capability list piggybacked on a status.
    Capability(Vec<String>),
    /// `[READ-ONLY]`.
    ReadOnly,
    /// `[READ-WRITE]`.
    ReadWrite,
    /// `[UIDVALIDITY n]`.
    UidValidity(u32),
    /// `[UIDNEXT n]`.
    UidNext(u32),
    /// `[UNSEEN n]`.
    Unseen(u32),
    /// `[PERMANENTFLAGS (...)]`.
    PermanentFlags(Vec<String>),
    /// `[TRYCREATE]` - target mailbox does not exist.
    TryCreate,
    /// Any other code, kept verbatim.
    Other(String),
}

impl ResponseCode {
    /// Parses the text between `[` and `]`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut parts = text.splitn(2, ' ');
        let keyword = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();

        match keyword.to_ascii_uppercase().as_str() {
            "ALERT" => Self::Alert,
            "CAPABILITY" => Self::Capability(
                rest.split_whitespace().map(ToString::to_string).collect(),
            ),
            "READ-ONLY" => Self::ReadOnly,
            "READ-WRITE" => Self::ReadWrite,
            "UIDVALIDITY" => rest
                .parse()
                .map_or_else(|_| Self::Other(text.to_string()), Self::UidValidity),
            "UIDNEXT" => rest
                .parse()
                .map_or_else(|_| Self::Other(text.to_string()), Self::UidNext),
            "UNSEEN" => rest
                .parse()
                .map_or_else(|_| Self::Other(text.to_string()), Self::Unseen),
            "PERMANENTFLAGS" => Self::PermanentFlags(
                rest.trim_start_matches('(')
                    .trim_end_matches(')')
                    .split_whitespace()
                    .map(ToString::to_string)
                    .collect(),
            ),
            "TRYCREATE" => Self::TryCreate,
            _ => Self::Other(text.to_string()),
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
    fn test_parse_capability() {
        let code = ResponseCode::parse("CAPABILITY IMAP4rev1 STARTTLS AUTH=PLAIN");
        assert_eq!(
            code,
            ResponseCode::Capability(vec![
                "IMAP4rev1".to_string(),
                "STARTTLS".to_string(),
                "AUTH=PLAIN".to_string(),
            ])
        );
    }

    #[test]
    fn test_parse_numeric_codes() {
        assert_eq!(
            ResponseCode::parse("UIDVALIDITY 3857529045"),
            ResponseCode::UidValidity(3857529045)
        );
        assert_eq!(ResponseCode::parse("UIDNEXT 4392"), ResponseCode::UidNext(4392));
        assert_eq!(ResponseCode::parse("UNSEEN 17"), ResponseCode::Unseen(17));
    }

    #[test]
    fn test_parse_permanent_flags() {
        assert_eq!(
            ResponseCode::parse(r"PERMANENTFLAGS (\Deleted \Seen \*)"),
            ResponseCode::PermanentFlags(vec![
                r"\Deleted".to_string(),
                r"\Seen".to_string(),
                r"\*".to_string(),
            ])
        );
    }

    #[test]
    fn test_parse_unknown_kept_verbatim() {
        assert_eq!(
            ResponseCode::parse("HIGHESTMODSEQ 715194045007"),
            ResponseCode::Other("HIGHESTMODSEQ 715194045007".to_string())
        );
    }

    #[test]
    fn test_parse_malformed_numeric_falls_back() {
        assert_eq!(
            ResponseCode::parse("UIDVALIDITY abc"),
            ResponseCode::Other("UIDVALIDITY abc".to_string())
        );
    }
}
