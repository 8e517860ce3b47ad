//! Result types for POP3 transaction commands.

/// Mailbox summary from `STAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatInfo {
    /// Number of messages in the maildrop.
    pub count: u32,
    /// Total size in octets.
    pub size: u64,
}

/// One scan listing entry from `LIST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry {
    /// Message number.
    pub msg: u32,
    /// Message size in octets.
    pub size: u64,
}

/// One unique-id listing entry from `UIDL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidlEntry {
    /// Message number.
    pub msg: u32,
    /// Server-assigned unique id, stable across sessions.
    pub uid: String,
}

/// Parses a `number number`-shaped line (`STAT` reply, `LIST` entry).
pub(crate) fn parse_number_pair(text: &str) -> Option<(u32, u64)> {
    let mut parts = text.split_whitespace();
    let first = parts.next()?.parse().ok()?;
    let second = parts.next()?.parse().ok()?;
    Some((first, second))
}

/// Parses a `number token` line (`UIDL` entry).
pub(crate) fn parse_uidl_line(text: &str) -> Option<UidlEntry> {
    let mut parts = text.split_whitespace();
    let msg = parts.next()?.parse().ok()?;
    let uid = parts.next()?.to_string();
    Some(UidlEntry { msg, uid })
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
    fn test_parse_number_pair() {
        assert_eq!(parse_number_pair("3 1024"), Some((3, 1024)));
        assert_eq!(parse_number_pair("  7   42  "), Some((7, 42)));
        assert_eq!(parse_number_pair("x 1024"), None);
        assert_eq!(parse_number_pair("3"), None);
    }

    #[test]
    fn test_parse_uidl_line() {
        let entry = parse_uidl_line("1 whqtswO00WBw418f9t5JxYwZ").unwrap();
        assert_eq!(entry.msg, 1);
        assert_eq!(entry.uid, "whqtswO00WBw418f9t5JxYwZ");
        assert!(parse_uidl_line("nope").is_none());
    }
}
