//! Argument serialization helpers.

/// Writes a string argument as an atom, quoted string, or literal,
/// whichever the content allows.
///
/// Atoms are bare; spaces and special characters force quoting; CR, LF
/// and 8-bit bytes cannot appear inside a quoted string and force a
/// synchronizing literal (`{N}\r\n` followed by the raw bytes).
pub(crate) fn write_string_arg(buf: &mut Vec<u8>, s: &str) {
    if needs_literal(s) {
        buf.extend_from_slice(format!("{{{}}}\r\n", s.len()).as_bytes());
        buf.extend_from_slice(s.as_bytes());
    } else {
        write_astring(buf, s);
    }
}

/// Writes an astring (atom or quoted string).
///
/// The caller must have ruled out content that needs a literal.
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Returns true if the byte forces a quoted string.
const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
}

/// Returns true if the string cannot travel inside a quoted string.
fn needs_literal(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n' || b >= 0x80)
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

    fn render(s: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        write_string_arg(&mut buf, s);
        buf
    }

    #[test]
    fn test_atom_stays_bare() {
        assert_eq!(render("INBOX"), b"INBOX");
    }

    #[test]
    fn test_space_forces_quotes() {
        assert_eq!(render("Sent Items"), b"\"Sent Items\"");
    }

    #[test]
    fn test_empty_is_quoted() {
        assert_eq!(render(""), b"\"\"");
    }

    #[test]
    fn test_quote_and_backslash_escaped() {
        assert_eq!(render(r#"a"b\c"#), b"\"a\\\"b\\\\c\"");
    }

    #[test]
    fn test_eight_bit_forces_literal() {
        assert_eq!(render("Entwürfe"), b"{9}\r\nEntw\xc3\xbcrfe");
    }

    #[test]
    fn test_crlf_forces_literal() {
        assert_eq!(render("a\r\nb"), b"{4}\r\na\r\nb");
    }
}
