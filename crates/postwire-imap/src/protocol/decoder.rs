//! Incremental IMAP frame decoder.
//!
//! Converts the raw byte stream into complete logical response units.
//! A unit is a CRLF-terminated line, except that a `{N}` (or `{N+}`)
//! token at end-of-line introduces exactly N raw literal bytes — which
//! may contain CRLFs — after which line parsing resumes until a line
//! without a trailing literal ends the unit.
//!
//! Partial input is buffered internally, so the decoded unit sequence
//! is identical no matter how the stream is split into chunks.

use bytes::BytesMut;

use crate::error::{Error, Result};

/// Maximum line length, to bound memory against a hostile server.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size, to bound memory against a hostile server.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Incremental decoder for IMAP response units.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk of received bytes, returning every unit
    /// completed by it. Each unit includes its final CRLF and any
    /// embedded literal bytes.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error when a line or literal exceeds the
    /// size caps; this is a memory guard, not a recoverable condition.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.buffer.extend_from_slice(chunk);

        let mut units = Vec::new();
        while let Some(len) = find_complete_unit(&self.buffer)? {
            units.push(self.buffer.split_to(len).to_vec());
        }
        Ok(units)
    }

    /// Returns true if partial data is still buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

/// Finds the length of the first complete unit in `buf`, if any.
fn find_complete_unit(buf: &[u8]) -> Result<Option<usize>> {
    let mut pos = 0;

    loop {
        let Some(crlf) = find_crlf(&buf[pos..]) else {
            if buf.len() - pos > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
            return Ok(None);
        };
        let line_end = pos + crlf + 2;

        match parse_literal_length(&buf[pos..line_end]) {
            Some(len) => {
                if len > MAX_LITERAL_SIZE {
                    return Err(Error::Protocol(format!(
                        "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                    )));
                }
                let literal_end = line_end + len;
                if buf.len() < literal_end {
                    return Ok(None);
                }
                // The unit continues with the line after the literal.
                pos = literal_end;
            }
            None => return Ok(Some(line_end)),
        }
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line.
///
/// Matches `{123}\r\n` and the non-synchronizing form `{123+}\r\n`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    if !line.ends_with(b"\r\n") {
        return None;
    }

    let line = &line[..line.len() - 2];
    let open = line.iter().rposition(|&b| b == b'{')?;
    if !line.ends_with(b"}") {
        return None;
    }

    let num_end = if line.ends_with(b"+}") {
        line.len() - 2
    } else {
        line.len() - 1
    };

    let num_str = std::str::from_utf8(&line[open + 1..num_end]).ok()?;
    num_str.parse().ok()
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
    use proptest::prelude::*;

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"BODY {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"BODY {123+}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"no literal\r\n"), None);
        assert_eq!(parse_literal_length(b"incomplete {123"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}\r\n"), None);
    }

    #[test]
    fn test_simple_line() {
        let mut decoder = FrameDecoder::new();
        let units = decoder.decode(b"* OK ready\r\n").unwrap();
        assert_eq!(units, vec![b"* OK ready\r\n".to_vec()]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_partial_line_buffers() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode(b"* OK rea").unwrap().is_empty());
        assert!(decoder.has_partial());
        let units = decoder.decode(b"dy\r\n").unwrap();
        assert_eq!(units, vec![b"* OK ready\r\n".to_vec()]);
    }

    #[test]
    fn test_literal_with_embedded_crlf() {
        let mut decoder = FrameDecoder::new();
        let units = decoder
            .decode(b"* 1 FETCH (BODY[] {12}\r\nline1\r\nline2)\r\n")
            .unwrap();
        assert_eq!(
            units,
            vec![b"* 1 FETCH (BODY[] {12}\r\nline1\r\nline2)\r\n".to_vec()]
        );
    }

    #[test]
    fn test_literal_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode(b"* 1 FETCH (BODY {5}\r\nhel").unwrap().is_empty());
        let units = decoder.decode(b"lo)\r\n").unwrap();
        assert_eq!(units, vec![b"* 1 FETCH (BODY {5}\r\nhello)\r\n".to_vec()]);
    }

    #[test]
    fn test_two_literals_in_one_unit() {
        let mut decoder = FrameDecoder::new();
        let wire = b"* 2 FETCH (A {3}\r\nabc B {2}\r\nxy)\r\n";
        let units = decoder.decode(wire).unwrap();
        assert_eq!(units, vec![wire.to_vec()]);
    }

    #[test]
    fn test_multiple_units_in_one_chunk() {
        let mut decoder = FrameDecoder::new();
        let units = decoder
            .decode(b"* 3 EXISTS\r\n* 0 RECENT\r\nA0002 OK done\r\n")
            .unwrap();
        assert_eq!(units.len(), 3);
        assert_eq!(units[2], b"A0002 OK done\r\n");
    }

    #[test]
    fn test_oversized_literal_rejected() {
        let mut decoder = FrameDecoder::new();
        let header = format!("* 1 FETCH (BODY {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let result = decoder.decode(header.as_bytes());
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_overlong_line_rejected() {
        let mut decoder = FrameDecoder::new();
        let long = vec![b'A'; MAX_LINE_LENGTH + 100];
        let result = decoder.decode(&long);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    proptest! {
        // Chunk-boundary insensitivity: any split of the stream yields
        // the same unit sequence as feeding it whole, literals included.
        #[test]
        fn prop_chunk_insensitive(split in 0usize..72) {
            let stream: &[u8] =
                b"* OK ready\r\n* 1 FETCH (BODY {6}\r\nab\r\ncd)\r\nA0001 OK done\r\n";

            let mut whole = FrameDecoder::new();
            let expected = whole.decode(stream).unwrap();
            prop_assert_eq!(expected.len(), 3);

            let cut = split.min(stream.len());
            let mut pieces = FrameDecoder::new();
            let mut got = pieces.decode(&stream[..cut]).unwrap();
            got.extend(pieces.decode(&stream[cut..]).unwrap());

            prop_assert_eq!(got, expected);
        }

        #[test]
        fn prop_byte_at_a_time(extra in proptest::collection::vec(b'a'..=b'z', 0..12)) {
            // A literal whose bytes come from the generator, fed one
            // byte at a time, reassembles into the same single unit.
            let mut stream = format!("* 1 FETCH (X {{{}}}\r\n", extra.len()).into_bytes();
            stream.extend_from_slice(&extra);
            stream.extend_from_slice(b")\r\n");

            let mut whole = FrameDecoder::new();
            let expected = whole.decode(&stream).unwrap();

            let mut single = FrameDecoder::new();
            let mut got = Vec::new();
            for byte in &stream {
                got.extend(single.decode(std::slice::from_ref(byte)).unwrap());
            }

            prop_assert_eq!(got, expected);
        }
    }
}
