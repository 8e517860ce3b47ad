//! Incremental POP3 response decoder.
//!
//! Feeds on arbitrary-sized byte chunks and yields complete [`Unit`]s.
//! Partial lines are buffered until their CRLF arrives, so the decoded
//! sequence is identical no matter how the stream is split.
//!
//! Three unit kinds exist on the wire:
//!
//! - status lines: `+OK text` / `-ERR text`
//! - SASL continuations: `+ base64` (RFC 5034)
//! - multiline data after a success status, terminated by a lone `.`,
//!   with leading `..` unstuffed to `.`
//!
//! Whether data follows a `+OK` depends on the command (`RETR`, `TOP`,
//! `LIST` without argument, ...), so the client arms the decoder with
//! [`Pop3Decoder::expect_multiline`] before issuing such a command.
//! An `-ERR` status clears the armed expectation.
//!
//! Lines that are none of the above outside multiline mode are skipped
//! and decoding resumes on the next well-formed line.

/// A decoded protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    /// A `+OK`/`-ERR` status line.
    Status(StatusLine),
    /// A SASL continuation challenge (base64 text after `+ `).
    Continuation(String),
    /// A complete multiline payload, dot-stuffing removed, lines
    /// joined with CRLF (trailing CRLF included).
    Data(Vec<u8>),
}

/// A `+OK`/`-ERR` status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// True for `+OK`.
    pub ok: bool,
    /// Text after the status indicator.
    pub text: String,
}

/// Line-accumulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Status,
    Multiline,
}

/// Incremental decoder for POP3 responses.
pub struct Pop3Decoder {
    buffer: Vec<u8>,
    mode: Mode,
    /// Armed by the client when the next `+OK` introduces data.
    multiline_expected: bool,
    data: Vec<u8>,
}

impl Default for Pop3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Pop3Decoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            mode: Mode::Status,
            multiline_expected: false,
            data: Vec::new(),
        }
    }

    /// Arms the decoder: the next `+OK` begins a multiline reply.
    pub fn expect_multiline(&mut self) {
        self.multiline_expected = true;
    }

    /// Consumes a chunk of received bytes, returning every unit
    /// completed by it.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Unit> {
        self.buffer.extend_from_slice(chunk);

        let mut units = Vec::new();
        while let Some(line) = take_line(&mut self.buffer) {
            if let Some(unit) = self.feed_line(&line) {
                units.push(unit);
            }
        }
        units
    }

    fn feed_line(&mut self, line: &[u8]) -> Option<Unit> {
        match self.mode {
            Mode::Status => self.feed_status_line(line),
            Mode::Multiline => self.feed_data_line(line),
        }
    }

    fn feed_status_line(&mut self, line: &[u8]) -> Option<Unit> {
        if let Some(rest) = strip_keyword(line, b"+OK") {
            if self.multiline_expected {
                self.multiline_expected = false;
                self.mode = Mode::Multiline;
            }
            return Some(Unit::Status(StatusLine {
                ok: true,
                text: rest,
            }));
        }

        if let Some(rest) = strip_keyword(line, b"-ERR") {
            // The command failed, no data will follow.
            self.multiline_expected = false;
            return Some(Unit::Status(StatusLine {
                ok: false,
                text: rest,
            }));
        }

        // RFC 5034 continuation: "+ <base64>" or a bare "+".
        if line == b"+" {
            return Some(Unit::Continuation(String::new()));
        }
        if let Some(rest) = line.strip_prefix(b"+ ") {
            return Some(Unit::Continuation(
                String::from_utf8_lossy(rest).into_owned(),
            ));
        }

        tracing::debug!(
            line = %String::from_utf8_lossy(line),
            "unparsable POP3 line, skipping"
        );
        None
    }

    fn feed_data_line(&mut self, line: &[u8]) -> Option<Unit> {
        if line == b"." {
            self.mode = Mode::Status;
            return Some(Unit::Data(std::mem::take(&mut self.data)));
        }

        // Dot-stuffing removal: a data line starting with '.' carried
        // an extra '.' on the wire.
        let line = if line.first() == Some(&b'.') {
            &line[1..]
        } else {
            line
        };
        self.data.extend_from_slice(line);
        self.data.extend_from_slice(b"\r\n");
        None
    }
}

impl std::fmt::Debug for Pop3Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pop3Decoder")
            .field("buffered", &self.buffer.len())
            .field("mode", &self.mode)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// Removes and returns the next CRLF-terminated line (without the
/// CRLF), or `None` if no complete line is buffered.
fn take_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buffer.windows(2).position(|w| w == b"\r\n")?;
    let mut line: Vec<u8> = buffer.drain(..pos + 2).collect();
    line.truncate(pos);
    Some(line)
}

/// Strips a status keyword plus its optional ` text` remainder.
fn strip_keyword(line: &[u8], keyword: &[u8]) -> Option<String> {
    if !line.starts_with(keyword) {
        return None;
    }
    match line.get(keyword.len()) {
        None => Some(String::new()),
        Some(&b' ') => Some(String::from_utf8_lossy(&line[keyword.len() + 1..]).into_owned()),
        Some(_) => None,
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
    use proptest::prelude::*;

    #[test]
    fn test_ok_status_line() {
        let mut decoder = Pop3Decoder::new();
        let units = decoder.decode(b"+OK POP3 server ready\r\n");
        assert_eq!(
            units,
            vec![Unit::Status(StatusLine {
                ok: true,
                text: "POP3 server ready".to_string(),
            })]
        );
    }

    #[test]
    fn test_err_status_line() {
        let mut decoder = Pop3Decoder::new();
        let units = decoder.decode(b"-ERR no such message\r\n");
        assert_eq!(
            units,
            vec![Unit::Status(StatusLine {
                ok: false,
                text: "no such message".to_string(),
            })]
        );
    }

    #[test]
    fn test_multiline_with_dot_stuffing() {
        let mut decoder = Pop3Decoder::new();
        decoder.expect_multiline();

        let units = decoder.decode(b"+OK 35 octets\r\nSubject: test\r\n..\r\ntest.\r\n.\r\n");
        assert_eq!(units.len(), 2);
        assert!(matches!(&units[0], Unit::Status(s) if s.ok));
        // The stuffed ".." came back as "."; "test." is untouched.
        assert_eq!(units[1], Unit::Data(b"Subject: test\r\n.\r\ntest.\r\n".to_vec()));
    }

    #[test]
    fn test_err_clears_multiline_expectation() {
        let mut decoder = Pop3Decoder::new();
        decoder.expect_multiline();

        let units = decoder.decode(b"-ERR no such message\r\n+OK 2 200\r\n");
        // The later +OK (for an unrelated command) must not open
        // multiline mode.
        assert_eq!(units.len(), 2);
        assert!(matches!(&units[1], Unit::Status(s) if s.ok));
    }

    #[test]
    fn test_sasl_continuation() {
        let mut decoder = Pop3Decoder::new();
        let units = decoder.decode(b"+ dGVzdCBjaGFsbGVuZ2U=\r\n+\r\n");
        assert_eq!(
            units,
            vec![
                Unit::Continuation("dGVzdCBjaGFsbGVuZ2U=".to_string()),
                Unit::Continuation(String::new()),
            ]
        );
    }

    #[test]
    fn test_garbage_line_skipped() {
        let mut decoder = Pop3Decoder::new();
        let units = decoder.decode(b"garbage\r\n+OK still alive\r\n");
        assert_eq!(units.len(), 1);
        assert!(matches!(&units[0], Unit::Status(s) if s.ok));
    }

    #[test]
    fn test_empty_multiline() {
        let mut decoder = Pop3Decoder::new();
        decoder.expect_multiline();
        let units = decoder.decode(b"+OK\r\n.\r\n");
        assert_eq!(units.len(), 2);
        assert_eq!(units[1], Unit::Data(Vec::new()));
    }

    proptest! {
        // Chunk-boundary insensitivity: any split of the stream yields
        // the same unit sequence as feeding it whole.
        #[test]
        fn prop_chunk_insensitive(split in 0usize..64) {
            let stream: &[u8] =
                b"+OK ready\r\n+OK 2 messages\r\nline one\r\n..stuffed\r\n.\r\n-ERR done\r\n";

            let mut whole = Pop3Decoder::new();
            let mut expected = whole.decode(b"+OK greeting\r\n");
            whole.expect_multiline();
            expected.extend(whole.decode(stream));

            let cut = split.min(stream.len());
            let mut pieces = Pop3Decoder::new();
            let mut got = pieces.decode(b"+OK greeting\r\n");
            pieces.expect_multiline();
            got.extend(pieces.decode(&stream[..cut]));
            got.extend(pieces.decode(&stream[cut..]));

            prop_assert_eq!(got, expected);
        }
    }
}
