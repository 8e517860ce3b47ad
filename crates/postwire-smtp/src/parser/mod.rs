//! Incremental SMTP reply decoder.
//!
//! Feeds on arbitrary-sized byte chunks and yields complete [`Reply`]
//! values. Partial lines are buffered until their CRLF arrives, so the
//! decoded sequence is identical no matter how the stream is split.
//!
//! Reply grammar (RFC 5321 section 4.2):
//!
//! ```text
//! NNN-text CRLF   continuation line
//! NNN text CRLF   terminal line (completes the reply)
//! ```
//!
//! Robustness rules:
//!
//! - a continuation line whose code differs from the first line's code
//!   is a protocol violation: the accumulated lines are dropped and
//!   decoding resynchronizes on the mismatched line as a fresh reply
//! - a malformed line (shorter than three bytes, non-numeric code)
//!   likewise drops any pending multiline state and is skipped
//!
//! Neither case surfaces an error; the decoder stays live against a
//! misbehaving server.

use crate::types::{Reply, ReplyCode};

/// A reply being accumulated across continuation lines.
struct PendingReply {
    code: u16,
    lines: Vec<String>,
}

/// Incremental decoder for SMTP replies.
#[derive(Default)]
pub struct ReplyDecoder {
    buffer: Vec<u8>,
    pending: Option<PendingReply>,
}

impl ReplyDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk of received bytes, returning every reply
    /// completed by it.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Reply> {
        self.buffer.extend_from_slice(chunk);

        let mut replies = Vec::new();
        while let Some(line) = take_line(&mut self.buffer) {
            if let Some(reply) = self.feed_line(&line) {
                replies.push(reply);
            }
        }
        replies
    }

    /// Returns true if a partial line or unterminated multiline reply
    /// is still buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty() || self.pending.is_some()
    }

    /// Processes one complete line.
    fn feed_line(&mut self, line: &[u8]) -> Option<Reply> {
        let Some((code, separator, text)) = split_reply_line(line) else {
            // Malformed line: drop pending multiline state, skip.
            if self.pending.take().is_some() {
                tracing::debug!(
                    line = %String::from_utf8_lossy(line),
                    "malformed reply line, dropping pending multiline reply"
                );
            }
            return None;
        };

        if let Some(pending) = &self.pending {
            if pending.code != code {
                // Mixed codes: the accumulated reply is garbage.
                // Resynchronize on this line as a fresh reply.
                tracing::warn!(
                    expected = pending.code,
                    got = code,
                    "reply code changed mid-reply, resynchronizing"
                );
                self.pending = None;
            }
        }

        let pending = self.pending.get_or_insert_with(|| PendingReply {
            code,
            lines: Vec::new(),
        });
        pending.lines.push(text);

        if separator == b'-' {
            return None;
        }

        // Terminal line.
        let done = self.pending.take()?;
        Some(Reply::new(ReplyCode::new(done.code), done.lines))
    }
}

impl std::fmt::Debug for ReplyDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyDecoder")
            .field("buffered", &self.buffer.len())
            .field("pending", &self.pending.is_some())
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

/// Splits a reply line into (code, separator, text).
///
/// Returns `None` for lines that do not start with three ASCII digits.
/// A bare `NNN` line is a terminal line with empty text.
fn split_reply_line(line: &[u8]) -> Option<(u16, u8, String)> {
    if line.len() < 3 || !line[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }

    let code = u16::from(line[0] - b'0') * 100
        + u16::from(line[1] - b'0') * 10
        + u16::from(line[2] - b'0');

    let separator = match line.get(3) {
        None => b' ',
        Some(&b' ') => b' ',
        Some(&b'-') => b'-',
        Some(_) => return None,
    };

    let text = if line.len() > 4 {
        String::from_utf8_lossy(&line[4..]).into_owned()
    } else {
        String::new()
    };

    Some((code, separator, text))
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
    fn test_single_line_reply() {
        let mut decoder = ReplyDecoder::new();
        let replies = decoder.decode(b"250 OK\r\n");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].code.as_u16(), 250);
        assert_eq!(replies[0].message, vec!["OK"]);
    }

    #[test]
    fn test_multi_line_reply() {
        let mut decoder = ReplyDecoder::new();
        let replies = decoder.decode(b"250-mail.example.com\r\n250-PIPELINING\r\n250 SIZE\r\n");
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].message,
            vec!["mail.example.com", "PIPELINING", "SIZE"]
        );
    }

    #[test]
    fn test_split_across_chunks() {
        let mut decoder = ReplyDecoder::new();
        assert!(decoder.decode(b"250-PIPELIN").is_empty());
        let replies = decoder.decode(b"ING\r\n250 OK\r\n");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message, vec!["PIPELINING", "OK"]);
    }

    #[test]
    fn test_mixed_code_resynchronizes() {
        let mut decoder = ReplyDecoder::new();
        let replies = decoder.decode(b"250-PIPELINING\r\n251 HELP\r\n");
        // The mismatched continuation is dropped, not merged.
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].code.as_u16(), 251);
        assert_eq!(replies[0].message, vec!["HELP"]);
    }

    #[test]
    fn test_mixed_code_continuation_restarts_reply() {
        let mut decoder = ReplyDecoder::new();
        // 250- then 251- then 251 terminal: the 250 line is discarded,
        // the 251 lines form one reply.
        let replies = decoder.decode(b"250-A\r\n251-B\r\n251 C\r\n");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].code.as_u16(), 251);
        assert_eq!(replies[0].message, vec!["B", "C"]);
    }

    #[test]
    fn test_malformed_line_drops_pending() {
        let mut decoder = ReplyDecoder::new();
        let replies = decoder.decode(b"250-partial\r\nGARBAGE\r\n250 done\r\n");
        // "250-partial" was poisoned by the garbage line; only the last
        // terminal line forms a reply.
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message, vec!["done"]);
    }

    #[test]
    fn test_short_line_skipped() {
        let mut decoder = ReplyDecoder::new();
        assert!(decoder.decode(b"25\r\n").is_empty());
        let replies = decoder.decode(b"250 OK\r\n");
        assert_eq!(replies.len(), 1);
    }

    #[test]
    fn test_bare_code_line() {
        let mut decoder = ReplyDecoder::new();
        let replies = decoder.decode(b"250\r\n");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message, vec![""]);
    }

    #[test]
    fn test_greeting_then_ehlo() {
        let mut decoder = ReplyDecoder::new();
        let replies = decoder.decode(
            b"220 smtp.example.com ESMTP\r\n250-smtp.example.com\r\n250 STARTTLS\r\n",
        );
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].code.as_u16(), 220);
        assert_eq!(replies[1].code.as_u16(), 250);
    }

    proptest! {
        // Chunk-boundary insensitivity: any split of the stream yields
        // the same reply sequence as feeding it whole.
        #[test]
        fn prop_chunk_insensitive(split in 0usize..60) {
            let stream: &[u8] =
                b"220 ready\r\n250-one\r\n250-two\r\n250 three\r\n354 go\r\n";

            let mut whole = ReplyDecoder::new();
            let expected = whole.decode(stream);

            let cut = split.min(stream.len());
            let mut pieces = ReplyDecoder::new();
            let mut got = pieces.decode(&stream[..cut]);
            got.extend(pieces.decode(&stream[cut..]));

            prop_assert_eq!(got, expected);
        }

        #[test]
        fn prop_byte_at_a_time(noise in proptest::collection::vec(0u8..=255, 0..24)) {
            // Random leading noise followed by a valid reply: feeding
            // byte-by-byte must match feeding at once, and the valid
            // reply must still decode.
            let mut stream = noise;
            stream.extend_from_slice(b"\r\n250 OK\r\n");

            let mut whole = ReplyDecoder::new();
            let expected = whole.decode(&stream);

            let mut single = ReplyDecoder::new();
            let mut got = Vec::new();
            for byte in &stream {
                got.extend(single.decode(std::slice::from_ref(byte)));
            }

            prop_assert_eq!(&got, &expected);
            prop_assert!(got.iter().any(|r| r.code.as_u16() == 250));
        }
    }
}
