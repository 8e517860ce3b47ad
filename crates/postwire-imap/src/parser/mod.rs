//! Parsing of decoded response units.
//!
//! A unit arrives from the frame decoder as one complete logical
//! response: a CRLF-terminated line plus any embedded literals. This
//! module classifies it as tagged, untagged, or continuation and
//! extracts the pieces the session engine needs. Message payloads
//! (FETCH) are deliberately kept as raw bytes for the message layer.

use crate::error::{Error, Result};
use crate::types::{ListEntry, ResponseCode, Status, Tag};

/// A parsed response unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `<tag> OK/NO/BAD ...` - completes a command.
    Tagged {
        /// The echoed command tag.
        tag: Tag,
        /// Completion status.
        status: Status,
        /// Optional bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* ...` - server data or status not tied to one command.
    Untagged(UntaggedResponse),
    /// `+ ...` - the server awaits more client data (SASL, literals).
    Continuation {
        /// Text after `+ ` (a base64 challenge during SASL).
        text: String,
    },
}

/// An untagged (`* ...`) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK/NO/BAD/BYE/PREAUTH [code] text`.
    Condition {
        /// Status word.
        status: Status,
        /// Optional bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`.
    Capability(Vec<String>),
    /// `* <n> EXISTS`.
    Exists(u32),
    /// `* <n> RECENT`.
    Recent(u32),
    /// `* <n> EXPUNGE`.
    Expunge(u32),
    /// `* FLAGS (...)`.
    Flags(Vec<String>),
    /// `* SEARCH n n n ...`.
    Search(Vec<u32>),
    /// `* LIST (attrs) delim name`.
    List(ListEntry),
    /// `* <n> FETCH ...` - raw unit bytes, literals included.
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// The complete unit, for the message layer.
        raw: Vec<u8>,
    },
    /// Anything else, kept verbatim.
    Other(Vec<u8>),
}

/// Parser for complete response units.
#[derive(Debug, Clone, Copy)]
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one complete unit.
    ///
    /// # Errors
    ///
    /// Returns a `Parse` error when the unit has no recognizable shape
    /// (no tag, no `*`/`+` marker). Callers treat that as a skippable
    /// malformed frame.
    pub fn parse(unit: &[u8]) -> Result<Response> {
        let line = strip_crlf(unit);

        if line == b"+" {
            return Ok(Response::Continuation {
                text: String::new(),
            });
        }
        if let Some(rest) = line.strip_prefix(b"+ ") {
            return Ok(Response::Continuation {
                text: String::from_utf8_lossy(rest).into_owned(),
            });
        }
        if let Some(rest) = line.strip_prefix(b"* ") {
            return Ok(Response::Untagged(parse_untagged(rest, unit)));
        }

        parse_tagged(line)
    }
}

/// Strips one trailing CRLF.
fn strip_crlf(unit: &[u8]) -> &[u8] {
    unit.strip_suffix(b"\r\n").unwrap_or(unit)
}

fn parse_tagged(line: &[u8]) -> Result<Response> {
    let text = String::from_utf8_lossy(line);
    let mut parts = text.splitn(3, ' ');

    let tag = parts.next().filter(|t| !t.is_empty()).ok_or_else(|| Error::Parse {
        position: 0,
        message: "empty response line".to_string(),
    })?;
    let status = parts
        .next()
        .and_then(Status::parse)
        .ok_or_else(|| Error::Parse {
            position: tag.len(),
            message: "missing status word".to_string(),
        })?;

    let (code, text) = split_code_and_text(parts.next().unwrap_or_default());
    Ok(Response::Tagged {
        tag: Tag::new(tag),
        status,
        code,
        text,
    })
}

fn parse_untagged(rest: &[u8], full_unit: &[u8]) -> UntaggedResponse {
    let text = String::from_utf8_lossy(strip_crlf(rest)).into_owned();
    let mut parts = text.splitn(2, ' ');
    let first = parts.next().unwrap_or_default();
    let remainder = parts.next().unwrap_or_default();

    // Numeric-first responses: EXISTS / RECENT / EXPUNGE / FETCH.
    if let Ok(number) = first.parse::<u32>() {
        let mut words = remainder.splitn(2, ' ');
        let keyword = words.next().unwrap_or_default().to_ascii_uppercase();
        return match keyword.as_str() {
            "EXISTS" => UntaggedResponse::Exists(number),
            "RECENT" => UntaggedResponse::Recent(number),
            "EXPUNGE" => UntaggedResponse::Expunge(number),
            "FETCH" => UntaggedResponse::Fetch {
                seq: number,
                raw: full_unit.to_vec(),
            },
            _ => UntaggedResponse::Other(full_unit.to_vec()),
        };
    }

    if let Some(status) = Status::parse(first) {
        let (code, text) = split_code_and_text(remainder);
        return UntaggedResponse::Condition { status, code, text };
    }

    match first.to_ascii_uppercase().as_str() {
        "CAPABILITY" => UntaggedResponse::Capability(
            remainder.split_whitespace().map(ToString::to_string).collect(),
        ),
        "FLAGS" => UntaggedResponse::Flags(parse_paren_list(remainder)),
        "SEARCH" => UntaggedResponse::Search(
            remainder
                .split_whitespace()
                .filter_map(|n| n.parse().ok())
                .collect(),
        ),
        "LIST" => parse_list(remainder, full_unit),
        _ => UntaggedResponse::Other(full_unit.to_vec()),
    }
}

/// Splits `[code] text` into its parts.
fn split_code_and_text(rest: &str) -> (Option<ResponseCode>, String) {
    if let Some(inner) = rest.strip_prefix('[') {
        if let Some(end) = inner.find(']') {
            let code = ResponseCode::parse(&inner[..end]);
            let text = inner[end + 1..].trim_start().to_string();
            return (Some(code), text);
        }
    }
    (None, rest.to_string())
}

/// Parses a `(a b c)` word list.
fn parse_paren_list(rest: &str) -> Vec<String> {
    rest.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split_whitespace()
        .map(ToString::to_string)
        .collect()
}

/// Parses `* LIST (attrs) delim name`.
///
/// The name may be an atom, a quoted string, or a literal; a literal
/// name spans into the unit's literal bytes.
fn parse_list(rest: &str, full_unit: &[u8]) -> UntaggedResponse {
    let Some(close) = rest.find(')') else {
        return UntaggedResponse::Other(full_unit.to_vec());
    };
    let attributes = parse_paren_list(&rest[..=close]);

    let after = rest[close + 1..].trim_start();
    let (delimiter, after) = if let Some(stripped) = after.strip_prefix("NIL") {
        (None, stripped.trim_start())
    } else if let Some(stripped) = after.strip_prefix('"') {
        let mut chars = stripped.chars();
        let delim = chars.next();
        // Skip the delimiter char and its closing quote.
        let rest = chars.as_str().strip_prefix('"').unwrap_or(chars.as_str());
        (delim, rest.trim_start())
    } else {
        (None, after)
    };

    let mailbox = if let Some(quoted) = after.strip_prefix('"') {
        quoted
            .strip_suffix('"')
            .unwrap_or(quoted)
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
    } else if after.starts_with('{') {
        // Literal name: the bytes after the first CRLF of the unit.
        let Some(pos) = full_unit.windows(2).position(|w| w == b"\r\n") else {
            return UntaggedResponse::Other(full_unit.to_vec());
        };
        String::from_utf8_lossy(strip_crlf(&full_unit[pos + 2..])).into_owned()
    } else {
        after.to_string()
    };

    UntaggedResponse::List(ListEntry {
        attributes,
        delimiter,
        mailbox,
    })
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
    fn test_parse_tagged_ok() {
        let response = ResponseParser::parse(b"A0001 OK LOGIN completed\r\n").unwrap();
        assert_eq!(
            response,
            Response::Tagged {
                tag: Tag::new("A0001"),
                status: Status::Ok,
                code: None,
                text: "LOGIN completed".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_tagged_no_with_code() {
        let response =
            ResponseParser::parse(b"A0002 NO [TRYCREATE] mailbox does not exist\r\n").unwrap();
        assert_eq!(
            response,
            Response::Tagged {
                tag: Tag::new("A0002"),
                status: Status::No,
                code: Some(ResponseCode::TryCreate),
                text: "mailbox does not exist".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_greeting_with_capabilities() {
        let response =
            ResponseParser::parse(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Condition {
                status,
                code: Some(ResponseCode::Capability(caps)),
                ..
            }) => {
                assert_eq!(status, Status::Ok);
                assert_eq!(caps, vec!["IMAP4rev1", "AUTH=PLAIN"]);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_continuation() {
        assert_eq!(
            ResponseParser::parse(b"+ cj1yT3By\r\n").unwrap(),
            Response::Continuation {
                text: "cj1yT3By".to_string()
            }
        );
        assert_eq!(
            ResponseParser::parse(b"+\r\n").unwrap(),
            Response::Continuation {
                text: String::new()
            }
        );
    }

    #[test]
    fn test_parse_numeric_untagged() {
        assert_eq!(
            ResponseParser::parse(b"* 23 EXISTS\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Exists(23))
        );
        assert_eq!(
            ResponseParser::parse(b"* 5 RECENT\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Recent(5))
        );
        assert_eq!(
            ResponseParser::parse(b"* 44 EXPUNGE\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Expunge(44))
        );
    }

    #[test]
    fn test_parse_fetch_keeps_raw_unit() {
        let unit = b"* 12 FETCH (BODY[] {5}\r\nhello)\r\n";
        match ResponseParser::parse(unit).unwrap() {
            Response::Untagged(UntaggedResponse::Fetch { seq, raw }) => {
                assert_eq!(seq, 12);
                assert_eq!(raw, unit.to_vec());
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_search() {
        assert_eq!(
            ResponseParser::parse(b"* SEARCH 2 84 882\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Search(vec![2, 84, 882]))
        );
        assert_eq!(
            ResponseParser::parse(b"* SEARCH\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Search(vec![]))
        );
    }

    #[test]
    fn test_parse_flags() {
        assert_eq!(
            ResponseParser::parse(b"* FLAGS (\\Answered \\Seen)\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Flags(vec![
                r"\Answered".to_string(),
                r"\Seen".to_string(),
            ]))
        );
    }

    #[test]
    fn test_parse_list_quoted() {
        let response =
            ResponseParser::parse(b"* LIST (\\HasNoChildren) \"/\" \"Sent Items\"\r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::List(ListEntry {
                attributes: vec![r"\HasNoChildren".to_string()],
                delimiter: Some('/'),
                mailbox: "Sent Items".to_string(),
            }))
        );
    }

    #[test]
    fn test_parse_list_nil_delimiter() {
        let response = ResponseParser::parse(b"* LIST (\\Noselect) NIL INBOX\r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::List(ListEntry {
                attributes: vec![r"\Noselect".to_string()],
                delimiter: None,
                mailbox: "INBOX".to_string(),
            }))
        );
    }

    #[test]
    fn test_parse_list_literal_name() {
        let unit = b"* LIST () \"/\" {9}\r\nEntw\xc3\xbcrfe\r\n";
        match ResponseParser::parse(unit).unwrap() {
            Response::Untagged(UntaggedResponse::List(entry)) => {
                assert_eq!(entry.mailbox, "Entwürfe");
                assert_eq!(entry.delimiter, Some('/'));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(ResponseParser::parse(b"\r\n").is_err());
        assert!(ResponseParser::parse(b"nonsense\r\n").is_err());
    }

    #[test]
    fn test_unknown_untagged_kept_verbatim() {
        let unit = b"* STATUS INBOX (MESSAGES 231)\r\n";
        assert_eq!(
            ResponseParser::parse(unit).unwrap(),
            Response::Untagged(UntaggedResponse::Other(unit.to_vec()))
        );
    }
}
