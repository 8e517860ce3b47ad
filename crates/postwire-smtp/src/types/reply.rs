//! SMTP reply types.

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply message lines (code and separator stripped).
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns true if this is an intermediate reply (3xx) — DATA go-ahead
    /// or SASL continuation.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code.is_intermediate()
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient_error(&self) -> bool {
        self.code.is_transient()
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code.is_permanent()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Extracts the enhanced status code (RFC 3463) when the first line
    /// leads with a `D.D.D` token.
    #[must_use]
    pub fn enhanced_status(&self) -> Option<EnhancedStatusCode> {
        let first = self.message.first()?;
        let token = first.split_whitespace().next()?;
        EnhancedStatusCode::parse(token)
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Common reply codes
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication successful
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 421 Service not available, closing transmission channel
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 500 Syntax error, command unrecognized
    pub const SYNTAX_ERROR: Self = Self(500);
    /// 503 Bad sequence of commands
    pub const BAD_SEQUENCE: Self = Self(503);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 Mailbox unavailable (not found, access denied)
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
    /// 554 Transaction failed
    pub const TRANSACTION_FAILED: Self = Self(554);
}

/// Enhanced mail system status code (RFC 3463), `class.subject.detail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhancedStatusCode {
    /// Class: 2 (success), 4 (transient failure), 5 (permanent failure).
    pub class: u8,
    /// Subject sub-code.
    pub subject: u16,
    /// Detail sub-code.
    pub detail: u16,
}

impl EnhancedStatusCode {
    /// Parses a `D.D.D` token.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let mut parts = token.splitn(3, '.');
        let class: u8 = parts.next()?.parse().ok()?;
        if !matches!(class, 2 | 4 | 5) {
            return None;
        }
        let subject: u16 = parts.next()?.parse().ok()?;
        let detail: u16 = parts.next()?.parse().ok()?;
        Some(Self {
            class,
            subject,
            detail,
        })
    }
}

impl std::fmt::Display for EnhancedStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
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
    fn test_code_classes() {
        assert!(ReplyCode::OK.is_success());
        assert!(ReplyCode::AUTH_CONTINUE.is_intermediate());
        assert!(ReplyCode::SERVICE_UNAVAILABLE.is_transient());
        assert!(ReplyCode::AUTH_FAILED.is_permanent());
        assert!(!ReplyCode::OK.is_permanent());
    }

    #[test]
    fn test_message_text() {
        let reply = Reply::new(
            ReplyCode::OK,
            vec!["first".to_string(), "second".to_string()],
        );
        assert_eq!(reply.message_text(), "first\nsecond");
    }

    #[test]
    fn test_enhanced_status_extraction() {
        let reply = Reply::new(
            ReplyCode::new(550),
            vec!["5.7.1 Relaying denied".to_string()],
        );
        let status = reply.enhanced_status().unwrap();
        assert_eq!(status.class, 5);
        assert_eq!(status.subject, 7);
        assert_eq!(status.detail, 1);
        assert_eq!(status.to_string(), "5.7.1");
    }

    #[test]
    fn test_enhanced_status_absent() {
        let reply = Reply::new(ReplyCode::OK, vec!["OK".to_string()]);
        assert!(reply.enhanced_status().is_none());

        // Version-looking tokens with a bad class are not status codes.
        let reply = Reply::new(ReplyCode::OK, vec!["1.2.3 greeting".to_string()]);
        assert!(reply.enhanced_status().is_none());
    }

    #[test]
    fn test_enhanced_status_parse_rejects_garbage() {
        assert!(EnhancedStatusCode::parse("2.0").is_none());
        assert!(EnhancedStatusCode::parse("two.oh.oh").is_none());
        assert!(EnhancedStatusCode::parse("").is_none());
    }
}
