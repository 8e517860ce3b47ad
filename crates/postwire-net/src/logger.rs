//! Wire logging with client-side secret redaction.
//!
//! A [`ProtocolLogger`] receives the exact bytes written to and read
//! from the transport. An optional [`SecretDetector`] hook is consulted
//! for client-sent bytes only — never server bytes — and the ranges it
//! reports are masked before the logger sees them, so credentials never
//! reach a log sink.

use std::ops::Range;

/// Receives wire traffic for a single connection.
pub trait ProtocolLogger: Send {
    /// Called once when the connection is established.
    fn log_connect(&mut self, endpoint: &str) {
        let _ = endpoint;
    }

    /// Called with bytes sent by the client (after redaction).
    fn log_client(&mut self, bytes: &[u8]) {
        let _ = bytes;
    }

    /// Called with bytes received from the server.
    fn log_server(&mut self, bytes: &[u8]) {
        let _ = bytes;
    }

    /// Called when the connection is torn down.
    fn close(&mut self) {}
}

/// Detects secrets in client-sent bytes.
///
/// Implementations receive the exact buffer that is about to be written
/// and return the byte ranges to mask. The detector is never invoked on
/// server bytes.
pub trait SecretDetector: Send {
    /// Returns the ranges of `client_bytes` that must be masked.
    fn detect(&self, client_bytes: &[u8]) -> Vec<Range<usize>>;
}

/// A logger that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl ProtocolLogger for NullLogger {}

/// A logger that emits wire traffic via `tracing` at TRACE level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ProtocolLogger for TracingLogger {
    fn log_connect(&mut self, endpoint: &str) {
        tracing::debug!(endpoint, "connected");
    }

    fn log_client(&mut self, bytes: &[u8]) {
        tracing::trace!(data = %String::from_utf8_lossy(bytes).trim_end(), "C:");
    }

    fn log_server(&mut self, bytes: &[u8]) {
        tracing::trace!(data = %String::from_utf8_lossy(bytes).trim_end(), "S:");
    }

    fn close(&mut self) {
        tracing::debug!("connection closed");
    }
}

/// Masks the argument portion of credential-bearing command lines.
///
/// Covers the direct-credential commands of all three protocols
/// (`LOGIN`, `PASS`, `APOP`) and the SASL carriers (`AUTH`,
/// `AUTHENTICATE`). SASL continuation payloads are redacted by the
/// clients marking the whole line while a negotiation is in flight.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthSecretDetector;

/// Verbs whose arguments are masked. IMAP lines carry a leading tag,
/// so the match is done on the word after the first space as well.
const SECRET_VERBS: &[&str] = &["LOGIN", "PASS", "APOP", "AUTH", "AUTHENTICATE"];

impl SecretDetector for AuthSecretDetector {
    fn detect(&self, client_bytes: &[u8]) -> Vec<Range<usize>> {
        for verb in SECRET_VERBS {
            if let Some(range) = argument_range(client_bytes, verb.as_bytes()) {
                return vec![range];
            }
        }
        Vec::new()
    }
}

/// Finds the argument range after `verb`, tolerating an IMAP tag prefix.
fn argument_range(line: &[u8], verb: &[u8]) -> Option<Range<usize>> {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\r' || line[end - 1] == b'\n') {
        end -= 1;
    }
    let line = &line[..end];

    let verb_start = if line.len() >= verb.len() && line[..verb.len()].eq_ignore_ascii_case(verb) {
        0
    } else {
        // Skip an IMAP tag: "<tag> VERB ..."
        let after_tag = line.iter().position(|&b| b == b' ')? + 1;
        let rest = &line[after_tag..];
        if rest.len() >= verb.len() && rest[..verb.len()].eq_ignore_ascii_case(verb) {
            after_tag
        } else {
            return None;
        }
    };

    let args_start = verb_start + verb.len();
    // Must be followed by a space and at least one argument byte.
    if line.get(args_start) != Some(&b' ') || args_start + 1 >= line.len() {
        return None;
    }

    Some(args_start + 1..line.len())
}

/// A logger plus its optional secret-detector hook.
///
/// The protocol clients own one of these and route every read/write
/// through it.
pub struct ProtocolLog {
    logger: Box<dyn ProtocolLogger>,
    detector: Option<Box<dyn SecretDetector>>,
}

impl ProtocolLog {
    /// Creates a log with no detector installed.
    #[must_use]
    pub fn new(logger: Box<dyn ProtocolLogger>) -> Self {
        Self {
            logger,
            detector: None,
        }
    }

    /// Creates a log that discards everything.
    #[must_use]
    pub fn null() -> Self {
        Self::new(Box::new(NullLogger))
    }

    /// Installs a secret detector.
    #[must_use]
    pub fn with_detector(mut self, detector: Box<dyn SecretDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Logs the connection endpoint.
    pub fn connect(&mut self, endpoint: &str) {
        self.logger.log_connect(endpoint);
    }

    /// Logs client-sent bytes, masking any ranges the detector reports.
    pub fn client(&mut self, bytes: &[u8]) {
        match &self.detector {
            Some(detector) => {
                let ranges = detector.detect(bytes);
                if ranges.is_empty() {
                    self.logger.log_client(bytes);
                } else {
                    self.logger.log_client(&mask(bytes, &ranges));
                }
            }
            None => self.logger.log_client(bytes),
        }
    }

    /// Logs server-sent bytes. The detector is never consulted here.
    pub fn server(&mut self, bytes: &[u8]) {
        self.logger.log_server(bytes);
    }

    /// Closes the logger.
    pub fn close(&mut self) {
        self.logger.close();
    }
}

impl std::fmt::Debug for ProtocolLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolLog")
            .field("has_detector", &self.detector.is_some())
            .finish_non_exhaustive()
    }
}

/// Replaces the given ranges with `*`, clamping out-of-bounds ranges.
fn mask(bytes: &[u8], ranges: &[Range<usize>]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    for range in ranges {
        let end = range.end.min(out.len());
        for b in &mut out[range.start.min(end)..end] {
            *b = b'*';
        }
    }
    out
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

    // Shares its storage so the test can inspect what was logged after
    // the logger is boxed away.
    #[derive(Default)]
    struct OwnedCapture {
        client: std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>>,
    }

    impl ProtocolLogger for OwnedCapture {
        fn log_client(&mut self, bytes: &[u8]) {
            self.client.lock().unwrap().push(bytes.to_vec());
        }
    }

    #[test]
    fn test_detect_pop3_pass() {
        let detector = AuthSecretDetector;
        let ranges = detector.detect(b"PASS hunter2\r\n");
        assert_eq!(ranges, vec![5..12]);
    }

    #[test]
    fn test_detect_imap_login_with_tag() {
        let detector = AuthSecretDetector;
        let ranges = detector.detect(b"A0003 LOGIN joe secret\r\n");
        assert_eq!(ranges, vec![12..22]);
    }

    #[test]
    fn test_detect_ignores_plain_commands() {
        let detector = AuthSecretDetector;
        assert!(detector.detect(b"A0001 CAPABILITY\r\n").is_empty());
        assert!(detector.detect(b"NOOP\r\n").is_empty());
    }

    #[test]
    fn test_mask_ranges() {
        let masked = mask(b"PASS hunter2\r\n", &[5..12]);
        assert_eq!(masked, b"PASS *******\r\n");
    }

    #[test]
    fn test_log_redacts_client_only() {
        let sink = OwnedCapture::default();
        let client = std::sync::Arc::clone(&sink.client);
        let mut log = ProtocolLog::new(Box::new(sink)).with_detector(Box::new(AuthSecretDetector));

        log.client(b"PASS hunter2\r\n");
        // Server bytes go through untouched even if they look like a command.
        log.server(b"PASS hunter2\r\n");

        let seen = client.lock().unwrap();
        assert_eq!(seen[0], b"PASS *******\r\n");
    }
}
