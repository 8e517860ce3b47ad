//! Unsolicited response handler.
//!
//! IMAP servers may send EXISTS, EXPUNGE, FETCH and other responses at
//! any time, not just in reply to a command. The engine routes these
//! to an [`UnsolicitedHandler`] side channel without completing any
//! waiter.

/// Observer for unsolicited server responses.
///
/// All methods have empty defaults; implement the ones you care about.
pub trait UnsolicitedHandler: Send {
    /// Called when the message count changes (EXISTS).
    fn on_exists(&mut self, count: u32) {
        let _ = count;
    }

    /// Called when a message is expunged (EXPUNGE).
    ///
    /// The sequence number refers to the message's position before
    /// removal; later messages shift down by one.
    fn on_expunge(&mut self, seq: u32) {
        let _ = seq;
    }

    /// Called for an unsolicited FETCH (typically flag changes made by
    /// another client). `raw` is the complete unit, literals included.
    fn on_fetch(&mut self, seq: u32, raw: &[u8]) {
        let _ = (seq, raw);
    }

    /// Called when the mailbox flag list changes (FLAGS).
    fn on_flags(&mut self, flags: &[String]) {
        let _ = flags;
    }

    /// Called when the recent count changes (RECENT).
    fn on_recent(&mut self, count: u32) {
        let _ = count;
    }

    /// Called when the server announces disconnection (BYE).
    fn on_bye(&mut self, text: &str) {
        let _ = text;
    }

    /// Called for an `[ALERT]` response code. Per RFC 3501 the text
    /// must be shown to the user.
    fn on_alert(&mut self, text: &str) {
        let _ = text;
    }

    /// Called for informational OK text.
    fn on_ok(&mut self, text: &str) {
        let _ = text;
    }

    /// Called for untagged NO warnings.
    fn on_no(&mut self, text: &str) {
        let _ = text;
    }

    /// Called for untagged BAD errors.
    fn on_bad(&mut self, text: &str) {
        let _ = text;
    }
}

/// A handler that ignores all unsolicited responses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl UnsolicitedHandler for NoopHandler {}

/// A handler that logs unsolicited responses via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHandler;

impl UnsolicitedHandler for TracingHandler {
    fn on_exists(&mut self, count: u32) {
        tracing::debug!(count, "EXISTS");
    }

    fn on_expunge(&mut self, seq: u32) {
        tracing::debug!(seq, "EXPUNGE");
    }

    fn on_fetch(&mut self, seq: u32, raw: &[u8]) {
        tracing::debug!(seq, bytes = raw.len(), "FETCH");
    }

    fn on_flags(&mut self, flags: &[String]) {
        tracing::debug!(?flags, "FLAGS");
    }

    fn on_recent(&mut self, count: u32) {
        tracing::debug!(count, "RECENT");
    }

    fn on_bye(&mut self, text: &str) {
        tracing::info!(text, "BYE");
    }

    fn on_alert(&mut self, text: &str) {
        tracing::warn!(text, "ALERT");
    }

    fn on_no(&mut self, text: &str) {
        tracing::warn!(text, "NO");
    }

    fn on_bad(&mut self, text: &str) {
        tracing::error!(text, "BAD");
    }
}

/// A handler that collects events for later processing.
#[derive(Debug, Default, Clone)]
pub struct CollectingHandler {
    /// Collected events.
    pub events: Vec<UnsolicitedEvent>,
}

impl CollectingHandler {
    /// Creates a new collecting handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes all collected events, leaving the handler empty.
    pub fn take(&mut self) -> Vec<UnsolicitedEvent> {
        std::mem::take(&mut self.events)
    }
}

impl UnsolicitedHandler for CollectingHandler {
    fn on_exists(&mut self, count: u32) {
        self.events.push(UnsolicitedEvent::Exists(count));
    }

    fn on_expunge(&mut self, seq: u32) {
        self.events.push(UnsolicitedEvent::Expunge(seq));
    }

    fn on_fetch(&mut self, seq: u32, raw: &[u8]) {
        self.events.push(UnsolicitedEvent::Fetch(seq, raw.to_vec()));
    }

    fn on_flags(&mut self, flags: &[String]) {
        self.events.push(UnsolicitedEvent::Flags(flags.to_vec()));
    }

    fn on_recent(&mut self, count: u32) {
        self.events.push(UnsolicitedEvent::Recent(count));
    }

    fn on_bye(&mut self, text: &str) {
        self.events.push(UnsolicitedEvent::Bye(text.to_string()));
    }

    fn on_alert(&mut self, text: &str) {
        self.events.push(UnsolicitedEvent::Alert(text.to_string()));
    }
}

/// An unsolicited event collected by [`CollectingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsolicitedEvent {
    /// EXISTS response.
    Exists(u32),
    /// EXPUNGE response.
    Expunge(u32),
    /// FETCH response with the raw unit.
    Fetch(u32, Vec<u8>),
    /// FLAGS response.
    Flags(Vec<String>),
    /// RECENT response.
    Recent(u32),
    /// BYE response.
    Bye(String),
    /// ALERT response code.
    Alert(String),
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
    fn test_noop_handler_does_not_panic() {
        let mut handler = NoopHandler;
        handler.on_exists(100);
        handler.on_expunge(1);
        handler.on_bye("goodbye");
        handler.on_alert("important!");
    }

    #[test]
    fn test_collecting_handler() {
        let mut handler = CollectingHandler::new();
        handler.on_exists(50);
        handler.on_recent(5);
        handler.on_alert("maintenance at midnight");

        assert_eq!(
            handler.events,
            vec![
                UnsolicitedEvent::Exists(50),
                UnsolicitedEvent::Recent(5),
                UnsolicitedEvent::Alert("maintenance at midnight".to_string()),
            ]
        );

        let taken = handler.take();
        assert_eq!(taken.len(), 3);
        assert!(handler.events.is_empty());
    }
}
