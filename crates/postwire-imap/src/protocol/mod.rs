//! Sans-I/O IMAP session engine.
//!
//! A pure state machine, completely separated from I/O: commands are
//! queued with [`Engine::enqueue`], outgoing bytes drained with
//! [`Engine::poll_transmit`], and decoded response units fed in with
//! [`Engine::handle_unit`]. This keeps the protocol logic testable
//! without network mocks and lets the async, blocking, and actor
//! façades share one implementation.
//!
//! The engine is the correlator and the state machine in one place:
//!
//! - tagged responses complete the pending command with the matching
//!   tag; untagged units go to the [`UnsolicitedHandler`] side channel
//!   and are collected onto the most recent pending command;
//!   continuations surface as [`Event::Continuation`] for the SASL loop
//! - every command is checked against a static precondition table
//!   before it is encoded; a violation fails with `InvalidState` and
//!   writes nothing
//! - state advances only on terminal responses: a successful LOGIN or
//!   AUTHENTICATE moves to `Authenticated`, a successful SELECT to
//!   `Selected`, and a *failed* SELECT clears any previous selection

mod decoder;
mod state;

use std::collections::VecDeque;

pub use decoder::FrameDecoder;
pub use state::{SelectedState, SessionState, StateKind};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::handler::UnsolicitedHandler;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{MailboxStatus, ResponseCode, Status, Tag, TagGenerator};

/// A handle to a pending command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandHandle {
    tag: Tag,
}

impl CommandHandle {
    /// Returns the tag assigned to this command.
    #[must_use]
    pub const fn tag(&self) -> &Tag {
        &self.tag
    }
}

/// Result of a completed command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Completion status.
    pub status: Status,
    /// Optional response code from the tagged line.
    pub code: Option<ResponseCode>,
    /// Human-readable text.
    pub text: String,
    /// Untagged responses collected while the command was in flight.
    pub responses: Vec<UntaggedResponse>,
}

impl CommandResult {
    /// Converts to a Result, mapping NO/BAD/BYE to errors.
    ///
    /// # Errors
    ///
    /// Returns `No`, `Bad` or `Bye` with the server's text.
    pub fn into_result(self) -> Result<Vec<UntaggedResponse>> {
        match self.status {
            Status::Ok | Status::PreAuth => Ok(self.responses),
            Status::No => Err(Error::No(self.text)),
            Status::Bad => Err(Error::Bad(self.text)),
            Status::Bye => Err(Error::Bye(self.text)),
        }
    }
}

/// Events produced by feeding response units to the engine.
#[derive(Debug)]
pub enum Event {
    /// Server greeting received (initial connection).
    Greeting {
        /// Greeting status (OK, PREAUTH or BYE).
        status: Status,
        /// Optional response code (often `[CAPABILITY ...]`).
        code: Option<ResponseCode>,
        /// Greeting text.
        text: String,
    },
    /// Continuation request (`+ ...`), for SASL challenges.
    Continuation {
        /// Text after `+ `.
        text: String,
    },
    /// A command completed.
    CommandComplete {
        /// Handle returned by [`Engine::enqueue`].
        handle: CommandHandle,
        /// The outcome.
        result: CommandResult,
    },
    /// The server announced it is closing the connection.
    Bye {
        /// BYE text.
        text: String,
    },
}

/// State-changing outcome a command carries with it.
#[derive(Debug, Clone)]
enum Intent {
    Login,
    Authenticate,
    Select { mailbox: String, read_only: bool },
    CloseMailbox,
    Logout,
    Other,
}

impl Intent {
    fn of(command: &Command) -> Self {
        match command {
            Command::Login { .. } => Self::Login,
            Command::Authenticate { .. } => Self::Authenticate,
            Command::Select { mailbox } => Self::Select {
                mailbox: mailbox.clone(),
                read_only: false,
            },
            Command::Examine { mailbox } => Self::Select {
                mailbox: mailbox.clone(),
                read_only: true,
            },
            Command::Close | Command::Unselect => Self::CloseMailbox,
            Command::Logout => Self::Logout,
            _ => Self::Other,
        }
    }
}

/// Minimum state a command requires.
#[derive(Debug, Clone, Copy)]
enum Requirement {
    Any,
    NotAuthenticated,
    Authenticated,
    Selected,
}

impl Requirement {
    /// Static precondition table.
    const fn of(command: &Command) -> Self {
        match command {
            Command::Capability | Command::Noop | Command::Logout => Self::Any,
            Command::Login { .. } | Command::Authenticate { .. } | Command::StartTls => {
                Self::NotAuthenticated
            }
            Command::Select { .. } | Command::Examine { .. } | Command::List { .. } => {
                Self::Authenticated
            }
            Command::Search { .. }
            | Command::Fetch { .. }
            | Command::Store { .. }
            | Command::Expunge
            | Command::Close
            | Command::Unselect => Self::Selected,
        }
    }
}

/// A pending command waiting for its tagged response.
struct PendingCommand {
    handle: CommandHandle,
    intent: Intent,
    responses: Vec<UntaggedResponse>,
}

/// Sans-I/O IMAP session engine.
pub struct Engine {
    state: SessionState,
    tag_gen: TagGenerator,
    pending: VecDeque<PendingCommand>,
    outbound: VecDeque<Vec<u8>>,
    capabilities: Vec<String>,
    mailbox_status: Option<MailboxStatus>,
    greeting_received: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine in the not-authenticated state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::NotAuthenticated,
            tag_gen: TagGenerator::default(),
            pending: VecDeque::new(),
            outbound: VecDeque::new(),
            capabilities: Vec::new(),
            mailbox_status: None,
            greeting_received: false,
        }
    }

    /// Returns the current session state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns the last seen capability list.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Returns the counters of the selected mailbox, if any.
    #[must_use]
    pub const fn mailbox_status(&self) -> Option<&MailboxStatus> {
        self.mailbox_status.as_ref()
    }

    /// Returns true once the server greeting was consumed.
    #[must_use]
    pub const fn greeted(&self) -> bool {
        self.greeting_received
    }

    /// Checks the precondition table, assigns a tag, and queues the
    /// command's wire bytes.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the session is in the wrong state; nothing
    /// is queued and no bytes will be written.
    pub fn enqueue(&mut self, command: &Command) -> Result<CommandHandle> {
        self.check_precondition(command)?;

        let tag = self.tag_gen.next();
        let data = command.serialize(&tag);
        let handle = CommandHandle { tag };

        if matches!(command, Command::Select { .. } | Command::Examine { .. }) {
            // Counters for the incoming selection accumulate here even
            // before the tagged OK arrives.
            self.mailbox_status = Some(MailboxStatus::default());
        }

        self.outbound.push_back(data);
        self.pending.push_back(PendingCommand {
            handle: handle.clone(),
            intent: Intent::of(command),
            responses: Vec::new(),
        });

        Ok(handle)
    }

    /// Queues raw bytes (SASL continuation responses, which carry no
    /// tag of their own).
    pub fn enqueue_raw(&mut self, data: Vec<u8>) {
        self.outbound.push_back(data);
    }

    /// Returns the next wire bytes to transmit, if any.
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.outbound.pop_front()
    }

    fn check_precondition(&self, command: &Command) -> Result<()> {
        let (expected, satisfied) = match Requirement::of(command) {
            Requirement::Any => return Ok(()),
            Requirement::NotAuthenticated => (
                StateKind::NotAuthenticated,
                self.state == SessionState::NotAuthenticated,
            ),
            Requirement::Authenticated => {
                (StateKind::Authenticated, self.state.is_authenticated())
            }
            Requirement::Selected => (
                StateKind::Selected,
                matches!(self.state, SessionState::Selected(_)),
            ),
        };

        if satisfied {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected,
                actual: self.state.kind(),
            })
        }
    }

    /// Feeds one decoded response unit.
    ///
    /// Unparsable units are skipped (decoding resumes on the next
    /// well-formed one); everything else produces at most one event.
    pub fn handle_unit(
        &mut self,
        unit: &[u8],
        handler: &mut dyn UnsolicitedHandler,
    ) -> Option<Event> {
        let response = match ResponseParser::parse(unit) {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(?err, "skipping malformed response unit");
                return None;
            }
        };

        match response {
            Response::Continuation { text } => Some(Event::Continuation { text }),
            Response::Untagged(untagged) => self.handle_untagged(untagged, handler),
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => self.handle_tagged(&tag, status, code, text),
        }
    }

    fn handle_untagged(
        &mut self,
        response: UntaggedResponse,
        handler: &mut dyn UnsolicitedHandler,
    ) -> Option<Event> {
        // The first condition response is the greeting.
        if !self.greeting_received {
            if let UntaggedResponse::Condition { status, code, text } = &response {
                self.greeting_received = true;
                if *status == Status::PreAuth {
                    self.state = SessionState::Authenticated;
                }
                if let Some(ResponseCode::Capability(caps)) = code {
                    self.capabilities.clone_from(caps);
                }
                if *status == Status::Bye {
                    return Some(Event::Bye { text: text.clone() });
                }
                return Some(Event::Greeting {
                    status: *status,
                    code: code.clone(),
                    text: text.clone(),
                });
            }
        }

        self.notify_handler(&response, handler);
        self.track_untagged(&response);

        if let UntaggedResponse::Condition {
            status: Status::Bye,
            text,
            ..
        } = &response
        {
            self.state = SessionState::Logout;
            return Some(Event::Bye { text: text.clone() });
        }

        // Collect onto the most recent in-flight command.
        if let Some(pending) = self.pending.back_mut() {
            pending.responses.push(response);
        }
        None
    }

    fn notify_handler(&self, response: &UntaggedResponse, handler: &mut dyn UnsolicitedHandler) {
        match response {
            UntaggedResponse::Exists(n) => handler.on_exists(*n),
            UntaggedResponse::Recent(n) => handler.on_recent(*n),
            UntaggedResponse::Expunge(seq) => handler.on_expunge(*seq),
            UntaggedResponse::Fetch { seq, raw } => handler.on_fetch(*seq, raw),
            UntaggedResponse::Flags(flags) => handler.on_flags(flags),
            UntaggedResponse::Condition { status, code, text } => match status {
                Status::Bye => handler.on_bye(text),
                Status::Ok if matches!(code, Some(ResponseCode::Alert)) => handler.on_alert(text),
                Status::Ok | Status::PreAuth => handler.on_ok(text),
                Status::No => handler.on_no(text),
                Status::Bad => handler.on_bad(text),
            },
            _ => {}
        }
    }

    /// Updates capabilities and mailbox counters from untagged data.
    fn track_untagged(&mut self, response: &UntaggedResponse) {
        if let UntaggedResponse::Capability(caps) = response {
            self.capabilities.clone_from(caps);
        }

        let Some(status) = &mut self.mailbox_status else {
            return;
        };
        match response {
            UntaggedResponse::Exists(n) => status.exists = *n,
            UntaggedResponse::Recent(n) => status.recent = *n,
            UntaggedResponse::Flags(flags) => status.flags.clone_from(flags),
            UntaggedResponse::Condition {
                code: Some(code), ..
            } => match code {
                ResponseCode::UidValidity(n) => status.uid_validity = Some(*n),
                ResponseCode::UidNext(n) => status.uid_next = Some(*n),
                ResponseCode::Unseen(n) => status.unseen = Some(*n),
                _ => {}
            },
            _ => {}
        }
    }

    fn handle_tagged(
        &mut self,
        tag: &Tag,
        status: Status,
        code: Option<ResponseCode>,
        text: String,
    ) -> Option<Event> {
        let position = self.pending.iter().position(|p| p.handle.tag == *tag)?;
        let pending = self.pending.remove(position)?;

        self.apply_transition(&pending.intent, status, code.as_ref());

        Some(Event::CommandComplete {
            handle: pending.handle,
            result: CommandResult {
                status,
                code,
                text,
                responses: pending.responses,
            },
        })
    }

    /// Applies the state transition a terminal response carries.
    ///
    /// Failure responses leave the state unchanged, with one exception:
    /// a failed SELECT/EXAMINE clears any previously selected mailbox.
    fn apply_transition(&mut self, intent: &Intent, status: Status, code: Option<&ResponseCode>) {
        match intent {
            Intent::Login | Intent::Authenticate => {
                if status.is_ok() {
                    self.state = SessionState::Authenticated;
                }
            }
            Intent::Select { mailbox, read_only } => {
                if status.is_ok() {
                    let read_only =
                        *read_only || matches!(code, Some(ResponseCode::ReadOnly));
                    if let Some(mb) = &mut self.mailbox_status {
                        mb.read_only = read_only;
                    }
                    self.state = SessionState::Selected(SelectedState {
                        mailbox: mailbox.clone(),
                        read_only,
                    });
                } else {
                    // RFC 3501: a failed SELECT leaves no mailbox
                    // selected, even if one was selected before.
                    self.mailbox_status = None;
                    if matches!(self.state, SessionState::Selected(_)) {
                        self.state = SessionState::Authenticated;
                    }
                }
            }
            Intent::CloseMailbox => {
                if status.is_ok() {
                    self.mailbox_status = None;
                    if matches!(self.state, SessionState::Selected(_)) {
                        self.state = SessionState::Authenticated;
                    }
                }
            }
            Intent::Logout => {
                self.state = SessionState::Logout;
                self.mailbox_status = None;
            }
            Intent::Other => {}
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("outbound", &self.outbound.len())
            .field("greeted", &self.greeting_received)
            .finish_non_exhaustive()
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
    use crate::handler::NoopHandler;

    fn greeted_engine() -> Engine {
        let mut engine = Engine::new();
        let mut handler = NoopHandler;
        let event = engine.handle_unit(b"* OK ready\r\n", &mut handler);
        assert!(matches!(event, Some(Event::Greeting { .. })));
        engine
    }

    fn complete(engine: &mut Engine, handle: &CommandHandle, line: &str) -> CommandResult {
        let mut handler = NoopHandler;
        let unit = format!("{} {line}\r\n", handle.tag());
        match engine.handle_unit(unit.as_bytes(), &mut handler) {
            Some(Event::CommandComplete { result, .. }) => result,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_greeting_preauth_authenticates() {
        let mut engine = Engine::new();
        let mut handler = NoopHandler;
        engine.handle_unit(b"* PREAUTH [CAPABILITY IMAP4rev1] hello\r\n", &mut handler);
        assert!(engine.state().is_authenticated());
        assert_eq!(engine.capabilities(), ["IMAP4rev1"]);
    }

    #[test]
    fn test_select_requires_authenticated() {
        let mut engine = greeted_engine();
        let err = engine
            .enqueue(&Command::Select {
                mailbox: "INBOX".to_string(),
            })
            .unwrap_err();

        match err {
            Error::InvalidState { expected, actual } => {
                assert_eq!(expected, StateKind::Authenticated);
                assert_eq!(actual, StateKind::NotAuthenticated);
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
        // Nothing was queued for transmission.
        assert!(engine.poll_transmit().is_none());
    }

    #[test]
    fn test_fetch_requires_selected() {
        let mut engine = greeted_engine();
        let handle = engine
            .enqueue(&Command::Login {
                username: "u".to_string(),
                password: "p".to_string(),
            })
            .unwrap();
        let _ = engine.poll_transmit().unwrap();
        complete(&mut engine, &handle, "OK done");

        let err = engine
            .enqueue(&Command::Fetch {
                sequence: "1".to_string(),
                items: crate::command::FetchItems::Fast,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                expected: StateKind::Selected,
                actual: StateKind::Authenticated,
            }
        ));
    }

    #[test]
    fn test_login_success_advances_state() {
        let mut engine = greeted_engine();
        let handle = engine
            .enqueue(&Command::Login {
                username: "u".to_string(),
                password: "p".to_string(),
            })
            .unwrap();
        complete(&mut engine, &handle, "OK welcome");
        assert!(engine.state().is_authenticated());
    }

    #[test]
    fn test_login_failure_keeps_state() {
        let mut engine = greeted_engine();
        let handle = engine
            .enqueue(&Command::Login {
                username: "u".to_string(),
                password: "wrong".to_string(),
            })
            .unwrap();
        let result = complete(&mut engine, &handle, "NO [AUTHENTICATIONFAILED] denied");
        assert_eq!(result.status, Status::No);
        assert_eq!(engine.state(), &SessionState::NotAuthenticated);
    }

    #[test]
    fn test_select_success_and_counters() {
        let mut engine = greeted_engine();
        let login = engine
            .enqueue(&Command::Login {
                username: "u".to_string(),
                password: "p".to_string(),
            })
            .unwrap();
        complete(&mut engine, &login, "OK done");

        let select = engine
            .enqueue(&Command::Select {
                mailbox: "INBOX".to_string(),
            })
            .unwrap();

        let mut handler = NoopHandler;
        engine.handle_unit(b"* 172 EXISTS\r\n", &mut handler);
        engine.handle_unit(b"* 1 RECENT\r\n", &mut handler);
        engine.handle_unit(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n", &mut handler);
        let result = complete(&mut engine, &select, "OK [READ-WRITE] SELECT completed");

        assert_eq!(engine.state().selected_mailbox(), Some("INBOX"));
        let status = engine.mailbox_status().unwrap();
        assert_eq!(status.exists, 172);
        assert_eq!(status.recent, 1);
        assert_eq!(status.uid_validity, Some(3857529045));
        assert!(!status.read_only);
        // The untagged units were collected onto the command.
        assert_eq!(result.responses.len(), 3);
    }

    #[test]
    fn test_failed_select_clears_previous_selection() {
        let mut engine = greeted_engine();
        let login = engine
            .enqueue(&Command::Login {
                username: "u".to_string(),
                password: "p".to_string(),
            })
            .unwrap();
        complete(&mut engine, &login, "OK done");

        let select = engine
            .enqueue(&Command::Select {
                mailbox: "INBOX".to_string(),
            })
            .unwrap();
        complete(&mut engine, &select, "OK [READ-WRITE] done");
        assert_eq!(engine.state().selected_mailbox(), Some("INBOX"));

        let bad = engine
            .enqueue(&Command::Select {
                mailbox: "Nope".to_string(),
            })
            .unwrap();
        complete(&mut engine, &bad, "NO no such mailbox");

        // The previous selection is gone, not restored.
        assert_eq!(engine.state().selected_mailbox(), None);
        assert_eq!(engine.state(), &SessionState::Authenticated);
        assert!(engine.mailbox_status().is_none());
    }

    #[test]
    fn test_examine_is_read_only() {
        let mut engine = greeted_engine();
        let login = engine
            .enqueue(&Command::Login {
                username: "u".to_string(),
                password: "p".to_string(),
            })
            .unwrap();
        complete(&mut engine, &login, "OK done");

        let examine = engine
            .enqueue(&Command::Examine {
                mailbox: "INBOX".to_string(),
            })
            .unwrap();
        complete(&mut engine, &examine, "OK [READ-ONLY] done");

        match engine.state() {
            SessionState::Selected(selected) => assert!(selected.read_only),
            other => panic!("expected Selected, got {other:?}"),
        }
    }

    #[test]
    fn test_tagged_response_correlates_by_tag() {
        let mut engine = greeted_engine();
        let handle = engine.enqueue(&Command::Noop).unwrap();

        let mut handler = NoopHandler;
        // A tagged response for an unknown tag completes nothing.
        assert!(engine.handle_unit(b"A9999 OK stray\r\n", &mut handler).is_none());
        // The matching tag does.
        let result = complete(&mut engine, &handle, "OK NOOP completed");
        assert!(result.status.is_ok());
    }

    #[test]
    fn test_bye_moves_to_logout() {
        let mut engine = greeted_engine();
        let mut handler = NoopHandler;
        let event = engine.handle_unit(b"* BYE shutting down\r\n", &mut handler);
        assert!(matches!(event, Some(Event::Bye { .. })));
        assert_eq!(engine.state(), &SessionState::Logout);
    }

    #[test]
    fn test_malformed_unit_skipped() {
        let mut engine = greeted_engine();
        let mut handler = NoopHandler;
        assert!(engine.handle_unit(b"!!!\r\n", &mut handler).is_none());
        // Engine still works afterwards.
        let handle = engine.enqueue(&Command::Noop).unwrap();
        let result = complete(&mut engine, &handle, "OK done");
        assert!(result.status.is_ok());
    }

    #[test]
    fn test_untagged_fetch_reaches_handler() {
        let mut engine = greeted_engine();
        let mut handler = crate::handler::CollectingHandler::new();
        engine.handle_unit(b"* 7 FETCH (FLAGS (\\Seen))\r\n", &mut handler);
        assert_eq!(handler.events.len(), 1);
    }
}
