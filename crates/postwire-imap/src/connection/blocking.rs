//! Blocking IMAP client.
//!
//! Drives the same sans-I/O [`Engine`] as the async client, over
//! `std::net`. A command is written, then its completion is awaited by
//! a bounded loop of blocking reads: each attempt is capped by the
//! socket read timeout, and the attempt counter bounds the total wait.
//! Exhausting the counter surfaces [`postwire_net::Error::Timeout`]; a
//! zero-byte read surfaces [`postwire_net::Error::ConnectionClosed`].
//!
//! Not safe for concurrent callers; external synchronization is the
//! caller's responsibility.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use postwire_net::blocking::is_read_timeout;
use postwire_net::{BlockingStream, ProtocolLog};
use postwire_sasl::{Credentials, Mechanism, Negotiation};

use super::{auth_mechanisms, collect_expunge, collect_fetch, collect_list, collect_search};
use crate::command::{Command, FetchItems, StoreAction};
use crate::error::{Error, Result};
use crate::handler::{NoopHandler, UnsolicitedHandler};
use crate::protocol::{CommandHandle, CommandResult, Engine, Event, FrameDecoder, SessionState};
use crate::types::{ListEntry, MailboxStatus};

/// Timeout of one blocking read attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of read attempts before a command is declared timed
/// out.
const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Read buffer size.
const READ_BUFFER_SIZE: usize = 8192;

/// Blocking IMAP client.
pub struct BlockingClient {
    stream: BlockingStream,
    decoder: FrameDecoder,
    engine: Engine,
    handler: Box<dyn UnsolicitedHandler>,
    events: VecDeque<Event>,
    max_attempts: u32,
    log: ProtocolLog,
    host: String,
    channel_binding: Option<Vec<u8>>,
}

impl BlockingClient {
    /// Connects without TLS and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or greeting fails.
    pub fn connect_plain(host: &str, port: u16) -> Result<Self> {
        let stream = BlockingStream::connect_plain(host, port)?;
        Self::from_stream(stream, host)
    }

    /// Connects with implicit TLS and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, handshake or greeting fails.
    pub fn connect_tls(host: &str, port: u16) -> Result<Self> {
        let stream = BlockingStream::connect_tls(host, port)?;
        Self::from_stream(stream, host)
    }

    /// Creates a client from a connected stream and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns `Bye` if the server refuses the connection.
    pub fn from_stream(stream: BlockingStream, host: &str) -> Result<Self> {
        stream.set_read_timeout(Some(ATTEMPT_TIMEOUT))?;
        let binding = stream.channel_binding();

        let mut client = Self {
            stream,
            decoder: FrameDecoder::new(),
            engine: Engine::new(),
            handler: Box::new(NoopHandler),
            events: VecDeque::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            log: ProtocolLog::null(),
            host: host.to_string(),
            channel_binding: binding,
        };
        client.log.connect(host);

        loop {
            match client.next_event()? {
                Event::Greeting { .. } => break,
                Event::Bye { text } => return Err(Error::Bye(text)),
                _ => {}
            }
        }
        Ok(client)
    }

    /// Returns the current session state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        self.engine.state()
    }

    /// Returns the last seen capability list.
    #[must_use]
    pub fn server_capabilities(&self) -> &[String] {
        self.engine.capabilities()
    }

    /// Sets the maximum number of read attempts per response.
    pub fn set_max_attempts(&mut self, attempts: u32) {
        self.max_attempts = attempts.max(1);
    }

    /// Installs a protocol logger.
    pub fn set_logger(&mut self, log: ProtocolLog) {
        self.log = log;
    }

    /// Installs a handler for unsolicited responses.
    pub fn set_handler(&mut self, handler: Box<dyn UnsolicitedHandler>) {
        self.handler = handler;
    }

    /// Issues CAPABILITY and returns the refreshed list.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the command.
    pub fn capability(&mut self) -> Result<Vec<String>> {
        self.run(&Command::Capability)?.into_result()?;
        Ok(self.engine.capabilities().to_vec())
    }

    /// Authenticates with LOGIN.
    ///
    /// # Errors
    ///
    /// `InvalidState` when already authenticated; `No`/`Bad` when the
    /// server rejects the credentials.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.run(&Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        })?
        .into_result()?;
        Ok(())
    }

    /// Authenticates with the strongest SASL mechanism both sides
    /// support.
    ///
    /// # Errors
    ///
    /// `NoSupportedMechanism` when the offer and credentials do not
    /// intersect; mechanism errors abort only this attempt.
    pub fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let mut credentials = credentials.clone();
        if credentials.channel_binding.is_none() {
            credentials.channel_binding = self.channel_binding.clone();
        }

        let mut offered = auth_mechanisms(self.engine.capabilities());
        if offered.is_empty() {
            self.capability()?;
            offered = auth_mechanisms(self.engine.capabilities());
        }

        let mechanism = Mechanism::choose(&offered, &credentials)
            .ok_or(postwire_sasl::Error::NoSupportedMechanism)?;

        let mut negotiation = Negotiation::new(mechanism, &credentials)?;
        let initial_response = negotiation.initial_response()?;

        let handle = self.engine.enqueue(&Command::Authenticate {
            mechanism: mechanism.as_str().to_string(),
            initial_response,
        })?;
        self.flush_outbound()?;

        loop {
            match self.next_event()? {
                Event::Continuation { text } => match negotiation.respond(&text) {
                    Ok(answer) => {
                        let mut line = answer.into_bytes();
                        line.extend_from_slice(b"\r\n");
                        self.engine.enqueue_raw(line);
                        self.flush_outbound()?;
                    }
                    Err(err) => {
                        self.engine.enqueue_raw(b"*\r\n".to_vec());
                        self.flush_outbound()?;
                        let _ = self.drain_command(&handle);
                        return Err(err.into());
                    }
                },
                Event::CommandComplete {
                    handle: completed,
                    result,
                } if completed == handle => {
                    if result.status.is_ok() {
                        if !negotiation.is_complete() {
                            return Err(Error::Protocol(
                                "server completed authentication before the exchange finished"
                                    .to_string(),
                            ));
                        }
                        return Ok(());
                    }
                    return Err(result.into_result().unwrap_err());
                }
                _ => {}
            }
        }
    }

    /// Selects a mailbox read-write.
    ///
    /// # Errors
    ///
    /// `InvalidState` before authentication; a `No` rejection leaves
    /// no mailbox selected.
    pub fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.run(&Command::Select {
            mailbox: mailbox.to_string(),
        })?
        .into_result()?;
        Ok(self.engine.mailbox_status().cloned().unwrap_or_default())
    }

    /// Opens a mailbox read-only (EXAMINE).
    ///
    /// # Errors
    ///
    /// Same as [`BlockingClient::select`].
    pub fn examine(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.run(&Command::Examine {
            mailbox: mailbox.to_string(),
        })?
        .into_result()?;
        Ok(self.engine.mailbox_status().cloned().unwrap_or_default())
    }

    /// Lists mailboxes matching `pattern` under `reference`.
    ///
    /// # Errors
    ///
    /// `InvalidState` before authentication.
    pub fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        let result = self.run(&Command::List {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
        })?;
        Ok(collect_list(result.into_result()?))
    }

    /// Searches the selected mailbox with verbatim criteria.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a mailbox is selected.
    pub fn search(&mut self, criteria: &str) -> Result<Vec<u32>> {
        let result = self.run(&Command::Search {
            criteria: criteria.to_string(),
        })?;
        Ok(collect_search(result.into_result()?))
    }

    /// Fetches message data; payloads are returned raw.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a mailbox is selected.
    pub fn fetch(&mut self, sequence: &str, items: FetchItems) -> Result<Vec<(u32, Vec<u8>)>> {
        let result = self.run(&Command::Fetch {
            sequence: sequence.to_string(),
            items,
        })?;
        Ok(collect_fetch(result.into_result()?))
    }

    /// Updates message flags (STORE).
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a mailbox is selected.
    pub fn store(&mut self, sequence: &str, action: StoreAction) -> Result<Vec<(u32, Vec<u8>)>> {
        let result = self.run(&Command::Store {
            sequence: sequence.to_string(),
            action,
        })?;
        Ok(collect_fetch(result.into_result()?))
    }

    /// Expunges deleted messages.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a mailbox is selected.
    pub fn expunge(&mut self) -> Result<Vec<u32>> {
        let result = self.run(&Command::Expunge)?;
        Ok(collect_expunge(result.into_result()?))
    }

    /// Closes the selected mailbox, expunging (CLOSE).
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a mailbox is selected.
    pub fn close(&mut self) -> Result<()> {
        self.run(&Command::Close)?.into_result()?;
        Ok(())
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects NOOP.
    pub fn noop(&mut self) -> Result<()> {
        self.run(&Command::Noop)?.into_result()?;
        Ok(())
    }

    /// Sends LOGOUT best-effort, then closes the transport.
    ///
    /// # Errors
    ///
    /// Never propagates LOGOUT or shutdown failures; exists for
    /// symmetry with the async client.
    pub fn disconnect(mut self) -> Result<()> {
        if !matches!(self.engine.state(), SessionState::Logout) {
            let _ = self.run(&Command::Logout);
        }
        let _ = self.stream.shutdown();
        self.log.close();
        Ok(())
    }

    fn run(&mut self, command: &Command) -> Result<CommandResult> {
        let handle = self.engine.enqueue(command)?;
        self.flush_outbound()?;

        loop {
            match self.next_event()? {
                Event::CommandComplete {
                    handle: completed,
                    result,
                } if completed == handle => return Ok(result),
                _ => {}
            }
        }
    }

    fn drain_command(&mut self, handle: &CommandHandle) -> Result<()> {
        loop {
            match self.next_event()? {
                Event::CommandComplete { handle: completed, .. } if completed == *handle => {
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn flush_outbound(&mut self) -> Result<()> {
        while let Some(data) = self.engine.poll_transmit() {
            self.log.client(&data);
            self.stream
                .write_all(&data)
                .map_err(postwire_net::Error::Io)?;
        }
        self.stream.flush().map_err(postwire_net::Error::Io)?;
        Ok(())
    }

    /// Bounded blocking-read loop until the engine produces an event.
    fn next_event(&mut self) -> Result<Event> {
        if let Some(event) = self.events.pop_front() {
            return Ok(event);
        }

        let mut buf = [0u8; READ_BUFFER_SIZE];
        for _ in 0..self.max_attempts {
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(postwire_net::Error::ConnectionClosed.into()),
                Ok(n) => {
                    self.log.server(&buf[..n]);
                    for unit in self.decoder.decode(&buf[..n])? {
                        if let Some(event) = self.engine.handle_unit(&unit, &mut *self.handler) {
                            self.events.push_back(event);
                        }
                    }
                    if let Some(event) = self.events.pop_front() {
                        return Ok(event);
                    }
                }
                Err(err) if is_read_timeout(&err) => {}
                Err(err) => return Err(postwire_net::Error::Io(err).into()),
            }
        }

        Err(postwire_net::Error::Timeout(ATTEMPT_TIMEOUT * self.max_attempts).into())
    }
}

impl std::fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("state", self.engine.state())
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}
