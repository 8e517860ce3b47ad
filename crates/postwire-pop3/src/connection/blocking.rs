//! Blocking POP3 client.
//!
//! Mirrors the async [`super::Client`] over `std::net`. A command is
//! written, then the response is awaited by a bounded loop of blocking
//! reads: each attempt is capped by the socket read timeout, and the
//! attempt counter bounds the total wait. Exhausting the counter
//! surfaces [`postwire_net::Error::Timeout`]; a zero-byte read
//! surfaces [`postwire_net::Error::ConnectionClosed`].
//!
//! Not safe for concurrent callers; external synchronization is the
//! caller's responsibility.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use md5::{Digest, Md5};

use postwire_net::blocking::is_read_timeout;
use postwire_net::{BlockingStream, ProtocolLog};
use postwire_sasl::{Credentials, Mechanism, Negotiation};

use super::apop_timestamp;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{Pop3Decoder, StatusLine, Unit};
use crate::state::SessionState;
use crate::types::{ListEntry, StatInfo, UidlEntry, parse_number_pair, parse_uidl_line};

/// Timeout of one blocking read attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of read attempts before a command is declared timed
/// out.
const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Read buffer size.
const READ_BUFFER_SIZE: usize = 8192;

/// Blocking POP3 client.
pub struct BlockingClient {
    stream: BlockingStream,
    decoder: Pop3Decoder,
    queued: VecDeque<Unit>,
    state: SessionState,
    max_attempts: u32,
    log: ProtocolLog,
    host: String,
    channel_binding: Option<Vec<u8>>,
    timestamp: Option<String>,
    capabilities: Vec<String>,
}

impl BlockingClient {
    /// Connects without TLS and reads the banner.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or banner fails.
    pub fn connect_plain(host: &str, port: u16) -> Result<Self> {
        let stream = BlockingStream::connect_plain(host, port)?;
        Self::from_stream(stream, host)
    }

    /// Connects with implicit TLS and reads the banner.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, handshake or banner fails.
    pub fn connect_tls(host: &str, port: u16) -> Result<Self> {
        let stream = BlockingStream::connect_tls(host, port)?;
        Self::from_stream(stream, host)
    }

    /// Creates a client from a connected stream and reads the banner.
    ///
    /// # Errors
    ///
    /// Returns an error if the banner is missing or negative.
    pub fn from_stream(stream: BlockingStream, host: &str) -> Result<Self> {
        stream.set_read_timeout(Some(ATTEMPT_TIMEOUT))?;
        let binding = stream.channel_binding();

        let mut client = Self {
            stream,
            decoder: Pop3Decoder::new(),
            queued: VecDeque::new(),
            state: SessionState::Disconnected,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            log: ProtocolLog::null(),
            host: host.to_string(),
            channel_binding: binding,
            timestamp: None,
            capabilities: Vec::new(),
        };
        client.log.connect(host);

        let banner = client.read_status()?;
        if !banner.ok {
            return Err(Error::Server(banner.text));
        }
        client.timestamp = apop_timestamp(&banner.text);
        client.state = SessionState::Connected;
        Ok(client)
    }

    /// Returns the current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Sets the maximum number of read attempts per response.
    pub fn set_max_attempts(&mut self, attempts: u32) {
        self.max_attempts = attempts.max(1);
    }

    /// Installs a protocol logger.
    pub fn set_logger(&mut self, log: ProtocolLog) {
        self.log = log;
    }

    /// Upgrades the connection to TLS using STLS.
    ///
    /// Consumes the client because the transport is replaced in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects STLS or the handshake
    /// fails.
    pub fn stls(mut self) -> Result<Self> {
        self.state.require(SessionState::Connected)?;

        let status = self.command(&Command::Stls)?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }

        let host = self.host.clone();
        self.stream = self.stream.upgrade_to_tls(&host)?;
        self.stream.set_read_timeout(Some(ATTEMPT_TIMEOUT))?;
        self.channel_binding = self.stream.channel_binding();
        self.decoder = Pop3Decoder::new();
        self.queued.clear();
        self.capabilities.clear();
        self.timestamp = None;
        Ok(self)
    }

    /// Queries server capabilities (CAPA).
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects CAPA.
    pub fn capa(&mut self) -> Result<Vec<String>> {
        self.state.require_open()?;
        let data = self.multiline(&Command::Capa)?;
        self.capabilities = String::from_utf8_lossy(&data)
            .lines()
            .map(ToString::to_string)
            .collect();
        Ok(self.capabilities.clone())
    }

    /// Authenticates with USER/PASS.
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the AUTHORIZATION phase; `Server` when
    /// either command is rejected.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.state.require(SessionState::Connected)?;

        let status = self.command(&Command::User {
            name: username.to_string(),
        })?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }

        let status = self.command(&Command::Pass {
            password: password.to_string(),
        })?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }

        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// Authenticates with APOP.
    ///
    /// # Errors
    ///
    /// `Protocol` when the banner carried no timestamp; `Server` when
    /// the digest is rejected.
    pub fn apop(&mut self, username: &str, password: &str) -> Result<()> {
        self.state.require(SessionState::Connected)?;

        let Some(timestamp) = self.timestamp.clone() else {
            return Err(Error::Protocol(
                "server banner carried no APOP timestamp".to_string(),
            ));
        };

        let mut hasher = Md5::new();
        hasher.update(timestamp.as_bytes());
        hasher.update(password.as_bytes());
        let digest: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();

        let status = self.command(&Command::Apop {
            name: username.to_string(),
            digest,
        })?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }

        self.state = SessionState::Authenticated;
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
        self.state.require(SessionState::Connected)?;

        let mut credentials = credentials.clone();
        if credentials.channel_binding.is_none() {
            credentials.channel_binding = self.channel_binding.clone();
        }

        let offered: Vec<String> = self
            .capabilities
            .iter()
            .find_map(|line| {
                let mut parts = line.split_whitespace();
                if parts.next()?.eq_ignore_ascii_case("SASL") {
                    Some(parts.map(ToString::to_string).collect())
                } else {
                    None
                }
            })
            .unwrap_or_default();
        let mechanism = Mechanism::choose(&offered, &credentials)
            .ok_or(postwire_sasl::Error::NoSupportedMechanism)?;

        self.state = SessionState::Authenticating;
        match self.drive_sasl(mechanism, &credentials) {
            Ok(()) => {
                self.state = SessionState::Authenticated;
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Connected;
                Err(err)
            }
        }
    }

    fn drive_sasl(&mut self, mechanism: Mechanism, credentials: &Credentials) -> Result<()> {
        let mut negotiation = Negotiation::new(mechanism, credentials)?;
        let initial_response = negotiation.initial_response()?;

        let bytes = Command::Auth {
            mechanism: mechanism.as_str().to_string(),
            initial_response,
        }
        .serialize();
        self.write_all(&bytes)?;

        loop {
            match self.read_unit()? {
                Unit::Continuation(challenge) => match negotiation.respond(&challenge) {
                    Ok(answer) => {
                        let mut line = answer.into_bytes();
                        line.extend_from_slice(b"\r\n");
                        self.write_all(&line)?;
                    }
                    Err(err) => {
                        self.write_all(b"*\r\n")?;
                        let _ = self.read_unit();
                        return Err(err.into());
                    }
                },
                Unit::Status(status) if status.ok => {
                    if !negotiation.is_complete() {
                        return Err(Error::Protocol(
                            "server completed authentication before the exchange finished"
                                .to_string(),
                        ));
                    }
                    return Ok(());
                }
                Unit::Status(status) => return Err(Error::Server(status.text)),
                Unit::Data(_) => {
                    return Err(Error::Protocol(
                        "unexpected multiline data during authentication".to_string(),
                    ));
                }
            }
        }
    }

    /// Queries the maildrop summary (STAT).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase.
    pub fn stat(&mut self) -> Result<StatInfo> {
        self.state.require(SessionState::Authenticated)?;
        let status = self.command(&Command::Stat)?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }
        let (count, size) = parse_number_pair(&status.text)
            .ok_or_else(|| Error::Protocol(format!("unparsable STAT reply: {}", status.text)))?;
        Ok(StatInfo { count, size })
    }

    /// Scan listing of the whole maildrop (LIST).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase.
    pub fn list(&mut self) -> Result<Vec<ListEntry>> {
        self.state.require(SessionState::Authenticated)?;
        let data = self.multiline(&Command::List { msg: None })?;
        Ok(String::from_utf8_lossy(&data)
            .lines()
            .filter_map(|line| {
                let (msg, size) = parse_number_pair(line)?;
                Some(ListEntry { msg, size })
            })
            .collect())
    }

    /// Unique-id listing of the whole maildrop (UIDL).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase.
    pub fn uidl(&mut self) -> Result<Vec<UidlEntry>> {
        self.state.require(SessionState::Authenticated)?;
        let data = self.multiline(&Command::Uidl { msg: None })?;
        Ok(String::from_utf8_lossy(&data)
            .lines()
            .filter_map(parse_uidl_line)
            .collect())
    }

    /// Retrieves a full message (RETR).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase.
    pub fn retr(&mut self, msg: u32) -> Result<Vec<u8>> {
        self.state.require(SessionState::Authenticated)?;
        self.multiline(&Command::Retr { msg })
    }

    /// Retrieves headers plus the first `lines` body lines (TOP).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase.
    pub fn top(&mut self, msg: u32, lines: u32) -> Result<Vec<u8>> {
        self.state.require(SessionState::Authenticated)?;
        self.multiline(&Command::Top { msg, lines })
    }

    /// Marks a message deleted (DELE).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase.
    pub fn dele(&mut self, msg: u32) -> Result<()> {
        self.state.require(SessionState::Authenticated)?;
        let status = self.command(&Command::Dele { msg })?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }
        Ok(())
    }

    /// Unmarks all deleted messages (RSET).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase.
    pub fn rset(&mut self) -> Result<()> {
        self.state.require(SessionState::Authenticated)?;
        let status = self.command(&Command::Rset)?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }
        Ok(())
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects NOOP.
    pub fn noop(&mut self) -> Result<()> {
        self.state.require_open()?;
        let status = self.command(&Command::Noop)?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }
        Ok(())
    }

    /// Sends QUIT best-effort (committing deletions), then closes the
    /// transport.
    ///
    /// # Errors
    ///
    /// Never propagates QUIT or shutdown failures; exists for symmetry
    /// with the async client.
    pub fn disconnect(mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            let _ = self.command(&Command::Quit);
        }
        let _ = self.stream.shutdown();
        self.log.close();
        Ok(())
    }

    fn command(&mut self, cmd: &Command) -> Result<StatusLine> {
        let bytes = cmd.serialize();
        self.write_all(&bytes)?;
        self.read_status()
    }

    fn multiline(&mut self, cmd: &Command) -> Result<Vec<u8>> {
        debug_assert!(cmd.expects_multiline());
        self.decoder.expect_multiline();

        let status = self.command(cmd)?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }

        match self.read_unit()? {
            Unit::Data(data) => Ok(data),
            other => Err(Error::Protocol(format!(
                "expected multiline data, got {other:?}"
            ))),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.log.client(bytes);
        self.stream
            .write_all(bytes)
            .map_err(postwire_net::Error::Io)?;
        self.stream.flush().map_err(postwire_net::Error::Io)?;
        Ok(())
    }

    fn read_status(&mut self) -> Result<StatusLine> {
        match self.read_unit()? {
            Unit::Status(status) => Ok(status),
            other => Err(Error::Protocol(format!(
                "expected status line, got {other:?}"
            ))),
        }
    }

    /// Bounded blocking-read loop until a complete unit decodes.
    fn read_unit(&mut self) -> Result<Unit> {
        if let Some(unit) = self.queued.pop_front() {
            return Ok(unit);
        }

        let mut buf = [0u8; READ_BUFFER_SIZE];
        for _ in 0..self.max_attempts {
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(postwire_net::Error::ConnectionClosed.into()),
                Ok(n) => {
                    self.log.server(&buf[..n]);
                    self.queued.extend(self.decoder.decode(&buf[..n]));
                    if let Some(unit) = self.queued.pop_front() {
                        return Ok(unit);
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
            .field("state", &self.state)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}
