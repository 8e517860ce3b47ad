//! Blocking SMTP client.
//!
//! Mirrors the async [`super::Client`] over `std::net`. A command is
//! written, then the reply is awaited by a bounded loop of blocking
//! reads: each read attempt is capped by the socket read timeout, and
//! the attempt counter bounds the total wait. Exhausting the counter
//! surfaces [`postwire_net::Error::Timeout`]; a zero-byte read
//! surfaces [`postwire_net::Error::ConnectionClosed`].
//!
//! Not safe for concurrent callers; external synchronization is the
//! caller's responsibility.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use postwire_net::blocking::is_read_timeout;
use postwire_net::{BlockingStream, ProtocolLog};
use postwire_sasl::{Credentials, Mechanism, Negotiation};

use super::ServerInfo;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::ReplyDecoder;
use crate::state::SessionState;
use crate::types::{Address, Reply, ReplyCode};

/// Timeout of one blocking read attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of read attempts before a command is declared timed
/// out (total wait: `ATTEMPT_TIMEOUT * DEFAULT_MAX_ATTEMPTS`).
const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Read buffer size.
const READ_BUFFER_SIZE: usize = 8192;

/// Blocking SMTP client.
pub struct BlockingClient {
    stream: BlockingStream,
    decoder: ReplyDecoder,
    queued: VecDeque<Reply>,
    state: SessionState,
    server: ServerInfo,
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
    /// Returns an error if the greeting is missing or negative.
    pub fn from_stream(stream: BlockingStream, host: &str) -> Result<Self> {
        stream.set_read_timeout(Some(ATTEMPT_TIMEOUT))?;
        let binding = stream.channel_binding();

        let mut client = Self {
            stream,
            decoder: ReplyDecoder::new(),
            queued: VecDeque::new(),
            state: SessionState::Disconnected,
            server: ServerInfo::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            log: ProtocolLog::null(),
            host: host.to_string(),
            channel_binding: binding,
        };
        client.log.connect(host);

        let greeting = client.read_reply()?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::from_reply(&greeting));
        }
        if let Some(name) = greeting
            .message
            .first()
            .and_then(|l| l.split_whitespace().next())
        {
            client.server.hostname = name.to_string();
        }
        client.state = SessionState::Connected;
        Ok(client)
    }

    /// Returns the current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the discovered server capabilities.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// Sets the maximum number of read attempts per response.
    pub fn set_max_attempts(&mut self, attempts: u32) {
        self.max_attempts = attempts.max(1);
    }

    /// Installs a protocol logger.
    pub fn set_logger(&mut self, log: ProtocolLog) {
        self.log = log;
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if issued while disconnected or rejected.
    pub fn ehlo(&mut self, hostname: &str) -> Result<()> {
        self.state.require_open()?;
        let reply = self.command(&Command::Ehlo {
            hostname: hostname.to_string(),
        })?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        self.server.update_from_ehlo(&reply.message);
        Ok(())
    }

    /// Upgrades the connection to TLS using STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not advertised or the handshake
    /// fails.
    pub fn starttls(mut self) -> Result<Self> {
        self.state.require(SessionState::Connected)?;
        if !self.server.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".to_string()));
        }

        let reply = self.command(&Command::StartTls)?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(Error::from_reply(&reply));
        }

        let host = self.host.clone();
        self.stream = self.stream.upgrade_to_tls(&host)?;
        self.stream.set_read_timeout(Some(ATTEMPT_TIMEOUT))?;
        self.channel_binding = self.stream.channel_binding();
        self.decoder = ReplyDecoder::new();
        self.queued.clear();
        self.server.extensions.clear();
        Ok(self)
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

        let offered = self.server.auth_mechanisms();
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

        let mut reply = self.command(&Command::Auth {
            mechanism: mechanism.as_str().to_string(),
            initial_response,
        })?;

        loop {
            if reply.code == ReplyCode::AUTH_CONTINUE {
                let challenge = reply.message.first().map_or("", String::as_str);
                match negotiation.respond(challenge) {
                    Ok(answer) => {
                        let mut line = answer.into_bytes();
                        line.extend_from_slice(b"\r\n");
                        self.write_all(&line)?;
                        reply = self.read_reply()?;
                    }
                    Err(err) => {
                        self.write_all(b"*\r\n")?;
                        let _ = self.read_reply();
                        return Err(err.into());
                    }
                }
            } else if reply.is_success() {
                if !negotiation.is_complete() {
                    let extra = reply.message.first().map_or("", String::as_str);
                    let verified = negotiation.respond(extra).is_ok() && negotiation.is_complete();
                    if !verified {
                        return Err(Error::Protocol(
                            "server completed authentication before the exchange finished"
                                .to_string(),
                        ));
                    }
                }
                return Ok(());
            } else {
                return Err(Error::from_reply(&reply));
            }
        }
    }

    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the sender.
    pub fn mail_from(&mut self, from: &Address) -> Result<()> {
        self.state.require_ready()?;
        let reply = self.command(&Command::MailFrom {
            from: from.clone(),
            body: None,
            size: None,
        })?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(())
    }

    /// Adds a recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the recipient.
    pub fn rcpt_to(&mut self, to: &Address) -> Result<()> {
        self.state.require_ready()?;
        let reply = self.command(&Command::RcptTo { to: to.clone() })?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(())
    }

    /// Sends the message body (DATA + dot-stuffed payload).
    ///
    /// # Errors
    ///
    /// Returns an error if DATA is refused or the message is rejected.
    pub fn send_message(&mut self, message: &[u8]) -> Result<Reply> {
        self.state.require_ready()?;

        let reply = self.command(&Command::Data)?;
        if reply.code != ReplyCode::START_DATA {
            return Err(Error::from_reply(&reply));
        }

        let mut body = Vec::with_capacity(message.len() + 64);
        for line in message.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                body.push(b'.');
            }
            body.extend_from_slice(line);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b".\r\n");
        self.write_all(&body)?;

        let reply = self.read_reply()?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(reply)
    }

    /// Sends QUIT best-effort, then closes the transport.
    ///
    /// # Errors
    ///
    /// Never fails on the QUIT itself; only socket shutdown errors are
    /// swallowed too — the method exists for symmetry with the async
    /// client and always leaves the session disconnected.
    pub fn disconnect(mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            let _ = self.command(&Command::Quit);
        }
        let _ = self.stream.shutdown();
        self.log.close();
        Ok(())
    }

    fn command(&mut self, cmd: &Command) -> Result<Reply> {
        let bytes = cmd.serialize();
        self.write_all(&bytes)?;
        self.read_reply()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.log.client(bytes);
        self.stream
            .write_all(bytes)
            .map_err(postwire_net::Error::Io)?;
        self.stream.flush().map_err(postwire_net::Error::Io)?;
        Ok(())
    }

    /// Bounded blocking-read loop until a complete reply decodes.
    fn read_reply(&mut self) -> Result<Reply> {
        if let Some(reply) = self.queued.pop_front() {
            return Ok(reply);
        }

        let mut buf = [0u8; READ_BUFFER_SIZE];
        for _ in 0..self.max_attempts {
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(postwire_net::Error::ConnectionClosed.into()),
                Ok(n) => {
                    self.log.server(&buf[..n]);
                    self.queued.extend(self.decoder.decode(&buf[..n]));
                    if let Some(reply) = self.queued.pop_front() {
                        return Ok(reply);
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
