//! Async POP3 client.
//!
//! One client owns one connection; operations take `&mut self`, so the
//! borrow checker serializes callers and command bytes are never
//! interleaved on the wire. Every response wait runs under the
//! configured deadline.

use std::collections::VecDeque;
use std::time::Duration;

use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use postwire_net::{MailStream, ProtocolLog, deadline};
use postwire_sasl::{Credentials, Mechanism, Negotiation};

use super::apop_timestamp;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{Pop3Decoder, StatusLine, Unit};
use crate::state::SessionState;
use crate::types::{ListEntry, StatInfo, UidlEntry, parse_number_pair, parse_uidl_line};

/// Default timeout for a single command's response.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Read buffer size.
const READ_BUFFER_SIZE: usize = 8192;

/// Async POP3 client.
pub struct Client<S = MailStream> {
    stream: S,
    decoder: Pop3Decoder,
    queued: VecDeque<Unit>,
    state: SessionState,
    command_timeout: Option<Duration>,
    log: ProtocolLog,
    host: String,
    channel_binding: Option<Vec<u8>>,
    /// `<...>` token from the banner, enables APOP.
    timestamp: Option<String>,
    /// Capability lines from the last CAPA.
    capabilities: Vec<String>,
}

impl Client<MailStream> {
    /// Connects without TLS and reads the banner.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or banner fails.
    pub async fn connect_plain(host: &str, port: u16) -> Result<Self> {
        let stream = postwire_net::connect_plain(host, port).await?;
        let mut client = Self::from_stream(stream).await?;
        client.host = host.to_string();
        client.log.connect(&format!("{host}:{port}"));
        Ok(client)
    }

    /// Connects with implicit TLS and reads the banner.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, handshake or banner fails.
    pub async fn connect_tls(host: &str, port: u16) -> Result<Self> {
        let stream = postwire_net::connect_tls(host, port).await?;
        let binding = stream.channel_binding();
        let mut client = Self::from_stream(stream).await?;
        client.host = host.to_string();
        client.channel_binding = binding;
        client.log.connect(&format!("{host}:{port}"));
        Ok(client)
    }

    /// Upgrades the connection to TLS using STLS.
    ///
    /// Consumes the client because the transport is replaced in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects STLS or the handshake
    /// fails.
    pub async fn stls(mut self) -> Result<Self> {
        self.state.require(SessionState::Connected)?;
        if self.host.is_empty() {
            return Err(Error::Protocol(
                "server host unknown, cannot upgrade to TLS".to_string(),
            ));
        }

        let status = self.command(&Command::Stls).await?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }

        self.stream = self.stream.upgrade_to_tls(&self.host).await?;
        self.channel_binding = self.stream.channel_binding();
        // Pre-TLS state must not be trusted.
        self.decoder = Pop3Decoder::new();
        self.queued.clear();
        self.capabilities.clear();
        // The APOP timestamp predates the handshake.
        self.timestamp = None;
        Ok(self)
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream and reads the `+OK`
    /// banner.
    ///
    /// # Errors
    ///
    /// Returns an error if the banner is missing or negative.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut client = Self {
            stream,
            decoder: Pop3Decoder::new(),
            queued: VecDeque::new(),
            state: SessionState::Disconnected,
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
            log: ProtocolLog::null(),
            host: String::new(),
            channel_binding: None,
            timestamp: None,
            capabilities: Vec::new(),
        };

        let banner = client.read_status().await?;
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

    /// Returns the capability lines from the last CAPA response.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Returns true if the banner carried an APOP timestamp.
    #[must_use]
    pub const fn supports_apop(&self) -> bool {
        self.timestamp.is_some()
    }

    /// Sets the per-command response timeout. `None` disables it.
    pub fn set_command_timeout(&mut self, timeout: Option<Duration>) {
        self.command_timeout = timeout;
    }

    /// Installs a protocol logger.
    pub fn set_logger(&mut self, log: ProtocolLog) {
        self.log = log;
    }

    /// Queries server capabilities (CAPA).
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects CAPA.
    pub async fn capa(&mut self) -> Result<Vec<String>> {
        self.state.require_open()?;
        let data = self.multiline(&Command::Capa).await?;
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
    /// either command is rejected (state stays `Connected`).
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.state.require(SessionState::Connected)?;

        let status = self
            .command(&Command::User {
                name: username.to_string(),
            })
            .await?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }

        let status = self
            .command(&Command::Pass {
                password: password.to_string(),
            })
            .await?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }

        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// Authenticates with APOP, proving the password against the
    /// banner timestamp without sending it.
    ///
    /// # Errors
    ///
    /// `Protocol` when the banner carried no timestamp; `Server` when
    /// the digest is rejected.
    pub async fn apop(&mut self, username: &str, password: &str) -> Result<()> {
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

        let status = self
            .command(&Command::Apop {
                name: username.to_string(),
                digest,
            })
            .await?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }

        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// Authenticates with the strongest SASL mechanism both sides
    /// support (RFC 5034).
    ///
    /// The offer is taken from the `SASL` capability line of the last
    /// CAPA response; channel-binding data from the transport is
    /// attached automatically.
    ///
    /// # Errors
    ///
    /// `NoSupportedMechanism` when the offer and credentials do not
    /// intersect; mechanism errors abort only this attempt and leave
    /// the session usable for a retry.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        self.state.require(SessionState::Connected)?;

        let mut credentials = credentials.clone();
        if credentials.channel_binding.is_none() {
            credentials.channel_binding = self.channel_binding.clone();
        }

        let offered = self.sasl_mechanisms();
        let mechanism = Mechanism::choose(&offered, &credentials)
            .ok_or(postwire_sasl::Error::NoSupportedMechanism)?;

        tracing::debug!(%mechanism, "starting SASL authentication");
        self.state = SessionState::Authenticating;
        match self.drive_sasl(mechanism, &credentials).await {
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

    /// Mechanism names from the `SASL` capability line.
    fn sasl_mechanisms(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .find_map(|line| {
                let mut parts = line.split_whitespace();
                if parts.next()?.eq_ignore_ascii_case("SASL") {
                    Some(parts.map(ToString::to_string).collect())
                } else {
                    None
                }
            })
            .unwrap_or_default()
    }

    async fn drive_sasl(&mut self, mechanism: Mechanism, credentials: &Credentials) -> Result<()> {
        let mut negotiation = Negotiation::new(mechanism, credentials)?;
        let initial_response = negotiation.initial_response()?;

        let bytes = Command::Auth {
            mechanism: mechanism.as_str().to_string(),
            initial_response,
        }
        .serialize();
        self.write_all(&bytes).await?;

        loop {
            match self.read_unit().await? {
                Unit::Continuation(challenge) => match negotiation.respond(&challenge) {
                    Ok(answer) => {
                        let mut line = answer.into_bytes();
                        line.extend_from_slice(b"\r\n");
                        self.write_all(&line).await?;
                    }
                    Err(err) => {
                        // Abort the exchange; the server still owes a
                        // terminal status, which we drain so the
                        // session stays consistent for a retry.
                        self.write_all(b"*\r\n").await?;
                        let _ = self.read_unit().await;
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
    pub async fn stat(&mut self) -> Result<StatInfo> {
        self.state.require(SessionState::Authenticated)?;
        let status = self.command(&Command::Stat).await?;
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
    pub async fn list(&mut self) -> Result<Vec<ListEntry>> {
        self.state.require(SessionState::Authenticated)?;
        let data = self.multiline(&Command::List { msg: None }).await?;
        Ok(String::from_utf8_lossy(&data)
            .lines()
            .filter_map(|line| {
                let (msg, size) = parse_number_pair(line)?;
                Some(ListEntry { msg, size })
            })
            .collect())
    }

    /// Scan listing of a single message (`LIST n`).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase; `Server` for an
    /// unknown or deleted message.
    pub async fn list_msg(&mut self, msg: u32) -> Result<ListEntry> {
        self.state.require(SessionState::Authenticated)?;
        let status = self.command(&Command::List { msg: Some(msg) }).await?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }
        let (msg, size) = parse_number_pair(&status.text)
            .ok_or_else(|| Error::Protocol(format!("unparsable LIST reply: {}", status.text)))?;
        Ok(ListEntry { msg, size })
    }

    /// Unique-id listing of a single message (`UIDL n`).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase; `Server` for an
    /// unknown or deleted message.
    pub async fn uidl_msg(&mut self, msg: u32) -> Result<UidlEntry> {
        self.state.require(SessionState::Authenticated)?;
        let status = self.command(&Command::Uidl { msg: Some(msg) }).await?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }
        parse_uidl_line(&status.text)
            .ok_or_else(|| Error::Protocol(format!("unparsable UIDL reply: {}", status.text)))
    }

    /// Unique-id listing of the whole maildrop (UIDL).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase.
    pub async fn uidl(&mut self) -> Result<Vec<UidlEntry>> {
        self.state.require(SessionState::Authenticated)?;
        let data = self.multiline(&Command::Uidl { msg: None }).await?;
        Ok(String::from_utf8_lossy(&data)
            .lines()
            .filter_map(parse_uidl_line)
            .collect())
    }

    /// Retrieves a full message (RETR).
    ///
    /// Returns the raw message bytes, dot-stuffing removed; parsing is
    /// the MIME layer's job.
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase; `Server` for an
    /// unknown or deleted message.
    pub async fn retr(&mut self, msg: u32) -> Result<Vec<u8>> {
        self.state.require(SessionState::Authenticated)?;
        self.multiline(&Command::Retr { msg }).await
    }

    /// Retrieves headers plus the first `lines` body lines (TOP).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase.
    pub async fn top(&mut self, msg: u32, lines: u32) -> Result<Vec<u8>> {
        self.state.require(SessionState::Authenticated)?;
        self.multiline(&Command::Top { msg, lines }).await
    }

    /// Marks a message deleted (DELE).
    ///
    /// # Errors
    ///
    /// `InvalidState` outside the TRANSACTION phase.
    pub async fn dele(&mut self, msg: u32) -> Result<()> {
        self.state.require(SessionState::Authenticated)?;
        let status = self.command(&Command::Dele { msg }).await?;
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
    pub async fn rset(&mut self) -> Result<()> {
        self.state.require(SessionState::Authenticated)?;
        let status = self.command(&Command::Rset).await?;
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
    pub async fn noop(&mut self) -> Result<()> {
        self.state.require_open()?;
        let status = self.command(&Command::Noop).await?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }
        Ok(())
    }

    /// Sends QUIT best-effort (committing deletions), then closes the
    /// transport regardless of the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error only if closing the transport itself fails.
    pub async fn disconnect(mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            let _ = self.command(&Command::Quit).await;
        }
        self.state = SessionState::Disconnected;
        let _ = self.stream.shutdown().await;
        self.log.close();
        Ok(())
    }

    /// Sends a command and awaits its status line.
    async fn command(&mut self, cmd: &Command) -> Result<StatusLine> {
        let bytes = cmd.serialize();
        self.write_all(&bytes).await?;
        self.read_status().await
    }

    /// Sends a multiline command: status first, then the data block.
    async fn multiline(&mut self, cmd: &Command) -> Result<Vec<u8>> {
        debug_assert!(cmd.expects_multiline());
        self.decoder.expect_multiline();

        let status = self.command(cmd).await?;
        if !status.ok {
            return Err(Error::Server(status.text));
        }

        match self.read_unit().await? {
            Unit::Data(data) => Ok(data),
            other => Err(Error::Protocol(format!(
                "expected multiline data, got {other:?}"
            ))),
        }
    }

    /// Writes and flushes, logging the client bytes.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.log.client(bytes);
        self.stream
            .write_all(bytes)
            .await
            .map_err(postwire_net::Error::Io)?;
        self.stream.flush().await.map_err(postwire_net::Error::Io)?;
        Ok(())
    }

    /// Awaits a status line, rejecting other unit kinds.
    async fn read_status(&mut self) -> Result<StatusLine> {
        match self.read_unit().await? {
            Unit::Status(status) => Ok(status),
            other => Err(Error::Protocol(format!(
                "expected status line, got {other:?}"
            ))),
        }
    }

    /// Awaits the next unit under the configured deadline.
    async fn read_unit(&mut self) -> Result<Unit> {
        if let Some(unit) = self.queued.pop_front() {
            return Ok(unit);
        }

        let limit = self.command_timeout;
        let stream = &mut self.stream;
        let decoder = &mut self.decoder;
        let queued = &mut self.queued;
        let log = &mut self.log;

        deadline(limit, async move {
            loop {
                let mut buf = [0u8; READ_BUFFER_SIZE];
                let n = stream.read(&mut buf).await.map_err(postwire_net::Error::Io)?;
                if n == 0 {
                    return Err(postwire_net::Error::ConnectionClosed.into());
                }
                log.server(&buf[..n]);
                queued.extend(decoder.decode(&buf[..n]));
                if let Some(unit) = queued.pop_front() {
                    return Ok(unit);
                }
            }
        })
        .await
    }
}

impl<S> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("host", &self.host)
            .field("apop", &self.timestamp.is_some())
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
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_banner_sets_connected() {
        let mock = Builder::new().read(b"+OK POP3 ready\r\n").build();
        let client = Client::from_stream(mock).await.unwrap();
        assert_eq!(client.state(), SessionState::Connected);
        assert!(!client.supports_apop());
    }

    #[tokio::test]
    async fn test_banner_timestamp_captured() {
        let mock = Builder::new()
            .read(b"+OK ready <1896.697170952@dbc.mtview.ca.us>\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        assert!(client.supports_apop());
    }

    #[tokio::test]
    async fn test_login_success() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"USER joe\r\n")
            .read(b"+OK send PASS\r\n")
            .write(b"PASS hunter2\r\n")
            .read(b"+OK maildrop locked\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.login("joe", "hunter2").await.unwrap();
        assert_eq!(client.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_login_bad_password_keeps_state() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"USER joe\r\n")
            .read(b"+OK send PASS\r\n")
            .write(b"PASS wrong\r\n")
            .read(b"-ERR invalid password\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        let result = client.login("joe", "wrong").await;
        assert!(matches!(result, Err(Error::Server(_))));
        assert_eq!(client.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_retr_requires_authenticated() {
        let mock = Builder::new().read(b"+OK ready\r\n").build();
        let mut client = Client::from_stream(mock).await.unwrap();

        let result = client.retr(1).await;
        match result {
            Err(Error::InvalidState { expected, actual }) => {
                assert_eq!(expected, SessionState::Authenticated);
                assert_eq!(actual, SessionState::Connected);
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stat() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"USER u\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS p\r\n")
            .read(b"+OK\r\n")
            .write(b"STAT\r\n")
            .read(b"+OK 2 320\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.login("u", "p").await.unwrap();
        let stat = client.stat().await.unwrap();
        assert_eq!(stat, StatInfo { count: 2, size: 320 });
    }

    #[tokio::test]
    async fn test_retr_unstuffs_dots() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"USER u\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS p\r\n")
            .read(b"+OK\r\n")
            .write(b"RETR 1\r\n")
            .read(b"+OK 26 octets\r\nSubject: hi\r\n\r\n..dot\r\n.\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.login("u", "p").await.unwrap();
        let raw = client.retr(1).await.unwrap();
        assert_eq!(raw, b"Subject: hi\r\n\r\n.dot\r\n");
    }

    #[tokio::test]
    async fn test_list_parses_entries() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"USER u\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS p\r\n")
            .read(b"+OK\r\n")
            .write(b"LIST\r\n")
            .read(b"+OK 2 messages\r\n1 120\r\n2 200\r\n.\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.login("u", "p").await.unwrap();
        let entries = client.list().await.unwrap();
        assert_eq!(
            entries,
            vec![
                ListEntry { msg: 1, size: 120 },
                ListEntry { msg: 2, size: 200 },
            ]
        );
    }

    #[tokio::test]
    async fn test_capa_and_sasl_offer() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK capability list\r\nUSER\r\nSASL PLAIN SCRAM-SHA-256\r\nUIDL\r\n.\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        let caps = client.capa().await.unwrap();
        assert_eq!(caps.len(), 3);
        assert_eq!(client.sasl_mechanisms(), vec!["PLAIN", "SCRAM-SHA-256"]);
    }

    #[tokio::test]
    async fn test_authenticate_plain() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nSASL PLAIN\r\n.\r\n")
            .write(b"AUTH PLAIN AGpvZQBodW50ZXIy\r\n")
            .read(b"+OK authenticated\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.capa().await.unwrap();
        client
            .authenticate(&Credentials::password("joe", "hunter2"))
            .await
            .unwrap();
        assert_eq!(client.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_authenticate_login_challenges() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nSASL LOGIN\r\n.\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"+ VXNlcm5hbWU6\r\n")
            .write(b"am9l\r\n")
            .read(b"+ UGFzc3dvcmQ6\r\n")
            .write(b"aHVudGVyMg==\r\n")
            .read(b"+OK authenticated\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.capa().await.unwrap();
        client
            .authenticate(&Credentials::password("joe", "hunter2"))
            .await
            .unwrap();
        assert_eq!(client.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_authenticate_rejected_keeps_session() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nSASL PLAIN\r\n.\r\n")
            .write(b"AUTH PLAIN AGpvZQB3cm9uZw==\r\n")
            .read(b"-ERR [AUTH] invalid credentials\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.capa().await.unwrap();
        let result = client
            .authenticate(&Credentials::password("joe", "wrong"))
            .await;
        assert!(matches!(result, Err(Error::Server(_))));
        assert_eq!(client.state(), SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_times_out() {
        use tokio::io::AsyncWriteExt as _;

        let (client_io, mut server_io) = tokio::io::duplex(1024);
        server_io.write_all(b"+OK ready\r\n").await.unwrap();

        let mut client = Client::from_stream(client_io).await.unwrap();
        client.set_command_timeout(Some(Duration::from_millis(500)));

        let result = client.noop().await;
        assert!(matches!(
            result,
            Err(Error::Net(postwire_net::Error::Timeout(_)))
        ));
        drop(server_io);
    }

    #[tokio::test]
    async fn test_closed_connection_is_not_timeout() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"NOOP\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        let result = client.noop().await;
        assert!(matches!(
            result,
            Err(Error::Net(postwire_net::Error::ConnectionClosed))
        ));
    }
}
