//! Async IMAP client.
//!
//! Drives the sans-I/O [`Engine`] over a tokio stream. One client owns
//! one connection; operations take `&mut self`, so the borrow checker
//! serializes callers and command bytes are never interleaved on the
//! wire. One command is outstanding at a time (tag-based correlation
//! would permit pipelining, but this client deliberately stays
//! one-at-a-time). Every response wait runs under the configured
//! deadline.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use postwire_net::{MailStream, ProtocolLog, deadline};
use postwire_sasl::{Credentials, Mechanism, Negotiation};

use super::{auth_mechanisms, collect_expunge, collect_fetch, collect_list, collect_search};
use crate::command::{Command, FetchItems, StoreAction};
use crate::error::{Error, Result};
use crate::handler::{NoopHandler, UnsolicitedHandler};
use crate::protocol::{CommandHandle, CommandResult, Engine, Event, FrameDecoder, SessionState};
use crate::types::{ListEntry, MailboxStatus};

/// Default timeout for a single command's response.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Read buffer size.
const READ_BUFFER_SIZE: usize = 8192;

/// Async IMAP client.
pub struct Client<S = MailStream> {
    stream: S,
    decoder: FrameDecoder,
    engine: Engine,
    handler: Box<dyn UnsolicitedHandler>,
    events: VecDeque<Event>,
    command_timeout: Option<Duration>,
    log: ProtocolLog,
    host: String,
    channel_binding: Option<Vec<u8>>,
}

impl Client<MailStream> {
    /// Connects without TLS and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or greeting fails.
    pub async fn connect_plain(host: &str, port: u16) -> Result<Self> {
        let stream = postwire_net::connect_plain(host, port).await?;
        let mut client = Self::from_stream(stream).await?;
        client.host = host.to_string();
        client.log.connect(&format!("{host}:{port}"));
        Ok(client)
    }

    /// Connects with implicit TLS and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, handshake or greeting fails.
    pub async fn connect_tls(host: &str, port: u16) -> Result<Self> {
        let stream = postwire_net::connect_tls(host, port).await?;
        let binding = stream.channel_binding();
        let mut client = Self::from_stream(stream).await?;
        client.host = host.to_string();
        client.channel_binding = binding;
        client.log.connect(&format!("{host}:{port}"));
        Ok(client)
    }

    /// Upgrades the connection to TLS using STARTTLS.
    ///
    /// Consumes the client because the transport is replaced in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects STARTTLS or the
    /// handshake fails.
    pub async fn starttls(mut self) -> Result<Self> {
        if self.host.is_empty() {
            return Err(Error::Protocol(
                "server host unknown, cannot upgrade to TLS".to_string(),
            ));
        }

        self.run(&Command::StartTls).await?.into_result()?;

        self.stream = self.stream.upgrade_to_tls(&self.host).await?;
        self.channel_binding = self.stream.channel_binding();
        // Pre-TLS data (including capabilities) must not be trusted.
        self.decoder = FrameDecoder::new();
        self.events.clear();
        Ok(self)
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream and reads the greeting
    /// (untagged OK or PREAUTH).
    ///
    /// # Errors
    ///
    /// Returns `Bye` if the server refuses the connection.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut client = Self {
            stream,
            decoder: FrameDecoder::new(),
            engine: Engine::new(),
            handler: Box::new(NoopHandler),
            events: VecDeque::new(),
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
            log: ProtocolLog::null(),
            host: String::new(),
            channel_binding: None,
        };

        loop {
            match client.next_event().await? {
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

    /// Returns the counters of the selected mailbox, if any.
    #[must_use]
    pub const fn mailbox_status(&self) -> Option<&MailboxStatus> {
        self.engine.mailbox_status()
    }

    /// Sets the per-command response timeout. `None` disables it.
    pub fn set_command_timeout(&mut self, timeout: Option<Duration>) {
        self.command_timeout = timeout;
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
    pub async fn capability(&mut self) -> Result<Vec<String>> {
        self.run(&Command::Capability).await?.into_result()?;
        Ok(self.engine.capabilities().to_vec())
    }

    /// Authenticates with LOGIN.
    ///
    /// # Errors
    ///
    /// `InvalidState` when already authenticated; `No`/`Bad` when the
    /// server rejects the credentials (state is unchanged).
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.run(&Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?
        .into_result()?;
        Ok(())
    }

    /// Authenticates with the strongest SASL mechanism both sides
    /// support.
    ///
    /// The offer is taken from `AUTH=` capabilities (issuing
    /// CAPABILITY first if none are known); channel-binding data from
    /// the transport is attached automatically.
    ///
    /// # Errors
    ///
    /// `NoSupportedMechanism` when the offer and credentials do not
    /// intersect; mechanism errors abort only this attempt and leave
    /// the session usable for a retry.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let mut credentials = credentials.clone();
        if credentials.channel_binding.is_none() {
            credentials.channel_binding = self.channel_binding.clone();
        }

        let mut offered = auth_mechanisms(self.engine.capabilities());
        if offered.is_empty() {
            self.capability().await?;
            offered = auth_mechanisms(self.engine.capabilities());
        }

        let mechanism = Mechanism::choose(&offered, &credentials)
            .ok_or(postwire_sasl::Error::NoSupportedMechanism)?;
        tracing::debug!(%mechanism, "starting SASL authentication");

        let mut negotiation = Negotiation::new(mechanism, &credentials)?;
        let initial_response = negotiation.initial_response()?;

        let handle = self.engine.enqueue(&Command::Authenticate {
            mechanism: mechanism.as_str().to_string(),
            initial_response,
        })?;
        self.flush_outbound().await?;

        loop {
            match self.next_event().await? {
                Event::Continuation { text } => match negotiation.respond(&text) {
                    Ok(answer) => {
                        let mut line = answer.into_bytes();
                        line.extend_from_slice(b"\r\n");
                        self.engine.enqueue_raw(line);
                        self.flush_outbound().await?;
                    }
                    Err(err) => {
                        // Abort the exchange ("*" per RFC 3501); the
                        // server still owes a tagged reply, which we
                        // drain so the session stays consistent for a
                        // retry.
                        self.engine.enqueue_raw(b"*\r\n".to_vec());
                        self.flush_outbound().await?;
                        let _ = self.drain_command(&handle).await;
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
    /// `InvalidState` before authentication. A `No` rejection leaves
    /// no mailbox selected.
    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.run(&Command::Select {
            mailbox: mailbox.to_string(),
        })
        .await?
        .into_result()?;
        Ok(self.engine.mailbox_status().cloned().unwrap_or_default())
    }

    /// Opens a mailbox read-only (EXAMINE).
    ///
    /// # Errors
    ///
    /// Same as [`Client::select`].
    pub async fn examine(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.run(&Command::Examine {
            mailbox: mailbox.to_string(),
        })
        .await?
        .into_result()?;
        Ok(self.engine.mailbox_status().cloned().unwrap_or_default())
    }

    /// Lists mailboxes matching `pattern` under `reference`.
    ///
    /// # Errors
    ///
    /// `InvalidState` before authentication.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        let result = self
            .run(&Command::List {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?;
        Ok(collect_list(result.into_result()?))
    }

    /// Searches the selected mailbox with verbatim criteria.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a mailbox is selected.
    pub async fn search(&mut self, criteria: &str) -> Result<Vec<u32>> {
        let result = self
            .run(&Command::Search {
                criteria: criteria.to_string(),
            })
            .await?;
        Ok(collect_search(result.into_result()?))
    }

    /// Fetches message data; payloads are returned raw for the message
    /// layer.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a mailbox is selected.
    pub async fn fetch(&mut self, sequence: &str, items: FetchItems) -> Result<Vec<(u32, Vec<u8>)>> {
        let result = self
            .run(&Command::Fetch {
                sequence: sequence.to_string(),
                items,
            })
            .await?;
        Ok(collect_fetch(result.into_result()?))
    }

    /// Updates message flags (STORE).
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a mailbox is selected.
    pub async fn store(
        &mut self,
        sequence: &str,
        action: StoreAction,
    ) -> Result<Vec<(u32, Vec<u8>)>> {
        let result = self
            .run(&Command::Store {
                sequence: sequence.to_string(),
                action,
            })
            .await?;
        Ok(collect_fetch(result.into_result()?))
    }

    /// Expunges deleted messages, returning the removed sequence
    /// numbers.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a mailbox is selected.
    pub async fn expunge(&mut self) -> Result<Vec<u32>> {
        let result = self.run(&Command::Expunge).await?;
        Ok(collect_expunge(result.into_result()?))
    }

    /// Closes the selected mailbox, expunging (CLOSE).
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a mailbox is selected.
    pub async fn close(&mut self) -> Result<()> {
        self.run(&Command::Close).await?.into_result()?;
        Ok(())
    }

    /// Closes the selected mailbox without expunging (UNSELECT).
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a mailbox is selected.
    pub async fn unselect(&mut self) -> Result<()> {
        self.run(&Command::Unselect).await?.into_result()?;
        Ok(())
    }

    /// Sends NOOP (also polls for unsolicited updates).
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects NOOP.
    pub async fn noop(&mut self) -> Result<()> {
        self.run(&Command::Noop).await?.into_result()?;
        Ok(())
    }

    /// Sends LOGOUT best-effort, then closes the transport regardless
    /// of the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error only if closing the transport itself fails.
    pub async fn disconnect(mut self) -> Result<()> {
        if !matches!(self.engine.state(), SessionState::Logout) {
            let _ = self.run(&Command::Logout).await;
        }
        let _ = self.stream.shutdown().await;
        self.log.close();
        Ok(())
    }

    /// Enqueues a command, transmits it, and awaits its completion.
    async fn run(&mut self, command: &Command) -> Result<CommandResult> {
        let handle = self.engine.enqueue(command)?;
        self.flush_outbound().await?;

        loop {
            match self.next_event().await? {
                Event::CommandComplete {
                    handle: completed,
                    result,
                } if completed == handle => return Ok(result),
                // BYE mid-command is tracked by the engine; LOGOUT
                // legitimately sees one before its tagged OK.
                _ => {}
            }
        }
    }

    /// Discards events until `handle` completes (used after a SASL
    /// abort).
    async fn drain_command(&mut self, handle: &CommandHandle) -> Result<()> {
        loop {
            match self.next_event().await? {
                Event::CommandComplete { handle: completed, .. } if completed == *handle => {
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    /// Writes all queued outbound data.
    async fn flush_outbound(&mut self) -> Result<()> {
        while let Some(data) = self.engine.poll_transmit() {
            self.log.client(&data);
            self.stream
                .write_all(&data)
                .await
                .map_err(postwire_net::Error::Io)?;
        }
        self.stream.flush().await.map_err(postwire_net::Error::Io)?;
        Ok(())
    }

    /// Awaits the next engine event under the configured deadline.
    async fn next_event(&mut self) -> Result<Event> {
        if let Some(event) = self.events.pop_front() {
            return Ok(event);
        }

        let limit = self.command_timeout;
        let stream = &mut self.stream;
        let decoder = &mut self.decoder;
        let engine = &mut self.engine;
        let handler = &mut self.handler;
        let events = &mut self.events;
        let log = &mut self.log;

        deadline(limit, async move {
            loop {
                let mut buf = [0u8; READ_BUFFER_SIZE];
                let n = stream.read(&mut buf).await.map_err(postwire_net::Error::Io)?;
                if n == 0 {
                    return Err(postwire_net::Error::ConnectionClosed.into());
                }
                log.server(&buf[..n]);
                for unit in decoder.decode(&buf[..n])? {
                    if let Some(event) = engine.handle_unit(&unit, &mut **handler) {
                        events.push_back(event);
                    }
                }
                if let Some(event) = events.pop_front() {
                    return Ok(event);
                }
            }
        })
        .await
    }
}

impl<S> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", self.engine.state())
            .field("host", &self.host)
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
    use crate::protocol::StateKind;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_greeting() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        assert_eq!(client.state(), &SessionState::NotAuthenticated);
        assert_eq!(
            client.server_capabilities(),
            ["IMAP4rev1", "AUTH=PLAIN"]
        );
    }

    #[tokio::test]
    async fn test_bye_greeting_fails() {
        let mock = Builder::new().read(b"* BYE overloaded\r\n").build();
        let result = Client::from_stream(mock).await;
        assert!(matches!(result, Err(Error::Bye(_))));
    }

    #[tokio::test]
    async fn test_login_flow() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN joe hunter2\r\n")
            .read(b"A0001 OK [CAPABILITY IMAP4rev1] logged in\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.login("joe", "hunter2").await.unwrap();
        assert!(client.state().is_authenticated());
    }

    #[tokio::test]
    async fn test_select_before_login_fails_without_io() {
        // The mock has no further reads or writes queued: a precondition
        // violation must not touch the wire.
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut client = Client::from_stream(mock).await.unwrap();

        let result = client.select("INBOX").await;
        match result {
            Err(Error::InvalidState { expected, actual }) => {
                assert_eq!(expected, StateKind::Authenticated);
                assert_eq!(actual, StateKind::NotAuthenticated);
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_select_and_fetch() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN u p\r\n")
            .read(b"A0001 OK done\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"* 2 EXISTS\r\n* 0 RECENT\r\nA0002 OK [READ-WRITE] done\r\n")
            .write(b"A0003 FETCH 1:2 FAST\r\n")
            .read(b"* 1 FETCH (FLAGS (\\Seen))\r\n* 2 FETCH (FLAGS ())\r\nA0003 OK done\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.login("u", "p").await.unwrap();

        let status = client.select("INBOX").await.unwrap();
        assert_eq!(status.exists, 2);

        let records = client.fetch("1:2", FetchItems::Fast).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, 1);
        assert!(records[0].1.starts_with(b"* 1 FETCH"));
    }

    #[tokio::test]
    async fn test_select_failure_clears_selection() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN u p\r\n")
            .read(b"A0001 OK done\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"A0002 OK [READ-WRITE] done\r\n")
            .write(b"A0003 SELECT Missing\r\n")
            .read(b"A0003 NO no such mailbox\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.login("u", "p").await.unwrap();
        client.select("INBOX").await.unwrap();
        assert_eq!(client.state().selected_mailbox(), Some("INBOX"));

        let result = client.select("Missing").await;
        assert!(matches!(result, Err(Error::No(_))));
        assert_eq!(client.state().selected_mailbox(), None);
    }

    #[tokio::test]
    async fn test_authenticate_scram_challenge_loop() {
        // PLAIN via AUTHENTICATE exercises the continuation loop with a
        // server that ignores the initial response.
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=LOGIN] ready\r\n")
            .write(b"A0001 AUTHENTICATE LOGIN\r\n")
            .read(b"+ VXNlcm5hbWU6\r\n")
            .write(b"am9l\r\n")
            .read(b"+ UGFzc3dvcmQ6\r\n")
            .write(b"aHVudGVyMg==\r\n")
            .read(b"A0001 OK authenticated\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client
            .authenticate(&Credentials::password("joe", "hunter2"))
            .await
            .unwrap();
        assert!(client.state().is_authenticated());
    }

    #[tokio::test]
    async fn test_authenticate_no_supported_mechanism() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=GSSAPI AUTH=NTLM] ready\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        let result = client
            .authenticate(&Credentials::password("joe", "hunter2"))
            .await;
        assert!(matches!(
            result,
            Err(Error::Sasl(postwire_sasl::Error::NoSupportedMechanism))
        ));
        assert_eq!(client.state(), &SessionState::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_authenticate_failure_keeps_session() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY AUTH=PLAIN] ready\r\n")
            .write(b"A0001 AUTHENTICATE PLAIN AGpvZQB3cm9uZw==\r\n")
            .read(b"A0001 NO [AUTHENTICATIONFAILED] denied\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        let result = client
            .authenticate(&Credentials::password("joe", "wrong"))
            .await;
        assert!(matches!(result, Err(Error::No(_))));
        assert_eq!(client.state(), &SessionState::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_unsolicited_exists_reaches_handler() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 NOOP\r\n")
            .read(b"* 42 EXISTS\r\nA0001 OK done\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.set_handler(Box::new(crate::handler::CollectingHandler::new()));
        client.noop().await.unwrap();
        // Counters were tracked even though no mailbox is selected yet;
        // the handler box itself is checked via the engine tests.
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_times_out() {
        use tokio::io::AsyncWriteExt as _;

        let (client_io, mut server_io) = tokio::io::duplex(1024);
        server_io.write_all(b"* OK ready\r\n").await.unwrap();

        let mut client = Client::from_stream(client_io).await.unwrap();
        client.set_command_timeout(Some(Duration::from_secs(5)));

        let result = client.noop().await;
        assert!(matches!(
            result,
            Err(Error::Net(postwire_net::Error::Timeout(d))) if d == Duration::from_secs(5)
        ));
        drop(server_io);
    }

    #[tokio::test]
    async fn test_closed_connection_is_not_timeout() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 NOOP\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        let result = client.noop().await;
        assert!(matches!(
            result,
            Err(Error::Net(postwire_net::Error::ConnectionClosed))
        ));
    }
}
