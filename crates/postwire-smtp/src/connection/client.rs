//! Async SMTP client.
//!
//! One client owns one connection; operations take `&mut self`, so the
//! borrow checker serializes callers and command bytes are never
//! interleaved on the wire. Every response wait runs under the
//! configured deadline.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use postwire_net::{MailStream, ProtocolLog, deadline};
use postwire_sasl::{Credentials, Mechanism, Negotiation};

use super::ServerInfo;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::ReplyDecoder;
use crate::state::SessionState;
use crate::types::{Reply, ReplyCode};

/// Default timeout for a single command's response.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Read buffer size.
const READ_BUFFER_SIZE: usize = 8192;

/// Async SMTP client.
pub struct Client<S = MailStream> {
    stream: S,
    decoder: ReplyDecoder,
    queued: VecDeque<Reply>,
    state: SessionState,
    server: ServerInfo,
    command_timeout: Option<Duration>,
    log: ProtocolLog,
    /// DNS name used to connect; needed again for the STARTTLS upgrade.
    host: String,
    /// TLS channel-binding bytes, refreshed after TLS establishment.
    channel_binding: Option<Vec<u8>>,
    /// Hostname from the last EHLO, replayed after STARTTLS.
    last_ehlo: Option<String>,
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
    /// Returns an error if the connection, TLS handshake or greeting
    /// fails.
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
    /// If an EHLO was issued before the upgrade it is replayed, since
    /// the extension set may change under TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not advertised, the server
    /// rejects it, or the handshake fails.
    pub async fn starttls(mut self) -> Result<Self> {
        self.state.require(SessionState::Connected)?;
        if !self.server.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".to_string()));
        }
        if self.host.is_empty() {
            return Err(Error::Protocol(
                "server host unknown, cannot upgrade to TLS".to_string(),
            ));
        }

        let reply = self.command(&Command::StartTls).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(Error::from_reply(&reply));
        }

        self.stream = self.stream.upgrade_to_tls(&self.host).await?;
        self.channel_binding = self.stream.channel_binding();
        // Pre-TLS state must not be trusted.
        self.decoder = ReplyDecoder::new();
        self.queued.clear();
        self.server.extensions.clear();

        if let Some(hostname) = self.last_ehlo.clone() {
            self.ehlo(&hostname).await?;
        }

        Ok(self)
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream and reads the greeting
    /// (`220`).
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is missing or negative.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut client = Self {
            stream,
            decoder: ReplyDecoder::new(),
            queued: VecDeque::new(),
            state: SessionState::Disconnected,
            server: ServerInfo::default(),
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
            log: ProtocolLog::null(),
            host: String::new(),
            channel_binding: None,
            last_ehlo: None,
        };

        let greeting = client.read_reply().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::from_reply(&greeting));
        }
        if let Some(first) = greeting.message.first() {
            if let Some(name) = first.split_whitespace().next() {
                client.server.hostname = name.to_string();
            }
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

    /// Sets the per-command response timeout. `None` disables it.
    pub fn set_command_timeout(&mut self, timeout: Option<Duration>) {
        self.command_timeout = timeout;
    }

    /// Installs a protocol logger.
    pub fn set_logger(&mut self, log: ProtocolLog) {
        self.log = log;
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if issued while disconnected or the server
    /// rejects the greeting.
    pub async fn ehlo(&mut self, hostname: &str) -> Result<()> {
        self.state.require_open()?;

        let reply = self
            .command(&Command::Ehlo {
                hostname: hostname.to_string(),
            })
            .await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }

        self.server.update_from_ehlo(&reply.message);
        self.last_ehlo = Some(hostname.to_string());
        Ok(())
    }

    /// Authenticates with the strongest SASL mechanism both sides
    /// support.
    ///
    /// Channel-binding data extracted from the transport is attached
    /// automatically, making the SCRAM `-PLUS` variants eligible on TLS
    /// connections.
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

        let offered = self.server.auth_mechanisms();
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

    /// Runs the challenge/response loop for one mechanism.
    async fn drive_sasl(&mut self, mechanism: Mechanism, credentials: &Credentials) -> Result<()> {
        let mut negotiation = Negotiation::new(mechanism, credentials)?;
        let initial_response = negotiation.initial_response()?;

        let mut reply = self
            .command(&Command::Auth {
                mechanism: mechanism.as_str().to_string(),
                initial_response,
            })
            .await?;

        loop {
            if reply.code == ReplyCode::AUTH_CONTINUE {
                let challenge = reply.message.first().map_or("", String::as_str);
                match negotiation.respond(challenge) {
                    Ok(answer) => {
                        let mut line = answer.into_bytes();
                        line.extend_from_slice(b"\r\n");
                        self.write_all(&line).await?;
                        reply = self.read_reply().await?;
                    }
                    Err(err) => {
                        // Abort the exchange; the server still owes a
                        // terminal reply, which we drain so the session
                        // stays consistent for a retry.
                        self.write_all(b"*\r\n").await?;
                        let _ = self.read_reply().await;
                        return Err(err.into());
                    }
                }
            } else if reply.is_success() {
                if !negotiation.is_complete() {
                    // Some servers carry the final SCRAM proof in the
                    // success reply's text.
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
    pub async fn mail_from(&mut self, from: &crate::types::Address) -> Result<()> {
        self.state.require_ready()?;
        let reply = self
            .command(&Command::MailFrom {
                from: from.clone(),
                body: None,
                size: None,
            })
            .await?;
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
    pub async fn rcpt_to(&mut self, to: &crate::types::Address) -> Result<()> {
        self.state.require_ready()?;
        let reply = self.command(&Command::RcptTo { to: to.clone() }).await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(())
    }

    /// Sends the message body, ending the transaction.
    ///
    /// Issues DATA, normalizes line endings to CRLF, dot-stuffs lines
    /// starting with `.`, and appends the terminating `.` line.
    ///
    /// # Errors
    ///
    /// Returns an error if DATA is refused or the message is rejected.
    pub async fn send_message(&mut self, message: &[u8]) -> Result<Reply> {
        self.state.require_ready()?;

        let reply = self.command(&Command::Data).await?;
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
        self.write_all(&body).await?;

        let reply = self.read_reply().await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(reply)
    }

    /// Resets the current mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects RSET.
    pub async fn rset(&mut self) -> Result<()> {
        self.state.require_open()?;
        let reply = self.command(&Command::Rset).await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
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
        let reply = self.command(&Command::Noop).await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(())
    }

    /// Sends QUIT best-effort, then closes the transport regardless of
    /// the outcome.
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

    /// Serializes a command, writes it, and awaits the reply.
    async fn command(&mut self, cmd: &Command) -> Result<Reply> {
        let bytes = cmd.serialize();
        self.write_all(&bytes).await?;
        self.read_reply().await
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

    /// Awaits the next reply under the configured deadline.
    async fn read_reply(&mut self) -> Result<Reply> {
        if let Some(reply) = self.queued.pop_front() {
            return Ok(reply);
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
                if let Some(reply) = queued.pop_front() {
                    return Ok(reply);
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
            .field("hostname", &self.server.hostname)
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
    async fn test_greeting_sets_connected() {
        let mock = Builder::new().read(b"220 mail.example.com ESMTP\r\n").build();
        let client = Client::from_stream(mock).await.unwrap();
        assert_eq!(client.state(), SessionState::Connected);
        assert_eq!(client.server_info().hostname, "mail.example.com");
    }

    #[tokio::test]
    async fn test_negative_greeting_fails() {
        let mock = Builder::new().read(b"554 go away\r\n").build();
        let result = Client::from_stream(mock).await;
        assert!(matches!(result, Err(Error::Server { code: 554, .. })));
    }

    #[tokio::test]
    async fn test_ehlo_discovers_extensions() {
        let mock = Builder::new()
            .read(b"220 mail.example.com ESMTP\r\n")
            .write(b"EHLO client.test\r\n")
            .read(b"250-mail.example.com\r\n250-PIPELINING\r\n250 AUTH PLAIN LOGIN\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.ehlo("client.test").await.unwrap();

        assert_eq!(
            client.server_info().auth_mechanisms(),
            vec!["PLAIN", "LOGIN"]
        );
    }

    #[tokio::test]
    async fn test_mail_from_requires_connection() {
        let mock = Builder::new().read(b"220 ok\r\n").build();
        let mut client = Client::from_stream(mock).await.unwrap();
        client.state = SessionState::Disconnected;

        let from = crate::types::Address::new("a@b.com").unwrap();
        let result = client.mail_from(&from).await;
        assert!(matches!(result, Err(Error::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_authenticate_plain() {
        let mock = Builder::new()
            .read(b"220 mail.example.com\r\n")
            .write(b"EHLO me\r\n")
            .read(b"250-mail.example.com\r\n250 AUTH PLAIN\r\n")
            .write(b"AUTH PLAIN AGpvZQBodW50ZXIy\r\n")
            .read(b"235 2.7.0 Accepted\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.ehlo("me").await.unwrap();
        client
            .authenticate(&Credentials::password("joe", "hunter2"))
            .await
            .unwrap();
        assert_eq!(client.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_authenticate_no_supported_mechanism() {
        let mock = Builder::new()
            .read(b"220 mail.example.com\r\n")
            .write(b"EHLO me\r\n")
            .read(b"250-mail.example.com\r\n250 AUTH GSSAPI NTLM\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.ehlo("me").await.unwrap();
        let result = client
            .authenticate(&Credentials::password("joe", "hunter2"))
            .await;
        assert!(matches!(
            result,
            Err(Error::Sasl(postwire_sasl::Error::NoSupportedMechanism))
        ));
        // Failure leaves the session usable.
        assert_eq!(client.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let mock = Builder::new()
            .read(b"220 mail.example.com\r\n")
            .write(b"EHLO me\r\n")
            .read(b"250-mail.example.com\r\n250 AUTH PLAIN\r\n")
            .write(b"AUTH PLAIN AGpvZQBiYWQ=\r\n")
            .read(b"535 5.7.8 Authentication credentials invalid\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.ehlo("me").await.unwrap();
        let result = client
            .authenticate(&Credentials::password("joe", "bad"))
            .await;

        match result {
            Err(Error::Server { code, enhanced, .. }) => {
                assert_eq!(code, 535);
                assert_eq!(enhanced.unwrap().to_string(), "5.7.8");
            }
            other => panic!("expected server rejection, got {other:?}"),
        }
        assert_eq!(client.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_send_message_dot_stuffing() {
        let mock = Builder::new()
            .read(b"220 mail.example.com\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"Subject: hi\r\n\r\n..leading dot\r\nbody\r\n.\r\n")
            .read(b"250 2.0.0 queued\r\n")
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        let reply = client
            .send_message(b"Subject: hi\r\n\r\n.leading dot\r\nbody")
            .await
            .unwrap();
        assert!(reply.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_times_out() {
        use tokio::io::AsyncWriteExt as _;

        // A duplex pipe where the server side never answers keeps the
        // connection open without producing bytes.
        let (client_io, mut server_io) = tokio::io::duplex(1024);
        server_io.write_all(b"220 mail.example.com\r\n").await.unwrap();

        let mut client = Client::from_stream(client_io).await.unwrap();
        client.set_command_timeout(Some(Duration::from_secs(5)));

        let result = client.noop().await;
        assert!(matches!(
            result,
            Err(Error::Net(postwire_net::Error::Timeout(d))) if d == Duration::from_secs(5)
        ));
        // The connection was not torn down by the lost race.
        drop(server_io);
    }

    #[tokio::test]
    async fn test_closed_connection_is_not_timeout() {
        let mock = Builder::new()
            .read(b"220 mail.example.com\r\n")
            .write(b"NOOP\r\n")
            // Stream ends: read returns 0.
            .build();

        let mut client = Client::from_stream(mock).await.unwrap();
        client.set_command_timeout(Some(Duration::from_secs(5)));

        let result = client.noop().await;
        assert!(matches!(
            result,
            Err(Error::Net(postwire_net::Error::ConnectionClosed))
        ));
    }
}
