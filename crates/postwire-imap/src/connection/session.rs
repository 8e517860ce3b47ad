//! Concurrent session handle.
//!
//! A [`Session`] wraps a [`Client`] in a dedicated tokio task that
//! exclusively owns every piece of mutable session state (tag counter,
//! state machine, in-flight command). Callers hold cheap cloneable
//! handles and talk to the task over an mpsc channel with oneshot
//! replies, so concurrent logical operations are serialized onto the
//! single outstanding command per connection.
//!
//! Dropping a waiting caller abandons only that caller's reply; the
//! task and the transport keep running. Dropping every handle makes
//! the task disconnect politely.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

use postwire_sasl::Credentials;

use super::client::Client;
use crate::command::FetchItems;
use crate::error::{Error, Result};
use crate::types::{ListEntry, MailboxStatus};

/// Depth of the request queue shared by all handles.
const REQUEST_QUEUE_DEPTH: usize = 32;

/// A request from a handle to the session task.
enum Request {
    Login {
        username: String,
        password: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Authenticate {
        credentials: Box<Credentials>,
        reply: oneshot::Sender<Result<()>>,
    },
    Select {
        mailbox: String,
        reply: oneshot::Sender<Result<MailboxStatus>>,
    },
    List {
        reference: String,
        pattern: String,
        reply: oneshot::Sender<Result<Vec<ListEntry>>>,
    },
    Search {
        criteria: String,
        reply: oneshot::Sender<Result<Vec<u32>>>,
    },
    Fetch {
        sequence: String,
        items: FetchItems,
        reply: oneshot::Sender<Result<Vec<(u32, Vec<u8>)>>>,
    },
    Noop {
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Cloneable handle to a session task.
#[derive(Clone)]
pub struct Session {
    tx: mpsc::Sender<Request>,
}

impl Session {
    /// Connects with implicit TLS and spawns the session task.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or greeting fails.
    pub async fn connect_tls(host: &str, port: u16) -> Result<Self> {
        let client = Client::connect_tls(host, port).await?;
        Ok(Self::spawn(client))
    }

    /// Connects without TLS and spawns the session task.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or greeting fails.
    pub async fn connect_plain(host: &str, port: u16) -> Result<Self> {
        let client = Client::connect_plain(host, port).await?;
        Ok(Self::spawn(client))
    }

    /// Wraps an already-connected client in a session task.
    #[must_use]
    pub fn spawn<S>(client: Client<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        tokio::spawn(run(client, rx));
        Self { tx }
    }

    /// Authenticates with LOGIN.
    ///
    /// # Errors
    ///
    /// See [`Client::login`]; additionally `SessionClosed` if the task
    /// is gone.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.request(|reply| Request::Login {
            username: username.to_string(),
            password: password.to_string(),
            reply,
        })
        .await
    }

    /// Authenticates with the strongest supported SASL mechanism.
    ///
    /// # Errors
    ///
    /// See [`Client::authenticate`]; additionally `SessionClosed` if
    /// the task is gone.
    pub async fn authenticate(&self, credentials: Credentials) -> Result<()> {
        self.request(|reply| Request::Authenticate {
            credentials: Box::new(credentials),
            reply,
        })
        .await
    }

    /// Selects a mailbox read-write.
    ///
    /// # Errors
    ///
    /// See [`Client::select`].
    pub async fn select(&self, mailbox: &str) -> Result<MailboxStatus> {
        self.request(|reply| Request::Select {
            mailbox: mailbox.to_string(),
            reply,
        })
        .await
    }

    /// Lists mailboxes matching `pattern` under `reference`.
    ///
    /// # Errors
    ///
    /// See [`Client::list`].
    pub async fn list(&self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        self.request(|reply| Request::List {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
            reply,
        })
        .await
    }

    /// Searches the selected mailbox with verbatim criteria.
    ///
    /// # Errors
    ///
    /// See [`Client::search`].
    pub async fn search(&self, criteria: &str) -> Result<Vec<u32>> {
        self.request(|reply| Request::Search {
            criteria: criteria.to_string(),
            reply,
        })
        .await
    }

    /// Fetches message data; payloads are returned raw.
    ///
    /// # Errors
    ///
    /// See [`Client::fetch`].
    pub async fn fetch(&self, sequence: &str, items: FetchItems) -> Result<Vec<(u32, Vec<u8>)>> {
        self.request(|reply| Request::Fetch {
            sequence: sequence.to_string(),
            items,
            reply,
        })
        .await
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// See [`Client::noop`].
    pub async fn noop(&self) -> Result<()> {
        self.request(|reply| Request::Noop { reply }).await
    }

    /// Logs out and terminates the session task.
    ///
    /// # Errors
    ///
    /// `SessionClosed` if the task is already gone.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Request::Disconnect { reply }).await
    }

    /// Sends a request and awaits the oneshot reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> Request,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        reply_rx.await.map_err(|_| Error::SessionClosed)?
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// The session task: sole owner of the client, serializing requests.
async fn run<S>(mut client: Client<S>, mut rx: mpsc::Receiver<Request>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    while let Some(request) = rx.recv().await {
        // A dropped reply receiver means the caller stopped waiting;
        // the command outcome is discarded but the connection lives on.
        match request {
            Request::Login {
                username,
                password,
                reply,
            } => {
                let _ = reply.send(client.login(&username, &password).await);
            }
            Request::Authenticate { credentials, reply } => {
                let _ = reply.send(client.authenticate(&credentials).await);
            }
            Request::Select { mailbox, reply } => {
                let _ = reply.send(client.select(&mailbox).await);
            }
            Request::List {
                reference,
                pattern,
                reply,
            } => {
                let _ = reply.send(client.list(&reference, &pattern).await);
            }
            Request::Search { criteria, reply } => {
                let _ = reply.send(client.search(&criteria).await);
            }
            Request::Fetch {
                sequence,
                items,
                reply,
            } => {
                let _ = reply.send(client.fetch(&sequence, items).await);
            }
            Request::Noop { reply } => {
                let _ = reply.send(client.noop().await);
            }
            Request::Disconnect { reply } => {
                let _ = reply.send(client.disconnect().await);
                return;
            }
        }
    }

    // Every handle is gone; leave the server politely.
    let _ = client.disconnect().await;
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
    async fn test_session_serializes_operations() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN u p\r\n")
            .read(b"A0001 OK done\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\nA0002 OK [READ-WRITE] done\r\n")
            .write(b"A0003 LOGOUT\r\n")
            .read(b"* BYE bye\r\nA0003 OK bye\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let session = Session::spawn(client);

        session.login("u", "p").await.unwrap();
        let status = session.select("INBOX").await.unwrap();
        assert_eq!(status.exists, 3);
        session.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_connection() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 NOOP\r\n")
            .read(b"A0001 OK done\r\n")
            .write(b"A0002 NOOP\r\n")
            .read(b"A0002 OK done\r\n")
            .write(b"A0003 LOGOUT\r\n")
            .read(b"A0003 OK bye\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let session = Session::spawn(client);
        let other = session.clone();

        // Two handles, two noops: the task serializes them onto one
        // outstanding command at a time.
        let (a, b) = tokio::join!(session.noop(), other.noop());
        a.unwrap();
        b.unwrap();

        session.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_after_disconnect_errors() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGOUT\r\n")
            .read(b"A0001 OK bye\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let session = Session::spawn(client);
        session.disconnect().await.unwrap();

        // Give the task a moment to wind down.
        tokio::task::yield_now().await;
        let result = session.noop().await;
        assert!(matches!(result, Err(Error::SessionClosed)));
    }
}
