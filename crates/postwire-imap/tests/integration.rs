//! Integration tests for the IMAP client.
//!
//! These tests use a mock stream to simulate IMAP server responses
//! without requiring a real server connection.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use postwire_imap::{Client, Error, FetchItems, Session, SessionState, StateKind, StoreAction};
use postwire_sasl::Credentials;

/// Mock stream that returns predefined responses and captures the
/// commands the client sends.
struct MockStream {
    responses: Cursor<Vec<u8>>,
    sent: Vec<u8>,
}

impl MockStream {
    fn new(responses: &[u8]) -> Self {
        Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Vec::new(),
        }
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let pos = usize::try_from(self.responses.position()).unwrap_or(usize::MAX);
        let data = self.responses.get_ref();

        if pos >= data.len() {
            // Scripted data exhausted: the "server" has closed.
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        // Deliver at most one line per read. A real server never sends a
        // command's tagged response before it has received the command,
        // so the whole script must not arrive in a single read — otherwise
        // the greeting read would swallow every later response at once.
        let line_len = remaining
            .iter()
            .position(|&b| b == b'\n')
            .map_or(remaining.len(), |i| i + 1);
        let to_read = line_len.min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn full_mailbox_roundtrip() {
    let script = concat!(
        "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n",
        "A0001 OK logged in\r\n",
        "* 2 EXISTS\r\n",
        "* 1 RECENT\r\n",
        "* FLAGS (\\Answered \\Seen \\Deleted)\r\n",
        "* OK [UIDVALIDITY 3857529045] ok\r\n",
        "A0002 OK [READ-WRITE] selected\r\n",
        "* SEARCH 1 2\r\n",
        "A0003 OK search done\r\n",
        "* 1 FETCH (BODY[] {19}\r\nSubject: hi\r\n\r\nyo\r\n)\r\n",
        "A0004 OK fetch done\r\n",
        "* 1 FETCH (FLAGS (\\Seen \\Deleted))\r\n",
        "A0005 OK store done\r\n",
        "* 1 EXPUNGE\r\n",
        "A0006 OK expunged\r\n",
    );

    let mut client = Client::from_stream(MockStream::new(script.as_bytes()))
        .await
        .unwrap();

    client.login("joe", "hunter2").await.unwrap();
    assert!(client.state().is_authenticated());

    let status = client.select("INBOX").await.unwrap();
    assert_eq!(status.exists, 2);
    assert_eq!(status.recent, 1);
    assert_eq!(status.uid_validity, Some(3857529045));
    assert_eq!(status.flags.len(), 3);

    let hits = client.search("ALL").await.unwrap();
    assert_eq!(hits, vec![1, 2]);

    let records = client.fetch("1", FetchItems::Items("(BODY[])".to_string())).await.unwrap();
    assert_eq!(records.len(), 1);
    let (seq, raw) = &records[0];
    assert_eq!(*seq, 1);
    // The literal payload came through verbatim, embedded CRLFs intact.
    assert!(raw.ends_with(b"Subject: hi\r\n\r\nyo\r\n)\r\n"));

    let updated = client
        .store("1", StoreAction::AddFlags(vec![r"\Deleted".to_string()]))
        .await
        .unwrap();
    assert_eq!(updated.len(), 1);

    let removed = client.expunge().await.unwrap();
    assert_eq!(removed, vec![1]);
}

#[tokio::test]
async fn wire_bytes_are_exact() {
    let script = concat!(
        "* OK ready\r\n",
        "A0001 OK done\r\n",
        "A0002 OK done\r\n",
    );

    // Borrow the stream so the sent bytes stay inspectable after the
    // client is dropped.
    let mut stream = MockStream::new(script.as_bytes());
    {
        let mut client = Client::from_stream(&mut stream).await.unwrap();
        client.login("joe", "pass word").await.unwrap();
        client.noop().await.unwrap();
    }
    assert_eq!(
        stream.sent,
        b"A0001 LOGIN joe \"pass word\"\r\nA0002 NOOP\r\n"
    );
}

#[tokio::test]
async fn state_violations_write_nothing() {
    let script = "* OK ready\r\n";
    let mut stream = MockStream::new(script.as_bytes());
    {
        let mut client = Client::from_stream(&mut stream).await.unwrap();

        let err = client.select("INBOX").await.unwrap_err();
        match err {
            Error::InvalidState { expected, actual } => {
                assert_eq!(expected, StateKind::Authenticated);
                assert_eq!(actual, StateKind::NotAuthenticated);
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }

        let err = client.fetch("1", FetchItems::Fast).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                expected: StateKind::Selected,
                ..
            }
        ));
    }
    // Fail-fast means fail before I/O: nothing was sent.
    assert!(stream.sent.is_empty());
}

#[tokio::test]
async fn authenticate_plain_sends_initial_response() {
    let script = concat!(
        "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN AUTH=LOGIN] ready\r\n",
        "A0001 OK authenticated\r\n",
    );

    let mut stream = MockStream::new(script.as_bytes());
    {
        let mut client = Client::from_stream(&mut stream).await.unwrap();
        client
            .authenticate(&Credentials::password("joe", "hunter2"))
            .await
            .unwrap();
        assert!(client.state().is_authenticated());
    }
    // PLAIN outranks LOGIN and supports an initial response (SASL-IR).
    assert_eq!(stream.sent, b"A0001 AUTHENTICATE PLAIN AGpvZQBodW50ZXIy\r\n");
}

#[tokio::test]
async fn scram_abort_drains_terminal_response() {
    // A SCRAM server answering with a challenge that does not extend
    // the client nonce: the responder fails, the client aborts with
    // "*", and the session remains usable (not authenticated).
    let script = concat!(
        "* OK [CAPABILITY IMAP4rev1 AUTH=SCRAM-SHA-256] ready\r\n",
        // base64("r=attacker,s=QSXCR+Q6sek8bf92,i=4096"): the nonce
        // does not start with the client nonce.
        "+ cj1hdHRhY2tlcixzPVFTWENSK1E2c2VrOGJmOTIsaT00MDk2\r\n",
        "A0001 NO [AUTHENTICATIONFAILED] aborted\r\n",
    );

    let mut client = Client::from_stream(MockStream::new(script.as_bytes()))
        .await
        .unwrap();
    let result = client
        .authenticate(&Credentials::password("user", "pencil"))
        .await;

    assert!(matches!(
        result,
        Err(Error::Sasl(postwire_sasl::Error::InvalidChallenge(_)))
    ));
    assert_eq!(client.state(), &SessionState::NotAuthenticated);
}

#[tokio::test]
async fn session_handle_roundtrip() {
    let script = concat!(
        "* OK ready\r\n",
        "A0001 OK done\r\n",
        "* LIST (\\HasNoChildren) \"/\" INBOX\r\n",
        "A0002 OK listed\r\n",
        "* BYE bye\r\n",
        "A0003 OK bye\r\n",
    );

    let client = Client::from_stream(MockStream::new(script.as_bytes()))
        .await
        .unwrap();
    let session = Session::spawn(client);

    session.login("joe", "hunter2").await.unwrap();
    let folders = session.list("", "*").await.unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].mailbox, "INBOX");

    session.disconnect().await.unwrap();
}
