//! # postwire-imap
//!
//! An IMAP client library implementing RFC 3501 / RFC 9051 with SASL
//! authentication, in async, blocking, and actor flavors.
//!
//! ## Features
//!
//! - **Sans-I/O session engine**: correlation, state machine, and
//!   transitions live in a pure state machine shared by all three
//!   client flavors, testable without network mocks
//! - **Runtime state machine**: commands issued in the wrong state
//!   (e.g. `SELECT` before authentication) fail with a structured
//!   error before any bytes hit the wire
//! - **Incremental frame decoder**: chunk-boundary-insensitive
//!   handling of CRLF lines and `{N}` literals
//! - **SASL**: SCRAM (`-PLUS` included), CRAM-MD5, PLAIN, LOGIN,
//!   OAUTHBEARER, XOAUTH2 via `postwire-sasl`
//! - **Concurrent sessions**: [`Session`] serializes concurrent
//!   callers onto one connection through a dedicated owner task
//! - **Deadlines**: every response wait is bounded; "no answer" and
//!   "connection closed" stay distinct errors
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire_imap::{Client, FetchItems};
//!
//! #[tokio::main]
//! async fn main() -> postwire_imap::Result<()> {
//!     let mut client = Client::connect_tls("imap.example.com", 993).await?;
//!     client.login("user@example.com", "password").await?;
//!
//!     let status = client.select("INBOX").await?;
//!     println!("{} messages", status.exists);
//!
//!     for (seq, raw) in client.fetch("1:10", FetchItems::Fast).await? {
//!         // hand `raw` to the MIME layer
//!         # let _ = (seq, raw);
//!     }
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Session states
//!
//! ```text
//! ┌─────────────────────┐
//! │   NotAuthenticated  │ ── login()/authenticate() ──→ Authenticated
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    Authenticated    │ ── select()/examine() ──→ Selected
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │      Selected       │ ── close()/unselect() ──→ Authenticated
//! └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command builders and serialization
//! - [`connection`]: async, blocking, and actor clients
//! - [`handler`]: unsolicited-response observer
//! - [`parser`]: response unit parsing
//! - [`protocol`]: sans-I/O engine, frame decoder, session state
//! - [`types`]: tags, status words, response codes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod handler;
pub mod parser;
pub mod protocol;
pub mod types;

pub use command::{Command, FetchItems, StoreAction};
pub use connection::{BlockingClient, Client, Session};
pub use error::{Error, Result};
pub use handler::{CollectingHandler, NoopHandler, TracingHandler, UnsolicitedHandler};
pub use parser::{Response, ResponseParser, UntaggedResponse};
pub use protocol::{
    CommandHandle, CommandResult, Engine, Event, FrameDecoder, SelectedState, SessionState,
    StateKind,
};
pub use types::{ListEntry, MailboxStatus, ResponseCode, Status, Tag, TagGenerator};

/// IMAP protocol version supported.
pub const IMAP_VERSION: &str = "IMAP4rev1";
