//! # postwire-pop3
//!
//! A POP3 client library implementing RFC 1939 with SASL
//! authentication (RFC 5034), in both async and blocking flavors.
//!
//! ## Features
//!
//! - **Runtime session state machine**: transaction commands issued
//!   before authentication fail before any bytes hit the wire
//! - **Incremental decoder**: chunk-boundary-insensitive parsing of
//!   status lines and dot-stuffed multiline data
//! - **Authentication**: USER/PASS, APOP, and SASL (SCRAM with
//!   `-PLUS`, CRAM-MD5, PLAIN, LOGIN, OAUTHBEARER, XOAUTH2)
//! - **TLS via rustls**: implicit TLS (port 995) and STLS
//! - **Deadlines**: every response wait is bounded; "no answer" and
//!   "connection closed" stay distinct errors
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire_pop3::Client;
//!
//! #[tokio::main]
//! async fn main() -> postwire_pop3::Result<()> {
//!     let mut client = Client::connect_tls("pop.example.com", 995).await?;
//!     client.login("user@example.com", "password").await?;
//!
//!     let stat = client.stat().await?;
//!     println!("{} messages, {} octets", stat.count, stat.size);
//!
//!     for entry in client.list().await? {
//!         let raw = client.retr(entry.msg).await?;
//!         // hand `raw` to the MIME layer
//!         # let _ = raw;
//!     }
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: POP3 command builders
//! - [`connection`]: async and blocking clients
//! - [`parser`]: incremental status/multiline decoder
//! - [`state`]: session state machine
//! - [`types`]: STAT/LIST/UIDL result types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod state;
pub mod types;

pub use command::Command;
pub use connection::{BlockingClient, Client};
pub use error::{Error, Result};
pub use parser::{Pop3Decoder, StatusLine, Unit};
pub use state::SessionState;
pub use types::{ListEntry, StatInfo, UidlEntry};

/// POP3 protocol version supported.
pub const POP3_VERSION: &str = "POP3 (RFC 1939)";
