//! # postwire-smtp
//!
//! An SMTP client library implementing RFC 5321 with SASL
//! authentication (RFC 4954), in both async and blocking flavors.
//!
//! ## Features
//!
//! - **Runtime session state machine**: commands issued in the wrong
//!   state fail with a structured error before any bytes hit the wire
//! - **Incremental reply decoder**: chunk-boundary-insensitive parsing
//!   of single- and multi-line replies, with resynchronization on
//!   malformed or mixed-code lines
//! - **SASL**: SCRAM (`-PLUS` included), CRAM-MD5, PLAIN, LOGIN,
//!   OAUTHBEARER, XOAUTH2 via `postwire-sasl`
//! - **TLS via rustls**: implicit TLS (port 465) and STARTTLS
//! - **Deadlines**: every response wait is bounded; "no answer" and
//!   "connection closed" stay distinct errors
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire_smtp::{Address, Client};
//! use postwire_sasl::Credentials;
//!
//! #[tokio::main]
//! async fn main() -> postwire_smtp::Result<()> {
//!     let mut client = Client::connect_plain("smtp.example.com", 587).await?;
//!     client.ehlo("client.example.com").await?;
//!     let mut client = client.starttls().await?;
//!
//!     client
//!         .authenticate(&Credentials::password("user@example.com", "password"))
//!         .await?;
//!
//!     let from = Address::new("sender@example.com")?;
//!     let to = Address::new("recipient@example.com")?;
//!     client.mail_from(&from).await?;
//!     client.rcpt_to(&to).await?;
//!     client
//!         .send_message(b"Subject: Test\r\n\r\nHello, World!\r\n")
//!         .await?;
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: async and blocking clients
//! - [`parser`]: incremental reply decoder
//! - [`state`]: session state machine
//! - [`types`]: core SMTP types (addresses, extensions, replies)

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
pub use connection::{BlockingClient, Client, ServerInfo};
pub use error::{Error, Result};
pub use parser::ReplyDecoder;
pub use state::SessionState;
pub use types::{Address, EnhancedStatusCode, Extension, Reply, ReplyCode};

/// SMTP protocol version supported.
pub const SMTP_VERSION: &str = "SMTP/ESMTP (RFC 5321)";
