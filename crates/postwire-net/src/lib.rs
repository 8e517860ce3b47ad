//! # postwire-net
//!
//! Shared transport layer for the postwire mail protocol clients
//! (IMAP, SMTP, POP3). The protocol crates never talk to sockets
//! directly; everything goes through the types defined here.
//!
//! ## What lives here
//!
//! - [`MailStream`]: a byte stream that is either plaintext TCP or TLS
//!   (rustls), with in-place STARTTLS upgrade and TLS channel-binding
//!   extraction for SCRAM `-PLUS` mechanisms
//! - [`BlockingStream`]: the same shape over `std::net` for the blocking
//!   clients
//! - [`deadline`]: wraps a wait-for-response future with a timeout,
//!   keeping "no answer" ([`Error::Timeout`]) distinct from "peer went
//!   away" ([`Error::ConnectionClosed`])
//! - [`ProtocolLogger`]: wire logging with client-side secret redaction
//!
//! ## Modules
//!
//! - [`blocking`]: synchronous stream types
//! - [`deadline`]: timeout wrapper for response waits
//! - [`logger`]: wire logging and secret redaction
//! - [`stream`]: async stream types and connect helpers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod blocking;
pub mod deadline;
mod error;
pub mod logger;
pub mod stream;

pub use blocking::BlockingStream;
pub use deadline::deadline;
pub use error::{Error, Result};
pub use logger::{
    AuthSecretDetector, NullLogger, ProtocolLog, ProtocolLogger, SecretDetector, TracingLogger,
};
pub use stream::{MailStream, connect_plain, connect_tls};
