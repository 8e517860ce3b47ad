//! # postwire-sasl
//!
//! SASL authentication for the postwire mail clients. Implements
//! mechanism selection by strength and the client side of the
//! challenge/response exchange for:
//!
//! - SCRAM-SHA-1/-256/-512 and their `-PLUS` channel-binding variants
//!   (RFC 5802 / RFC 7677, implemented from scratch on the RustCrypto
//!   stack)
//! - CRAM-MD5 (RFC 2195)
//! - PLAIN (RFC 4616)
//! - LOGIN (legacy two-step)
//! - OAUTHBEARER (RFC 7628) and XOAUTH2 for token credentials
//!
//! The crate is sans-I/O: a [`Negotiation`] consumes base64 challenge
//! text and produces base64 response text; the protocol clients carry
//! the frames (`AUTHENTICATE`/`AUTH` commands, `+`/`334` continuations).
//!
//! ## Example
//!
//! ```
//! use postwire_sasl::{Credentials, Mechanism, Negotiation};
//!
//! let creds = Credentials::password("user", "pencil");
//! let offered = ["PLAIN", "SCRAM-SHA-256"];
//! let mechanism = Mechanism::choose(&offered, &creds).unwrap();
//! assert_eq!(mechanism, Mechanism::ScramSha256);
//!
//! let mut negotiation = Negotiation::new(mechanism, &creds).unwrap();
//! let initial = negotiation.initial_response().unwrap();
//! // send `initial` with the AUTH command, feed continuations to
//! // `negotiation.respond(..)` until the server's terminal reply
//! # let _ = initial;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cram;
mod credentials;
mod error;
mod mechanism;
mod negotiation;
pub mod scram;
mod simple;

pub use credentials::{Credentials, Secret};
pub use error::{Error, Result};
pub use mechanism::Mechanism;
pub use negotiation::Negotiation;
pub use scram::{ScramAlgorithm, ScramContext};
