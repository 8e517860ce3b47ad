//! Synchronous stream types for the blocking clients.
//!
//! Mirrors [`crate::stream::MailStream`] over `std::net`. The blocking
//! clients use a per-attempt socket read timeout plus an attempt counter
//! instead of racing futures; see [`BlockingStream::set_read_timeout`].

#![allow(clippy::missing_errors_doc)]

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConnection, StreamOwned};

use crate::{Error, Result};

/// RFC 9266 exporter label for TLS channel binding.
const CHANNEL_BINDING_LABEL: &[u8] = b"EXPORTER-Channel-Binding";

/// Length of the exported channel-binding material.
const CHANNEL_BINDING_LEN: usize = 32;

/// A blocking stream that can be either plaintext or TLS.
///
/// Not safe for concurrent callers; external synchronization is the
/// caller's responsibility.
pub enum BlockingStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl BlockingStream {
    /// Connects without TLS (for STARTTLS or testing).
    pub fn connect_plain(host: &str, port: u16) -> Result<Self> {
        let tcp = TcpStream::connect((host, port))?;
        Ok(Self::Plain(tcp))
    }

    /// Connects with TLS from the start (implicit TLS).
    pub fn connect_tls(host: &str, port: u16) -> Result<Self> {
        let tcp = TcpStream::connect((host, port))?;
        Self::wrap_tls(tcp, host)
    }

    /// Upgrades a plaintext stream to TLS (STARTTLS/STLS).
    pub fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        match self {
            Self::Plain(tcp) => Self::wrap_tls(tcp, host),
            Self::Tls(_) => Err(Error::InvalidStreamState(
                "stream is already TLS".to_string(),
            )),
        }
    }

    fn wrap_tls(tcp: TcpStream, host: &str) -> Result<Self> {
        let root_store = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let server_name = ServerName::try_from(host.to_string())?;
        let conn = ClientConnection::new(Arc::new(config), server_name)?;
        Ok(Self::Tls(Box::new(StreamOwned::new(conn, tcp))))
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Sets the read timeout for a single blocking read attempt.
    ///
    /// `None` disables the timeout entirely (reads block until data or
    /// EOF). The blocking clients combine this with a maximum-attempts
    /// counter to bound the total wait.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match self {
            Self::Plain(tcp) => tcp.set_read_timeout(timeout)?,
            Self::Tls(tls) => tls.sock.set_read_timeout(timeout)?,
        }
        Ok(())
    }

    /// Extracts TLS channel-binding data (RFC 9266 `tls-exporter`).
    ///
    /// Returns `None` on plaintext streams.
    #[must_use]
    pub fn channel_binding(&self) -> Option<Vec<u8>> {
        match self {
            Self::Plain(_) => None,
            Self::Tls(tls) => tls
                .conn
                .export_keying_material(
                    vec![0u8; CHANNEL_BINDING_LEN],
                    CHANNEL_BINDING_LABEL,
                    None,
                )
                .ok(),
        }
    }

    /// Shuts down the underlying socket.
    pub fn shutdown(&self) -> Result<()> {
        let tcp = match self {
            Self::Plain(tcp) => tcp,
            Self::Tls(tls) => &tls.sock,
        };
        tcp.shutdown(std::net::Shutdown::Both)?;
        Ok(())
    }
}

impl Read for BlockingStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(tcp) => tcp.read(buf),
            Self::Tls(tls) => tls.read(buf),
        }
    }
}

impl Write for BlockingStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(tcp) => tcp.write(buf),
            Self::Tls(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(tcp) => tcp.flush(),
            Self::Tls(tls) => tls.flush(),
        }
    }
}

/// Returns true if an I/O error is a read-timeout expiry rather than a
/// real failure.
///
/// `read` on a socket with a read timeout reports expiry as
/// `WouldBlock` on Unix and `TimedOut` on Windows.
#[must_use]
pub fn is_read_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
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

    #[test]
    fn test_is_read_timeout() {
        assert!(is_read_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_read_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_read_timeout(&io::Error::from(
            io::ErrorKind::UnexpectedEof
        )));
    }
}
