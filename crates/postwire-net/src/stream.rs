//! Async stream types for mail protocol connections.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::{Error, Result};

/// RFC 9266 exporter label for TLS channel binding.
const CHANNEL_BINDING_LABEL: &[u8] = b"EXPORTER-Channel-Binding";

/// Length of the exported channel-binding material.
const CHANNEL_BINDING_LEN: usize = 32;

/// A stream that can be either plaintext or TLS.
pub enum MailStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl MailStream {
    /// Creates a new plaintext stream.
    pub const fn plain(stream: TcpStream) -> Self {
        Self::Plain(stream)
    }

    /// Creates a new TLS stream.
    pub fn tls(stream: TlsStream<TcpStream>) -> Self {
        Self::Tls(Box::new(stream))
    }

    /// Upgrades a plaintext stream to TLS (STARTTLS/STLS).
    ///
    /// The protocol-level upgrade command must already have been
    /// acknowledged by the server before calling this.
    pub async fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let connector = create_tls_connector();
                let server_name = ServerName::try_from(host.to_string())?;
                let tls = connector.connect(server_name, tcp).await?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::InvalidStreamState(
                "stream is already TLS".to_string(),
            )),
        }
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Extracts TLS channel-binding data (RFC 9266 `tls-exporter`).
    ///
    /// Returns `None` on plaintext streams or when the TLS session does
    /// not support keying-material export. The bytes are consumed by the
    /// SCRAM `-PLUS` mechanisms.
    #[must_use]
    pub fn channel_binding(&self) -> Option<Vec<u8>> {
        match self {
            Self::Plain(_) => None,
            Self::Tls(tls) => {
                let (_, conn) = tls.get_ref();
                conn.export_keying_material(
                    vec![0u8; CHANNEL_BINDING_LEN],
                    CHANNEL_BINDING_LABEL,
                    None,
                )
                .ok()
            }
        }
    }
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector with default root certificates.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Connects to a server with TLS from the start (implicit TLS).
pub async fn connect_tls(host: &str, port: u16) -> Result<MailStream> {
    let addr = format!("{host}:{port}");
    let tcp = TcpStream::connect(&addr).await?;

    let connector = create_tls_connector();
    let server_name = ServerName::try_from(host.to_string())?;
    let tls = connector.connect(server_name, tcp).await?;

    tracing::debug!(host, port, "connected (implicit TLS)");
    Ok(MailStream::Tls(Box::new(tls)))
}

/// Connects to a server without TLS (for STARTTLS or testing).
pub async fn connect_plain(host: &str, port: u16) -> Result<MailStream> {
    let addr = format!("{host}:{port}");
    let tcp = TcpStream::connect(&addr).await?;
    tracing::debug!(host, port, "connected (plaintext)");
    Ok(MailStream::Plain(tcp))
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
    fn test_create_tls_connector() {
        // Root store construction must not panic.
        let _ = create_tls_connector();
    }
}
