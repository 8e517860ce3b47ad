//! SMTP connection management.

mod blocking;
mod client;

pub use blocking::BlockingClient;
pub use client::Client;

use std::collections::HashSet;

use crate::types::Extension;

/// Server capabilities from the greeting and EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns the SASL mechanism names advertised via `AUTH`.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Replaces the extension set from EHLO reply lines (the first line
    /// is the server greeting and is skipped).
    pub(crate) fn update_from_ehlo(&mut self, lines: &[String]) {
        if let Some(first) = lines.first() {
            if let Some(name) = first.split_whitespace().next() {
                self.hostname = name.to_string();
            }
        }
        self.extensions = lines.iter().skip(1).map(|l| Extension::parse(l)).collect();
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

    #[test]
    fn test_update_from_ehlo() {
        let mut info = ServerInfo::default();
        info.update_from_ehlo(&[
            "mail.example.com greets you".to_string(),
            "PIPELINING".to_string(),
            "SIZE 1000000".to_string(),
            "AUTH PLAIN SCRAM-SHA-256".to_string(),
            "STARTTLS".to_string(),
        ]);

        assert_eq!(info.hostname, "mail.example.com");
        assert!(info.supports_starttls());
        assert!(info.supports(&Extension::Pipelining));
        assert_eq!(info.max_message_size(), Some(1_000_000));
        assert_eq!(info.auth_mechanisms(), vec!["PLAIN", "SCRAM-SHA-256"]);
    }
}
