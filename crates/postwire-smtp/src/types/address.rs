//! Email address handling for the SMTP envelope.

use crate::error::{Error, Result};

/// A validated envelope address (`MAIL FROM` / `RCPT TO`).
///
/// Validation is deliberately shallow: the address must look like
/// `local@domain` and must not be able to break out of the angle-addr
/// syntax. Full RFC 5322 parsing is the message layer's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a validated address.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` if the address is empty, lacks an `@`,
    /// or contains characters that would corrupt the command line.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();

        if address.is_empty() {
            return Err(Error::InvalidAddress("empty address".to_string()));
        }
        if !address.contains('@') {
            return Err(Error::InvalidAddress(format!("missing '@': {address}")));
        }
        if address
            .bytes()
            .any(|b| b == b'<' || b == b'>' || b == b'\r' || b == b'\n' || b == b' ')
        {
            return Err(Error::InvalidAddress(format!(
                "illegal character in address: {address}"
            )));
        }

        Ok(Self(address))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
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
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
    }

    #[test]
    fn test_rejects_missing_at() {
        assert!(Address::new("userexample.com").is_err());
    }

    #[test]
    fn test_rejects_injection() {
        assert!(Address::new("a@b.com>\r\nRCPT TO:<x@y.com").is_err());
        assert!(Address::new("<a@b.com>").is_err());
        assert!(Address::new("").is_err());
    }
}
