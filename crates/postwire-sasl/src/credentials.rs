//! Authentication credentials.

/// The secret half of a credential pair.
#[derive(Clone)]
pub enum Secret {
    /// A plain password (SCRAM, CRAM-MD5, PLAIN, LOGIN).
    Password(String),
    /// An OAuth2 bearer token (OAUTHBEARER, XOAUTH2).
    Token(String),
}

/// Credentials for a SASL exchange.
///
/// Channel-binding bytes come from the transport
/// (`MailStream::channel_binding`) and gate the SCRAM `-PLUS`
/// mechanisms.
#[derive(Clone)]
pub struct Credentials {
    /// Authentication identity.
    pub username: String,
    /// Password or token.
    pub secret: Secret,
    /// TLS channel-binding data, when the transport can export it.
    pub channel_binding: Option<Vec<u8>>,
}

impl Credentials {
    /// Creates password credentials.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Secret::Password(password.into()),
            channel_binding: None,
        }
    }

    /// Creates token credentials.
    #[must_use]
    pub fn token(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Secret::Token(token.into()),
            channel_binding: None,
        }
    }

    /// Attaches channel-binding data from the transport.
    #[must_use]
    pub fn with_channel_binding(mut self, data: Vec<u8>) -> Self {
        self.channel_binding = Some(data);
        self
    }

    /// Returns true if these credentials carry a plain password.
    #[must_use]
    pub const fn has_password(&self) -> bool {
        matches!(self.secret, Secret::Password(_))
    }

    /// Returns true if these credentials carry a bearer token.
    #[must_use]
    pub const fn has_token(&self) -> bool {
        matches!(self.secret, Secret::Token(_))
    }
}

// Secrets must not leak through Debug output.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field(
                "secret",
                &match self.secret {
                    Secret::Password(_) => "Password(***)",
                    Secret::Token(_) => "Token(***)",
                },
            )
            .field("channel_binding", &self.channel_binding.is_some())
            .finish()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(***)"),
            Self::Token(_) => f.write_str("Token(***)"),
        }
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
    fn test_debug_hides_secret() {
        let creds = Credentials::password("joe", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("joe"));
    }

    #[test]
    fn test_secret_kinds() {
        assert!(Credentials::password("a", "b").has_password());
        assert!(Credentials::token("a", "b").has_token());
        assert!(!Credentials::token("a", "b").has_password());
    }

    #[test]
    fn test_channel_binding_attach() {
        let creds = Credentials::password("a", "b").with_channel_binding(vec![1, 2, 3]);
        assert_eq!(creds.channel_binding.as_deref(), Some(&[1u8, 2, 3][..]));
    }
}
