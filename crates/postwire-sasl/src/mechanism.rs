//! Mechanism identification and selection.
//!
//! The supported mechanisms form a closed set, ordered by strength.
//! Selection filters the server's advertised list down to mechanisms
//! this client can actually drive with the given credentials, then
//! picks the strongest survivor. GSSAPI and NTLM are recognized names
//! with no client implementation here; offers consisting only of those
//! resolve to "no supported mechanism".

use crate::Credentials;
use crate::scram::ScramAlgorithm;

/// A SASL mechanism this client can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// SCRAM-SHA-512 with TLS channel binding.
    ScramSha512Plus,
    /// SCRAM-SHA-256 with TLS channel binding.
    ScramSha256Plus,
    /// SCRAM-SHA-1 with TLS channel binding.
    ScramSha1Plus,
    /// SCRAM-SHA-512.
    ScramSha512,
    /// SCRAM-SHA-256.
    ScramSha256,
    /// SCRAM-SHA-1.
    ScramSha1,
    /// OAUTHBEARER (RFC 7628), token credentials only.
    OAuthBearer,
    /// XOAUTH2 (Google/Microsoft), token credentials only.
    XOAuth2,
    /// CRAM-MD5 challenge/response.
    CramMd5,
    /// PLAIN username/password.
    Plain,
    /// Legacy LOGIN two-step exchange.
    Login,
}

/// All mechanisms in priority order (strongest first).
const PRIORITY: &[Mechanism] = &[
    Mechanism::ScramSha512Plus,
    Mechanism::ScramSha256Plus,
    Mechanism::ScramSha1Plus,
    Mechanism::ScramSha512,
    Mechanism::ScramSha256,
    Mechanism::ScramSha1,
    Mechanism::OAuthBearer,
    Mechanism::XOAuth2,
    Mechanism::CramMd5,
    Mechanism::Plain,
    Mechanism::Login,
];

impl Mechanism {
    /// Returns the wire name of the mechanism.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ScramSha512Plus => "SCRAM-SHA-512-PLUS",
            Self::ScramSha256Plus => "SCRAM-SHA-256-PLUS",
            Self::ScramSha1Plus => "SCRAM-SHA-1-PLUS",
            Self::ScramSha512 => "SCRAM-SHA-512",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha1 => "SCRAM-SHA-1",
            Self::OAuthBearer => "OAUTHBEARER",
            Self::XOAuth2 => "XOAUTH2",
            Self::CramMd5 => "CRAM-MD5",
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }

    /// Parses a wire name (case-insensitive).
    ///
    /// Returns `None` for unknown or unimplemented mechanisms
    /// (including GSSAPI and NTLM).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        PRIORITY
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    /// Returns true for the `-PLUS` channel-binding variants.
    #[must_use]
    pub const fn requires_channel_binding(self) -> bool {
        matches!(
            self,
            Self::ScramSha512Plus | Self::ScramSha256Plus | Self::ScramSha1Plus
        )
    }

    /// Returns the SCRAM hash algorithm, for the SCRAM family.
    #[must_use]
    pub const fn scram_algorithm(self) -> Option<ScramAlgorithm> {
        match self {
            Self::ScramSha1 | Self::ScramSha1Plus => Some(ScramAlgorithm::Sha1),
            Self::ScramSha256 | Self::ScramSha256Plus => Some(ScramAlgorithm::Sha256),
            Self::ScramSha512 | Self::ScramSha512Plus => Some(ScramAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Returns true if the mechanism can be driven with these
    /// credentials.
    #[must_use]
    pub fn usable_with(self, credentials: &Credentials) -> bool {
        if self.requires_channel_binding() && credentials.channel_binding.is_none() {
            return false;
        }
        match self {
            Self::OAuthBearer | Self::XOAuth2 => credentials.has_token(),
            _ => credentials.has_password(),
        }
    }

    /// Selects the strongest usable mechanism from a server's offer.
    ///
    /// Returns `None` when nothing offered is supported, which callers
    /// surface as [`crate::Error::NoSupportedMechanism`].
    #[must_use]
    pub fn choose<S: AsRef<str>>(offered: &[S], credentials: &Credentials) -> Option<Self> {
        let offered: Vec<Self> = offered
            .iter()
            .filter_map(|name| Self::from_name(name.as_ref()))
            .collect();

        PRIORITY
            .iter()
            .copied()
            .find(|m| offered.contains(m) && m.usable_with(credentials))
    }
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
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
    fn test_from_name_case_insensitive() {
        assert_eq!(
            Mechanism::from_name("scram-sha-256"),
            Some(Mechanism::ScramSha256)
        );
        assert_eq!(Mechanism::from_name("PLAIN"), Some(Mechanism::Plain));
        assert_eq!(Mechanism::from_name("GSSAPI"), None);
        assert_eq!(Mechanism::from_name("NTLM"), None);
        assert_eq!(Mechanism::from_name("DIGEST-MD5"), None);
    }

    #[test]
    fn test_choose_prefers_strongest_scram() {
        let creds = Credentials::password("user", "pass");
        let offered = ["PLAIN", "SCRAM-SHA-1", "SCRAM-SHA-256", "SCRAM-SHA-512"];
        assert_eq!(
            Mechanism::choose(&offered, &creds),
            Some(Mechanism::ScramSha512)
        );
    }

    #[test]
    fn test_choose_plus_requires_channel_binding() {
        let offered = ["SCRAM-SHA-256", "SCRAM-SHA-256-PLUS"];

        let without = Credentials::password("user", "pass");
        assert_eq!(
            Mechanism::choose(&offered, &without),
            Some(Mechanism::ScramSha256)
        );

        let with = Credentials::password("user", "pass").with_channel_binding(vec![0xAB; 32]);
        assert_eq!(
            Mechanism::choose(&offered, &with),
            Some(Mechanism::ScramSha256Plus)
        );
    }

    #[test]
    fn test_choose_none_when_unsupported() {
        let creds = Credentials::password("user", "pass");
        let offered = ["GSSAPI", "NTLM"];
        assert_eq!(Mechanism::choose(&offered, &creds), None);

        let empty: [&str; 0] = [];
        assert_eq!(Mechanism::choose(&empty, &creds), None);
    }

    #[test]
    fn test_choose_token_credentials() {
        let creds = Credentials::token("user", "ya29.token");
        // Password mechanisms are unusable with a token.
        let offered = ["PLAIN", "SCRAM-SHA-256", "XOAUTH2"];
        assert_eq!(Mechanism::choose(&offered, &creds), Some(Mechanism::XOAuth2));

        // OAUTHBEARER outranks XOAUTH2.
        let offered = ["XOAUTH2", "OAUTHBEARER"];
        assert_eq!(
            Mechanism::choose(&offered, &creds),
            Some(Mechanism::OAuthBearer)
        );
    }

    #[test]
    fn test_choose_password_fallback_order() {
        let creds = Credentials::password("user", "pass");
        assert_eq!(
            Mechanism::choose(&["LOGIN", "PLAIN"], &creds),
            Some(Mechanism::Plain)
        );
        assert_eq!(
            Mechanism::choose(&["LOGIN", "CRAM-MD5"], &creds),
            Some(Mechanism::CramMd5)
        );
        assert_eq!(
            Mechanism::choose(&["LOGIN"], &creds),
            Some(Mechanism::Login)
        );
    }
}
