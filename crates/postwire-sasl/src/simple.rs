//! Single-shot SASL payloads: PLAIN, OAUTHBEARER, XOAUTH2.
//!
//! These mechanisms send one blob and are done; the server's terminal
//! reply decides the outcome. Payloads are returned raw — the
//! negotiation layer base64-encodes them for the wire.

/// PLAIN initial response (RFC 4616): `\0<username>\0<password>`.
///
/// The leading NUL is the empty authorization identity (same as the
/// authentication identity).
#[must_use]
pub fn plain_payload(username: &str, password: &str) -> Vec<u8> {
    format!("\0{username}\0{password}").into_bytes()
}

/// OAUTHBEARER initial response (RFC 7628):
/// `n,a=<user>,\x01auth=Bearer <token>\x01\x01`.
#[must_use]
pub fn oauthbearer_payload(user: &str, token: &str) -> Vec<u8> {
    format!("n,a={user},\x01auth=Bearer {token}\x01\x01").into_bytes()
}

/// XOAUTH2 initial response (Google/Microsoft proprietary):
/// `user=<user>\x01auth=Bearer <token>\x01\x01`.
#[must_use]
pub fn xoauth2_payload(user: &str, token: &str) -> Vec<u8> {
    format!("user={user}\x01auth=Bearer {token}\x01\x01").into_bytes()
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
    fn test_plain_payload_format() {
        assert_eq!(plain_payload("test", "pass"), b"\0test\0pass".to_vec());
    }

    #[test]
    fn test_oauthbearer_payload_format() {
        let payload = oauthbearer_payload("test@test.com", "abc");
        assert_eq!(
            payload,
            b"n,a=test@test.com,\x01auth=Bearer abc\x01\x01".to_vec()
        );
    }

    #[test]
    fn test_xoauth2_payload_format() {
        let payload = xoauth2_payload("test@test.com", "abc");
        assert_eq!(
            payload,
            b"user=test@test.com\x01auth=Bearer abc\x01\x01".to_vec()
        );
    }
}
