//! CRAM-MD5 challenge/response (RFC 2195).

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::error::{Error, Result};

type HmacMd5 = Hmac<Md5>;

/// Computes the CRAM-MD5 response for a server challenge.
///
/// The response is `"<username> " + lowercase-hex(HMAC-MD5(password,
/// challenge))`, sent base64-encoded by the negotiation layer.
///
/// # Errors
///
/// Returns `CryptoUnavailable` if the HMAC cannot be keyed.
pub fn respond(username: &str, password: &str, challenge: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacMd5::new_from_slice(password.as_bytes()).map_err(|_| Error::CryptoUnavailable)?;
    mac.update(challenge);
    let digest = mac.finalize().into_bytes();

    let mut out = String::with_capacity(username.len() + 1 + digest.len() * 2);
    out.push_str(username);
    out.push(' ');
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    Ok(out.into_bytes())
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

    // RFC 2195 example: challenge from the server, user "tim",
    // password "tanstaaftanstaaf".
    #[test]
    fn test_rfc2195_example() {
        let challenge = b"<1896.697170952@postoffice.reston.mci.net>";
        let response = respond("tim", "tanstaaftanstaaf", challenge).unwrap();
        assert_eq!(
            response,
            b"tim b913a602c7eda7a495b4e6e7334d3890".to_vec()
        );
    }

    #[test]
    fn test_response_shape() {
        let response = respond("joe", "secret", b"<challenge@host>").unwrap();
        let text = String::from_utf8(response).unwrap();
        let (user, digest) = text.split_once(' ').unwrap();
        assert_eq!(user, "joe");
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
