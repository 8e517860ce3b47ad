//! SCRAM client state machine (RFC 5802 / RFC 7677).
//!
//! Implements the client side of the Salted Challenge Response
//! Authentication Mechanism for SHA-1, SHA-256 and SHA-512, with
//! optional TLS channel binding (`-PLUS` variants, RFC 9266
//! `tls-exporter`).
//!
//! The context lives for exactly one authentication attempt:
//!
//! ```text
//! Initial ── initial_message() ──→ AwaitingServerFirst
//!         ── process(server-first) ──→ AwaitingServerFinal
//!         ── process(server-final) ──→ Completed
//! ```
//!
//! Exactly one server message is consumed per transition; any failure
//! parks the context in `Failed`. The password never crosses the wire:
//! the client proves knowledge of `PBKDF2(password, salt, i)` and
//! verifies the server's counter-signature before reporting success.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Length of the generated client nonce.
const NONCE_LEN: usize = 24;

/// Channel-binding name sent in the gs2 header for `-PLUS` variants.
const CHANNEL_BINDING_NAME: &str = "tls-exporter";

/// Hash algorithm underlying a SCRAM exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramAlgorithm {
    /// SCRAM-SHA-1.
    Sha1,
    /// SCRAM-SHA-256.
    Sha256,
    /// SCRAM-SHA-512.
    Sha512,
}

impl ScramAlgorithm {
    /// Digest output length in bytes.
    #[must_use]
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    /// `H(data)`.
    fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// `HMAC(key, data)`.
    fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        Ok(match self {
            Self::Sha1 => {
                let mut mac =
                    HmacSha1::new_from_slice(key).map_err(|_| Error::CryptoUnavailable)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            Self::Sha256 => {
                let mut mac =
                    HmacSha256::new_from_slice(key).map_err(|_| Error::CryptoUnavailable)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            Self::Sha512 => {
                let mut mac =
                    HmacSha512::new_from_slice(key).map_err(|_| Error::CryptoUnavailable)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        })
    }

    /// `Hi(password, salt, i)` — PBKDF2 with the matching HMAC.
    fn salted_password(self, password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut out = vec![0u8; self.digest_len()];
        match self {
            Self::Sha1 => pbkdf2_hmac::<Sha1>(password, salt, iterations, &mut out),
            Self::Sha256 => pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out),
            Self::Sha512 => pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut out),
        }
        out
    }
}

/// Exchange phase. One server message per forward transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initial,
    AwaitingServerFirst,
    AwaitingServerFinal,
    Completed,
    Failed,
}

/// SCRAM client context for a single authentication attempt.
pub struct ScramContext {
    algorithm: ScramAlgorithm,
    username: String,
    password: String,
    /// Channel-binding bytes; `Some` selects the `p=tls-exporter` gs2
    /// header and includes the bytes in the `c=` attribute.
    channel_binding: Option<Vec<u8>>,
    client_nonce: String,
    phase: Phase,
    client_first_bare: String,
    server_signature: Vec<u8>,
}

impl ScramContext {
    /// Creates a context with a freshly generated nonce.
    #[must_use]
    pub fn new(
        algorithm: ScramAlgorithm,
        username: &str,
        password: &str,
        channel_binding: Option<Vec<u8>>,
    ) -> Self {
        Self::with_nonce(
            algorithm,
            username,
            password,
            channel_binding,
            generate_nonce(),
        )
    }

    /// Creates a context with a caller-supplied nonce.
    ///
    /// Exists for deterministic verification against the RFC test
    /// vectors; production code uses [`ScramContext::new`].
    #[must_use]
    pub fn with_nonce(
        algorithm: ScramAlgorithm,
        username: &str,
        password: &str,
        channel_binding: Option<Vec<u8>>,
        nonce: String,
    ) -> Self {
        Self {
            algorithm,
            username: username.to_string(),
            password: password.to_string(),
            channel_binding,
            client_nonce: nonce,
            phase: Phase::Initial,
            client_first_bare: String::new(),
            server_signature: Vec::new(),
        }
    }

    /// Returns true once the server's signature has been verified.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.phase == Phase::Completed
    }

    /// The gs2 header: `n,,` without channel binding, `p=tls-exporter,,`
    /// with it.
    fn gs2_header(&self) -> String {
        if self.channel_binding.is_some() {
            format!("p={CHANNEL_BINDING_NAME},,")
        } else {
            "n,,".to_string()
        }
    }

    /// The `c=` attribute value: base64(gs2-header ‖ cb-data).
    fn channel_binding_proof(&self) -> String {
        let mut input = self.gs2_header().into_bytes();
        if let Some(cb) = &self.channel_binding {
            input.extend_from_slice(cb);
        }
        BASE64.encode(input)
    }

    /// Builds the client-first message and arms the context for the
    /// server-first challenge.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyAuthenticated` if called more than once.
    pub fn initial_message(&mut self) -> Result<Vec<u8>> {
        if self.phase != Phase::Initial {
            return Err(Error::AlreadyAuthenticated);
        }

        self.client_first_bare = format!(
            "n={},r={}",
            escape_username(&self.username),
            self.client_nonce
        );
        self.phase = Phase::AwaitingServerFirst;

        let message = format!("{}{}", self.gs2_header(), self.client_first_bare);
        Ok(message.into_bytes())
    }

    /// Consumes the next server message, returning the client's answer.
    ///
    /// The server-first message yields the client-final message; the
    /// server-final message yields an empty response and completes the
    /// exchange.
    ///
    /// # Errors
    ///
    /// `IncompleteChallenge`/`InvalidChallenge` for malformed or
    /// untrusted challenges, `IncorrectHash` when the server signature
    /// does not verify, `AlreadyAuthenticated` after completion.
    pub fn process(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        match self.phase {
            Phase::AwaitingServerFirst => self.process_server_first(challenge),
            Phase::AwaitingServerFinal => self.process_server_final(challenge),
            Phase::Completed => Err(Error::AlreadyAuthenticated),
            Phase::Initial => Err(Error::InvalidChallenge(
                "challenge received before client-first message".to_string(),
            )),
            Phase::Failed => Err(Error::InvalidChallenge(
                "exchange already failed".to_string(),
            )),
        }
    }

    fn process_server_first(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        let result = self.compute_client_final(challenge);
        if result.is_err() {
            self.phase = Phase::Failed;
        } else {
            self.phase = Phase::AwaitingServerFinal;
        }
        result
    }

    fn compute_client_final(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        let server_first = std::str::from_utf8(challenge)
            .map_err(|_| Error::InvalidChallenge("server-first is not UTF-8".to_string()))?;

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for attr in server_first.split(',') {
            if let Some(value) = attr.strip_prefix("r=") {
                nonce = Some(value.to_string());
            } else if let Some(value) = attr.strip_prefix("s=") {
                salt = Some(BASE64.decode(value)?);
            } else if let Some(value) = attr.strip_prefix("i=") {
                iterations = Some(value.parse::<u32>().map_err(|_| {
                    Error::InvalidChallenge(format!("bad iteration count: {value}"))
                })?);
            }
        }

        let nonce = nonce.ok_or(Error::IncompleteChallenge { missing: "r" })?;
        let salt = salt.ok_or(Error::IncompleteChallenge { missing: "s" })?;
        let iterations = iterations.ok_or(Error::IncompleteChallenge { missing: "i" })?;

        // The combined nonce must extend ours; anything else is a
        // replayed or forged challenge.
        if !nonce.starts_with(&self.client_nonce) || nonce.len() <= self.client_nonce.len() {
            return Err(Error::InvalidChallenge(
                "server nonce does not extend client nonce".to_string(),
            ));
        }

        let salted = self
            .algorithm
            .salted_password(self.password.as_bytes(), &salt, iterations);
        let client_key = self.algorithm.hmac(&salted, b"Client Key")?;
        let stored_key = self.algorithm.hash(&client_key);

        let client_final_bare = format!("c={},r={}", self.channel_binding_proof(), nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, server_first, client_final_bare
        );

        let client_signature = self.algorithm.hmac(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        let server_key = self.algorithm.hmac(&salted, b"Server Key")?;
        self.server_signature = self.algorithm.hmac(&server_key, auth_message.as_bytes())?;

        let client_final = format!("{client_final_bare},p={}", BASE64.encode(proof));
        Ok(client_final.into_bytes())
    }

    fn process_server_final(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        let result = self.verify_server_final(challenge);
        if result.is_err() {
            self.phase = Phase::Failed;
        } else {
            self.phase = Phase::Completed;
        }
        result
    }

    fn verify_server_final(&self, challenge: &[u8]) -> Result<Vec<u8>> {
        let server_final = std::str::from_utf8(challenge)
            .map_err(|_| Error::InvalidChallenge("server-final is not UTF-8".to_string()))?;

        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(Error::InvalidChallenge(format!("server error: {err}")));
        }

        let verifier = server_final
            .strip_prefix("v=")
            .ok_or(Error::IncompleteChallenge { missing: "v" })?;
        let signature = BASE64.decode(verifier)?;

        if signature != self.server_signature {
            return Err(Error::IncorrectHash);
        }

        Ok(Vec::new())
    }
}

impl std::fmt::Debug for ScramContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramContext")
            .field("algorithm", &self.algorithm)
            .field("username", &self.username)
            .field("phase", &self.phase)
            .field("channel_binding", &self.channel_binding.is_some())
            .finish_non_exhaustive()
    }
}

/// Generates a printable nonce from the RFC 5802 safe alphabet.
fn generate_nonce() -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..NONCE_LEN)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect()
}

/// Escapes `=` and `,` in a saslname (RFC 5802 section 5.1).
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
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

    fn vector_context(algorithm: ScramAlgorithm, nonce: &str) -> ScramContext {
        ScramContext::with_nonce(algorithm, "user", "pencil", None, nonce.to_string())
    }

    // RFC 7677 test vector.
    #[test]
    fn test_sha256_vector() {
        let mut ctx = vector_context(ScramAlgorithm::Sha256, "rOprNGfwEbeRWgbNEkqO");

        let first = ctx.initial_message().unwrap();
        assert_eq!(first, b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO");

        let server_first = b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
        let client_final = ctx.process(server_first).unwrap();
        assert_eq!(
            client_final,
            b"c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
                .to_vec()
        );

        let server_final = b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";
        let done = ctx.process(server_final).unwrap();
        assert!(done.is_empty());
        assert!(ctx.is_authenticated());
    }

    // RFC 5802 test vector.
    #[test]
    fn test_sha1_vector() {
        let mut ctx = vector_context(ScramAlgorithm::Sha1, "fyko+d2lbbFgONRv9qkxdawL");

        let first = ctx.initial_message().unwrap();
        assert_eq!(first, b"n,,n=user,r=fyko+d2lbbFgONRv9qkxdawL");

        let server_first =
            b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096";
        let client_final = ctx.process(server_first).unwrap();
        assert_eq!(
            client_final,
            b"c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,\
p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts="
                .to_vec()
        );

        let server_final = b"v=rmF9pqV8S7suAoZWja4dJRkFsKQ=";
        assert!(ctx.process(server_final).unwrap().is_empty());
        assert!(ctx.is_authenticated());
    }

    #[test]
    fn test_wrong_server_signature() {
        let mut ctx = vector_context(ScramAlgorithm::Sha256, "rOprNGfwEbeRWgbNEkqO");
        let _ = ctx.initial_message().unwrap();
        let _ = ctx
            .process(
                b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",
            )
            .unwrap();

        // Flip the signature: verification must fail, not complete.
        let result = ctx.process(b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
        assert!(matches!(result, Err(Error::IncorrectHash)));
        assert!(!ctx.is_authenticated());
    }

    #[test]
    fn test_missing_challenge_fields() {
        let mut ctx = vector_context(ScramAlgorithm::Sha256, "nonce");
        let _ = ctx.initial_message().unwrap();
        let result = ctx.process(b"r=nonceXYZ,i=4096");
        assert!(matches!(
            result,
            Err(Error::IncompleteChallenge { missing: "s" })
        ));
    }

    #[test]
    fn test_nonce_mismatch_rejected() {
        let mut ctx = vector_context(ScramAlgorithm::Sha256, "clientnonce");
        let _ = ctx.initial_message().unwrap();
        let result = ctx.process(b"r=attacker,s=QSXCR+Q6sek8bf92,i=4096");
        assert!(matches!(result, Err(Error::InvalidChallenge(_))));
    }

    #[test]
    fn test_unextended_nonce_rejected() {
        // A server echoing exactly the client nonce adds no entropy.
        let mut ctx = vector_context(ScramAlgorithm::Sha256, "clientnonce");
        let _ = ctx.initial_message().unwrap();
        let result = ctx.process(b"r=clientnonce,s=QSXCR+Q6sek8bf92,i=4096");
        assert!(matches!(result, Err(Error::InvalidChallenge(_))));
    }

    #[test]
    fn test_invalid_base64_salt() {
        let mut ctx = vector_context(ScramAlgorithm::Sha256, "nonce");
        let _ = ctx.initial_message().unwrap();
        let result = ctx.process(b"r=nonceXYZ,s=!!!notbase64!!!,i=4096");
        assert!(matches!(result, Err(Error::InvalidBase64(_))));
    }

    #[test]
    fn test_process_after_completed() {
        let mut ctx = vector_context(ScramAlgorithm::Sha1, "fyko+d2lbbFgONRv9qkxdawL");
        let _ = ctx.initial_message().unwrap();
        let _ = ctx
            .process(b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096")
            .unwrap();
        let _ = ctx.process(b"v=rmF9pqV8S7suAoZWja4dJRkFsKQ=").unwrap();

        let result = ctx.process(b"v=rmF9pqV8S7suAoZWja4dJRkFsKQ=");
        assert!(matches!(result, Err(Error::AlreadyAuthenticated)));
    }

    #[test]
    fn test_server_error_attribute() {
        let mut ctx = vector_context(ScramAlgorithm::Sha1, "fyko+d2lbbFgONRv9qkxdawL");
        let _ = ctx.initial_message().unwrap();
        let _ = ctx
            .process(b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096")
            .unwrap();

        let result = ctx.process(b"e=invalid-proof");
        match result {
            Err(Error::InvalidChallenge(text)) => assert!(text.contains("invalid-proof")),
            other => panic!("expected InvalidChallenge, got {other:?}"),
        }
    }

    #[test]
    fn test_plus_variant_gs2_header() {
        let cb = vec![0x01, 0x02, 0x03, 0x04];
        let mut ctx = ScramContext::with_nonce(
            ScramAlgorithm::Sha256,
            "user",
            "pencil",
            Some(cb.clone()),
            "nonce".to_string(),
        );

        let first = ctx.initial_message().unwrap();
        assert_eq!(first, b"p=tls-exporter,,n=user,r=nonce");

        // c= must carry base64(gs2-header || cb-data).
        let client_final = ctx
            .process(b"r=nonceXYZ,s=QSXCR+Q6sek8bf92,i=4096")
            .unwrap();
        let text = String::from_utf8(client_final).unwrap();
        let mut expected = b"p=tls-exporter,,".to_vec();
        expected.extend_from_slice(&cb);
        assert!(text.starts_with(&format!("c={},r=nonceXYZ", BASE64.encode(expected))));
    }

    #[test]
    fn test_username_escaping() {
        let mut ctx = ScramContext::with_nonce(
            ScramAlgorithm::Sha256,
            "a=b,c",
            "pw",
            None,
            "nonce".to_string(),
        );
        let first = ctx.initial_message().unwrap();
        assert_eq!(first, b"n,,n=a=3Db=2Cc,r=nonce");
    }

    #[test]
    fn test_generated_nonce_charset() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
