//! The mechanism-agnostic negotiation state machine.
//!
//! A [`Negotiation`] is created per authentication attempt and driven
//! by the protocol client: the initial response (if the mechanism has
//! one) rides on the `AUTH`/`AUTHENTICATE` command, every subsequent
//! server continuation is fed to [`Negotiation::respond`], and the
//! server's terminal reply decides success. Base64 framing lives here;
//! mechanisms see raw bytes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::credentials::{Credentials, Secret};
use crate::error::{Error, Result};
use crate::mechanism::Mechanism;
use crate::scram::ScramContext;
use crate::{cram, simple};

/// Per-mechanism exchange state.
enum State {
    /// SCRAM drives a real multi-step state machine.
    Scram(ScramContext),
    /// CRAM-MD5: one challenge, one response.
    CramMd5 {
        username: String,
        password: String,
        responded: bool,
    },
    /// Single-shot payload mechanisms (PLAIN, OAUTHBEARER, XOAUTH2).
    ///
    /// The payload is normally sent as the initial response; when the
    /// server declines initial responses it is sent on the first empty
    /// challenge instead. A non-empty challenge afterwards is an error
    /// blob (OAuth) answered with an empty response so the server can
    /// deliver its terminal status.
    SingleShot { payload: Option<Vec<u8>> },
    /// LOGIN: username prompt, then password prompt.
    Login {
        username: String,
        password: String,
        step: u8,
    },
}

/// An in-flight SASL exchange for one mechanism.
pub struct Negotiation {
    mechanism: Mechanism,
    state: State,
}

impl Negotiation {
    /// Prepares an exchange for `mechanism` with `credentials`.
    ///
    /// # Errors
    ///
    /// Returns `MechanismUnusable` when the credentials cannot drive
    /// the mechanism (wrong secret kind, `-PLUS` without channel
    /// binding).
    pub fn new(mechanism: Mechanism, credentials: &Credentials) -> Result<Self> {
        if !mechanism.usable_with(credentials) {
            return Err(Error::MechanismUnusable {
                mechanism: mechanism.as_str(),
                reason: if mechanism.requires_channel_binding()
                    && credentials.channel_binding.is_none()
                {
                    "no channel-binding data available"
                } else {
                    "credentials do not match the mechanism"
                },
            });
        }

        let state = match (&credentials.secret, mechanism) {
            (Secret::Password(password), m) if m.scram_algorithm().is_some() => {
                // usable_with() already checked the -PLUS gating.
                let algorithm = m.scram_algorithm().ok_or(Error::CryptoUnavailable)?;
                let binding = if m.requires_channel_binding() {
                    credentials.channel_binding.clone()
                } else {
                    None
                };
                State::Scram(ScramContext::new(
                    algorithm,
                    &credentials.username,
                    password,
                    binding,
                ))
            }
            (Secret::Password(password), Mechanism::CramMd5) => State::CramMd5 {
                username: credentials.username.clone(),
                password: password.clone(),
                responded: false,
            },
            (Secret::Password(password), Mechanism::Plain) => State::SingleShot {
                payload: Some(simple::plain_payload(&credentials.username, password)),
            },
            (Secret::Password(password), Mechanism::Login) => State::Login {
                username: credentials.username.clone(),
                password: password.clone(),
                step: 0,
            },
            (Secret::Token(token), Mechanism::OAuthBearer) => State::SingleShot {
                payload: Some(simple::oauthbearer_payload(&credentials.username, token)),
            },
            (Secret::Token(token), Mechanism::XOAuth2) => State::SingleShot {
                payload: Some(simple::xoauth2_payload(&credentials.username, token)),
            },
            _ => {
                return Err(Error::MechanismUnusable {
                    mechanism: mechanism.as_str(),
                    reason: "credentials do not match the mechanism",
                });
            }
        };

        Ok(Self { mechanism, state })
    }

    /// The mechanism being negotiated.
    #[must_use]
    pub const fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    /// Returns the base64 initial response, when the mechanism has one.
    ///
    /// `None` means the client must send a bare `AUTH`/`AUTHENTICATE`
    /// command and wait for the first challenge (CRAM-MD5, LOGIN).
    ///
    /// # Errors
    ///
    /// SCRAM can fail if invoked on a spent context.
    pub fn initial_response(&mut self) -> Result<Option<String>> {
        match &mut self.state {
            State::Scram(ctx) => Ok(Some(BASE64.encode(ctx.initial_message()?))),
            State::SingleShot { payload } => {
                Ok(payload.take().map(|bytes| BASE64.encode(bytes)))
            }
            State::CramMd5 { .. } | State::Login { .. } => Ok(None),
        }
    }

    /// Answers a server continuation.
    ///
    /// `challenge` is the base64 text carried by the continuation line;
    /// the return value is the base64 text to send back.
    ///
    /// # Errors
    ///
    /// Base64 failures map to `InvalidBase64`; mechanism-level failures
    /// propagate (SCRAM signature mismatch, spent exchange, ...). On
    /// error the caller aborts the exchange but still drains the
    /// server's terminal reply.
    pub fn respond(&mut self, challenge: &str) -> Result<String> {
        let decoded = BASE64.decode(challenge.trim())?;

        let answer = match &mut self.state {
            State::Scram(ctx) => ctx.process(&decoded)?,
            State::CramMd5 {
                username,
                password,
                responded,
            } => {
                if *responded {
                    return Err(Error::AlreadyAuthenticated);
                }
                *responded = true;
                cram::respond(username, password, &decoded)?
            }
            State::SingleShot { payload } => {
                // First (empty) challenge: the server declined the
                // initial response, send the payload now. Later
                // challenges carry an OAuth error blob; answer empty.
                payload.take().unwrap_or_default()
            }
            State::Login {
                username,
                password,
                step,
            } => {
                // Prompt text ("Username:"/"Password:") is advisory;
                // answer strictly by step count.
                let answer = match step {
                    0 => username.clone().into_bytes(),
                    1 => password.clone().into_bytes(),
                    _ => return Err(Error::AlreadyAuthenticated),
                };
                *step += 1;
                answer
            }
        };

        Ok(BASE64.encode(answer))
    }

    /// Returns true once the mechanism itself considers the exchange
    /// finished.
    ///
    /// Only SCRAM verifies the server; for the other mechanisms the
    /// protocol-level terminal reply is the sole authority, and this
    /// reports whether all client steps were emitted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match &self.state {
            State::Scram(ctx) => ctx.is_authenticated(),
            State::CramMd5 { responded, .. } => *responded,
            State::SingleShot { payload } => payload.is_none(),
            State::Login { step, .. } => *step >= 2,
        }
    }
}

impl std::fmt::Debug for Negotiation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiation")
            .field("mechanism", &self.mechanism)
            .field("complete", &self.is_complete())
            .finish_non_exhaustive()
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
    fn test_plain_initial_response() {
        let creds = Credentials::password("user", "pass");
        let mut neg = Negotiation::new(Mechanism::Plain, &creds).unwrap();

        let initial = neg.initial_response().unwrap().unwrap();
        assert_eq!(BASE64.decode(initial).unwrap(), b"\0user\0pass");
        assert!(neg.is_complete());
    }

    #[test]
    fn test_plain_deferred_payload() {
        // Server that ignores SASL-IR sends an empty challenge first.
        let creds = Credentials::password("user", "pass");
        let mut neg = Negotiation::new(Mechanism::Plain, &creds).unwrap();

        let answer = neg.respond("").unwrap();
        assert_eq!(BASE64.decode(answer).unwrap(), b"\0user\0pass");
    }

    #[test]
    fn test_login_two_steps() {
        let creds = Credentials::password("joe", "hunter2");
        let mut neg = Negotiation::new(Mechanism::Login, &creds).unwrap();

        assert!(neg.initial_response().unwrap().is_none());

        let user = neg.respond(&BASE64.encode("Username:")).unwrap();
        assert_eq!(BASE64.decode(user).unwrap(), b"joe");

        let pass = neg.respond(&BASE64.encode("Password:")).unwrap();
        assert_eq!(BASE64.decode(pass).unwrap(), b"hunter2");
        assert!(neg.is_complete());

        assert!(matches!(
            neg.respond(""),
            Err(Error::AlreadyAuthenticated)
        ));
    }

    #[test]
    fn test_cram_md5_exchange() {
        let creds = Credentials::password("tim", "tanstaaftanstaaf");
        let mut neg = Negotiation::new(Mechanism::CramMd5, &creds).unwrap();

        assert!(neg.initial_response().unwrap().is_none());

        let challenge = BASE64.encode("<1896.697170952@postoffice.reston.mci.net>");
        let answer = neg.respond(&challenge).unwrap();
        assert_eq!(
            BASE64.decode(answer).unwrap(),
            b"tim b913a602c7eda7a495b4e6e7334d3890"
        );
        assert!(neg.is_complete());
    }

    #[test]
    fn test_scram_full_exchange() {
        let creds = Credentials::password("user", "pencil");
        let mut neg = Negotiation::new(Mechanism::ScramSha1, &creds).unwrap();

        let initial = neg.initial_response().unwrap().unwrap();
        let decoded = BASE64.decode(initial).unwrap();
        assert!(decoded.starts_with(b"n,,n=user,r="));
    }

    #[test]
    fn test_invalid_base64_challenge() {
        let creds = Credentials::password("user", "pencil");
        let mut neg = Negotiation::new(Mechanism::ScramSha256, &creds).unwrap();
        let _ = neg.initial_response().unwrap();

        assert!(matches!(
            neg.respond("!!! not base64 !!!"),
            Err(Error::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_plus_without_binding_rejected() {
        let creds = Credentials::password("user", "pencil");
        let result = Negotiation::new(Mechanism::ScramSha256Plus, &creds);
        assert!(matches!(result, Err(Error::MechanismUnusable { .. })));
    }

    #[test]
    fn test_token_for_password_mechanism_rejected() {
        let creds = Credentials::token("user", "tok");
        assert!(matches!(
            Negotiation::new(Mechanism::Plain, &creds),
            Err(Error::MechanismUnusable { .. })
        ));
    }

    #[test]
    fn test_xoauth2_error_challenge_answered_empty() {
        let creds = Credentials::token("user", "expired");
        let mut neg = Negotiation::new(Mechanism::XOAuth2, &creds).unwrap();
        let _ = neg.initial_response().unwrap().unwrap();

        // Server pushes back a JSON error; the answer is empty so the
        // terminal reply can follow.
        let error_blob = BASE64.encode(r#"{"status":"401","schemes":"bearer"}"#);
        let answer = neg.respond(&error_blob).unwrap();
        assert!(answer.is_empty());
    }
}
