// Authentication types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// An authenticated user's username binding plus its stored credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    /// Argon2 PHC string, never serialized into responses
    pub password_hash: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Process-wide signing key shared by the token issuer and the verifier
///
/// Loaded once at startup and never mutated afterwards.
#[derive(Clone)]
pub struct SharedSecret(Arc<str>);

impl SharedSecret {
    /// Wrap a secret value. Returns `None` for empty or whitespace-only input.
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let value = value.as_ref();
        if value.trim().is_empty() {
            return None;
        }
        Some(Self(Arc::from(value)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Why a credential was not accepted
///
/// Only ever logged; the verifier boundary collapses all of these into `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("credential is not a well-formed signed token")]
    MalformedCredential,

    #[error("token signature is valid but the token has expired")]
    ExpiredCredential,

    #[error("no identity matches the credential")]
    UnknownIdentity,

    #[error("password does not match the stored hash")]
    PasswordMismatch,
}

/// Outcome of attempting to read a credential as a session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenDecode {
    /// Signature and expiry checked out; carries the embedded username
    Decoded(String),
    /// Not usable as a token, either `MalformedCredential` or `ExpiredCredential`
    NotAToken(AuthFailure),
}

/// Token header segment: algorithm plus issue and expiry times (unix seconds)
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TokenHeader {
    pub alg: String,
    pub iat: i64,
    pub exp: i64,
}

/// Token payload segment
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TokenPayload {
    pub username: String,
}
