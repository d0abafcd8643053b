// Dual-mode credential verification: session token first, then username/password

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::sync::Arc;
use thiserror::Error;

use super::password;
use super::token::TokenSigner;
use super::types::{AuthFailure, Identity, TokenDecode};
use crate::db::{Database, StoreError};

#[derive(Debug, Error)]
enum VerifyError {
    #[error(transparent)]
    Rejected(#[from] AuthFailure),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolves a credential string (token or username) plus an optional password
/// to an `Identity`
///
/// Stateless: every call is independent and only reads the signing secret and
/// the identity store.
pub struct CredentialVerifier {
    signer: TokenSigner,
    store: Arc<Database>,
}

impl CredentialVerifier {
    pub fn new(signer: TokenSigner, store: Arc<Database>) -> Self {
        Lazy::force(&password::DUMMY_HASH);
        Self { signer, store }
    }

    /// The signer used to read tokens, shared with the issuing endpoint
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Verify at the current time
    ///
    /// `Ok(None)` for every authentication failure, whatever the cause.
    /// `Err` only when the identity store itself fails.
    pub fn verify(&self, credential: &str, password: &str) -> Result<Option<Identity>, StoreError> {
        self.verify_at(credential, password, Utc::now())
    }

    /// Verify as if the current time were `now`
    pub fn verify_at(
        &self,
        credential: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, StoreError> {
        match self.authenticate(credential, password, now) {
            Ok(identity) => Ok(Some(identity)),
            Err(VerifyError::Rejected(reason)) => {
                tracing::debug!("Credential rejected: {}", reason);
                Ok(None)
            }
            Err(VerifyError::Store(e)) => Err(e),
        }
    }

    fn authenticate(
        &self,
        credential: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Identity, VerifyError> {
        match self.signer.decode_at(credential, now) {
            TokenDecode::Decoded(username) => {
                if let Some(identity) = self.store.find_by_username(&username)? {
                    tracing::debug!("Authenticated {} by session token", identity.username);
                    return Ok(identity);
                }
                tracing::debug!("Token subject has no identity, trying password");
            }
            TokenDecode::NotAToken(AuthFailure::ExpiredCredential) => {
                tracing::debug!("Session token expired, trying password");
            }
            TokenDecode::NotAToken(_) => {}
        }

        let Some(identity) = self.store.find_by_username(credential)? else {
            password::verify_against_dummy(password);
            return Err(AuthFailure::UnknownIdentity.into());
        };

        if !password::verify_password(password, &identity.password_hash) {
            return Err(AuthFailure::PasswordMismatch.into());
        }

        tracing::debug!("Authenticated {} by password", identity.username);
        Ok(identity)
    }
}
