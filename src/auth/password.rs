// Salted one-way password hashing (Argon2id, PHC string format)

use anyhow::Result;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;

/// Hash checked when there is no stored hash, so a missing user costs as much
/// as a wrong password
pub(crate) static DUMMY_HASH: Lazy<String> = Lazy::new(|| {
    hash_password("ice-dummy-password").unwrap_or_else(|e| {
        tracing::error!("Failed to prepare dummy password hash: {}", e);
        String::new()
    })
});

#[cfg(test)]
thread_local! {
    pub(crate) static ARGON2_CHECKS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Hash a plaintext password with a fresh random salt
///
/// Deliberately expensive; call from a blocking context.
pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Check a candidate password against a stored PHC hash
///
/// An unparseable stored hash never verifies.
pub fn verify_password(plain: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {}", e);
            return false;
        }
    };

    #[cfg(test)]
    ARGON2_CHECKS.with(|n| n.set(n.get() + 1));

    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Spend the same Argon2 work as `verify_password` without a stored hash
///
/// Always rejects.
pub fn verify_against_dummy(plain: &str) -> bool {
    verify_password(plain, &DUMMY_HASH);
    false
}
