//! Password policy and Argon2id hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};

use crate::error::{PosError, PosResult};

/// Reject passwords that are too short or lack upper case, lower case or digits.
pub fn check_policy(password: &str, min_length: usize) -> PosResult<()> {
    if password.chars().count() < min_length {
        return Err(PosError::Validation(format!(
            "Password must be at least {min_length} characters"
        )));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(PosError::Validation(
            "Password must contain an uppercase letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(PosError::Validation(
            "Password must contain a lowercase letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PosError::Validation("Password must contain a digit".into()));
    }
    Ok(())
}

/// Hash with a fresh per-user salt, returning a PHC-format string.
pub fn hash_password(password: &str) -> PosResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PosError::Crypto(format!("hash error: {e}")))
}

/// `Ok(false)` on mismatch, `Err` only if the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> PosResult<bool> {
    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| PosError::Crypto(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PosError::Crypto(format!("verify error: {e}"))),
    }
}
