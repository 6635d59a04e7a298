use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use thiserror::Error;

/// Raised only when hashing itself cannot proceed (entropy exhaustion, invalid
/// parameters). Verification never produces this: a digest that cannot be parsed
/// is simply a non-match.
#[derive(Debug, Error)]
#[error("password hashing failed")]
pub struct HashError;

/// Produces a salted argon2id digest in PHC string format. The cost parameters
/// and salt travel inside the digest, so they can be raised later without
/// breaking verification of previously stored digests.
pub fn hash_password(password: &str) -> Result<String, HashError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|_| HashError)?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|_| HashError)?;
    let argon2 = Argon2::default();
    let digest = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| HashError)?
        .to_string();
    Ok(digest)
}

/// Recomputes the digest and compares. Fails closed: a malformed stored digest
/// and a wrong password are indistinguishable to the caller.
pub fn verify_password(password: &str, digest: &str) -> bool {
    match PasswordHash::new(digest) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
