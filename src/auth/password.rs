//! Password hashing and strength rules.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("stored password hash is malformed: {0}")]
    InvalidHash(String),
    #[error("{0}")]
    Weak(&'static str),
    #[error("password worker failed: {0}")]
    Worker(String),
}

/// Run argon2 work on the blocking pool so it does not stall the executor.
async fn run_blocking<F, T>(f: F) -> Result<T, PasswordError>
where
    F: FnOnce() -> Result<T, PasswordError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PasswordError::Worker(format!("task join error: {e}")))?
}

/// [`hash_password`] off the async worker threads.
pub async fn hash_password_async(password: String) -> Result<String, PasswordError> {
    run_blocking(move || hash_password(&password)).await
}

/// [`verify_password`] off the async worker threads.
pub async fn verify_password_async(password: String, hash: String) -> Result<bool, PasswordError> {
    run_blocking(move || verify_password(&password, &hash)).await
}

/// Hash `password` with Argon2id and a random salt, in PHC string form.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Check `password` against a stored PHC hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Reject passwords that are too short or entirely numeric.
pub fn check_strength(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::Weak(
            "Password must be at least 8 characters",
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(PasswordError::Weak("Password cannot be entirely numeric"));
    }
    Ok(())
}
