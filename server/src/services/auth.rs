//! Account service — register, login, existence checks.
//!
//! DESIGN
//! ======
//! Credentials live in the embedded SQLite store; passwords are stored as
//! `salt$digest` where digest = SHA-256(salt bytes || password). Route
//! handlers translate [`AuthError`] into 409/401 responses.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// PASSWORD HASHING
// =============================================================================

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Hash a password with a fresh random salt.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    format!("{}${}", BASE64.encode(salt), digest_hex(&salt, password))
}

/// Check a password against a stored `salt$digest` record.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_b64, digest)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = BASE64.decode(salt_b64) else {
        return false;
    };
    digest_hex(&salt, password) == digest
}

fn digest_hex(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Create an account.
///
/// # Errors
///
/// `UsernameTaken` when the name is already registered.
pub async fn register(pool: &SqlitePool, username: &str, password: &str) -> Result<(), AuthError> {
    let hash = hash_password(password);
    let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?1, ?2)")
        .bind(username)
        .bind(&hash)
        .execute(pool)
        .await;

    match result {
        Ok(_) => {
            info!(%username, "user registered");
            Ok(())
        }
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(AuthError::UsernameTaken),
        Err(e) => Err(e.into()),
    }
}

/// Verify credentials and stamp `last_login`.
///
/// # Errors
///
/// `InvalidCredentials` for an unknown user or wrong password.
pub async fn login(pool: &SqlitePool, username: &str, password: &str) -> Result<(), AuthError> {
    let stored: Option<(String,)> =
        sqlx::query_as("SELECT password_hash FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(pool)
            .await?;

    let Some((hash,)) = stored else {
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password(password, &hash) {
        return Err(AuthError::InvalidCredentials);
    }

    sqlx::query("UPDATE users SET last_login = datetime('now') WHERE username = ?1")
        .bind(username)
        .execute(pool)
        .await?;

    info!(%username, "user logged in");
    Ok(())
}

/// Whether a username is registered.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn user_exists(pool: &SqlitePool, username: &str) -> Result<bool, AuthError> {
    let exists: (i64,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)")
        .bind(username)
        .fetch_one(pool)
        .await?;
    Ok(exists.0 != 0)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
