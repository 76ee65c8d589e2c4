use super::*;
use sqlx::sqlite::SqlitePoolOptions;

/// In-memory SQLite capped at one connection so every query sees the same
/// database, with migrations applied.
async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("src/db/migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

#[test]
fn hash_and_verify_round_trip() {
    let hash = hash_password("hunter2");
    assert!(verify_password("hunter2", &hash));
    assert!(!verify_password("hunter3", &hash));
}

#[test]
fn hashes_are_salted() {
    let a = hash_password("same");
    let b = hash_password("same");
    assert_ne!(a, b, "two hashes of one password must differ by salt");
    assert!(verify_password("same", &a));
    assert!(verify_password("same", &b));
}

#[test]
fn verify_rejects_malformed_records() {
    assert!(!verify_password("x", "no-separator"));
    assert!(!verify_password("x", "!!!notbase64$deadbeef"));
    assert!(!verify_password("x", ""));
}

#[tokio::test]
async fn register_then_login() {
    let pool = test_pool().await;
    register(&pool, "alice", "s3cret").await.expect("register");
    login(&pool, "alice", "s3cret").await.expect("login");
}

#[tokio::test]
async fn duplicate_username_is_taken() {
    let pool = test_pool().await;
    register(&pool, "alice", "one").await.expect("first register");
    assert!(matches!(
        register(&pool, "alice", "two").await,
        Err(AuthError::UsernameTaken)
    ));
}

#[tokio::test]
async fn wrong_password_is_invalid_credentials() {
    let pool = test_pool().await;
    register(&pool, "alice", "right").await.expect("register");
    assert!(matches!(
        login(&pool, "alice", "wrong").await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn unknown_user_is_invalid_credentials() {
    let pool = test_pool().await;
    assert!(matches!(
        login(&pool, "ghost", "whatever").await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn user_exists_reflects_registration() {
    let pool = test_pool().await;
    assert!(!user_exists(&pool, "bob").await.unwrap());
    register(&pool, "bob", "pw").await.expect("register");
    assert!(user_exists(&pool, "bob").await.unwrap());
}

#[tokio::test]
async fn login_stamps_last_login() {
    let pool = test_pool().await;
    register(&pool, "alice", "pw").await.expect("register");

    let before: (Option<String>,) =
        sqlx::query_as("SELECT last_login FROM users WHERE username = 'alice'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(before.0.is_none());

    login(&pool, "alice", "pw").await.expect("login");
    let after: (Option<String>,) =
        sqlx::query_as("SELECT last_login FROM users WHERE username = 'alice'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(after.0.is_some());
}
