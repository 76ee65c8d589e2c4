//! Credential database initialization.
//!
//! SYSTEM CONTEXT
//! ==============
//! Startup uses this module to open the embedded SQLite store and enforce
//! schema migrations before either listener accepts traffic. Only the
//! auth service touches this pool.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::env_parse;

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Open the SQLite pool and run migrations.
///
/// # Errors
///
/// Returns an error if the connection or migrations fail.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS))
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;

    Ok(pool)
}
