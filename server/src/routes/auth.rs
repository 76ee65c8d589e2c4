//! Authentication endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::services::auth::{self, AuthError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CredentialsBody {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CheckBody {
    pub username: String,
}

/// `POST /api/auth/register` — 201 on success, 409 when taken.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> Response {
    match auth::register(&state.pool, &body.username, &body.password).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "success": true, "message": "Registration successful" })),
        )
            .into_response(),
        Err(AuthError::UsernameTaken) => (
            StatusCode::CONFLICT,
            Json(json!({ "success": false, "message": "Username already exists" })),
        )
            .into_response(),
        Err(e) => internal_error(&e),
    }
}

/// `POST /api/auth/login` — 200 on success, 401 otherwise.
pub async fn login(State(state): State<AppState>, Json(body): Json<CredentialsBody>) -> Response {
    match auth::login(&state.pool, &body.username, &body.password).await {
        Ok(()) => Json(json!({
            "success": true,
            "message": "Login successful",
            "username": body.username,
        }))
        .into_response(),
        Err(AuthError::InvalidCredentials) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Invalid username or password" })),
        )
            .into_response(),
        Err(e) => internal_error(&e),
    }
}

/// `POST /api/auth/check` — whether a username is registered.
pub async fn check(State(state): State<AppState>, Json(body): Json<CheckBody>) -> Response {
    match auth::user_exists(&state.pool, &body.username).await {
        Ok(exists) => Json(json!({ "exists": exists })).into_response(),
        Err(e) => internal_error(&e),
    }
}

fn internal_error(err: &AuthError) -> Response {
    error!(error = %err, "auth endpoint failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": "Internal server error" })),
    )
        .into_response()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
