//! Control-plane router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The HTTP API runs on its own port next to the WebSocket session
//! listener, so board persistence traffic never competes with the
//! realtime socket loop. Every route carries permissive CORS, and the
//! `CorsLayer` answers preflight `OPTIONS` requests itself.

pub mod auth;
pub mod boards;
pub mod images;
pub mod upload;

use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/boards/save", post(boards::save_board))
        .route("/api/boards/list", get(boards::list_boards))
        .route("/api/boards/load/{board_id}", get(boards::load_board))
        .route("/api/boards/delete/{board_id}", delete(boards::delete_board))
        .route("/api/boards/export", post(boards::export_board))
        .route("/api/boards/import", post(boards::import_board))
        .route("/api/boards/generate-timelapse", post(boards::generate_timelapse))
        .route("/api/boards/timelapse-status/{job_id}", get(boards::timelapse_status))
        .route("/api/boards/timelapse-video/{job_id}", get(boards::timelapse_video))
        .route("/api/boards/uploadImage", post(upload::upload_image))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/check", post(auth::check))
        .route("/images/{filename}", get(images::serve_image))
        .route("/healthz", get(healthz))
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
