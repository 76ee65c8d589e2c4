//! Static image serving on the control-plane port.
//!
//! The same directory is served by the session port's raw handler; both
//! apply the same filename rules from the image service.

use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::image;
use crate::state::AppState;

/// `GET /images/{filename}`
pub async fn serve_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    if !image::is_safe_filename(&filename) {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    match tokio::fs::read(state.boards.images_dir().join(&filename)).await {
        Ok(bytes) => (
            [
                (CONTENT_TYPE, image::content_type_for(&filename).to_owned()),
                (CACHE_CONTROL, "public, max-age=3600".to_owned()),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}
