//! Image upload endpoint.
//!
//! `POST /api/boards/uploadImage?room=<name>` with multipart form data.
//! The multipart body is parsed binary-clean by axum; the first field
//! carrying a filename is taken as the image. The stored file gets a
//! random name; the client's filename is never trusted.

use axum::extract::{Multipart, Query, State};
use axum::http::header::HOST;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::services::image::{self, UploadError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub room: Option<String>,
}

/// `POST /api/boards/uploadImage?room=<name>`
pub async fn upload_image(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let Some(room_name) = query.room.filter(|r| !r.is_empty()) else {
        return bad_request("room query parameter is required");
    };
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
        .to_owned();

    // Take the first field that carries a filename.
    let mut upload: Option<(Vec<u8>, Option<String>)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.file_name().is_none() {
                    continue;
                }
                let content_type = field.content_type().map(str::to_owned);
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some((bytes.to_vec(), content_type));
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed reading multipart field");
                        return bad_request("Invalid multipart body");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed parsing multipart body");
                return bad_request("Invalid multipart body");
            }
        }
    }

    let Some((bytes, content_type)) = upload else {
        return bad_request("No file uploaded");
    };
    if bytes.is_empty() {
        return bad_request("Uploaded file is empty");
    }

    match image::store_upload(&state, &room_name, &host, &bytes, content_type.as_deref()).await {
        Ok(stored) => Json(json!({
            "success": true,
            "imageUrl": stored.image_url,
            "filename": stored.filename,
        }))
        .into_response(),
        Err(e @ UploadError::RoomNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}
