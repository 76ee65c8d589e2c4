//! Board persistence and timelapse endpoints.
//!
//! Response bodies follow the `{success, ...}` convention used across
//! the board API; failures carry `{success: false, error}`.

use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::envelope::ShapeData;
use crate::services::room;
use crate::services::storage::StorageError;
use crate::services::timelapse::{self, JobStatus};
use crate::state::AppState;

pub(crate) fn storage_error_response(err: &StorageError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::NotOwner { .. } => StatusCode::FORBIDDEN,
        StorageError::Serde(_) => StatusCode::BAD_REQUEST,
        StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "success": false, "error": err.to_string() })))
}

// =============================================================================
// SAVE / LIST / LOAD / DELETE
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBoardBody {
    pub board_name: String,
    #[serde(default)]
    pub room_id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub shapes: Option<Vec<ShapeData>>,
    #[serde(default)]
    pub strokes: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub eraser_strokes: Option<Vec<serde_json::Value>>,
}

/// `POST /api/boards/save` — snapshot a live room or client-sent arrays.
pub async fn save_board(
    State(state): State<AppState>,
    Json(body): Json<SaveBoardBody>,
) -> Response {
    let (room_id, shapes, strokes, eraser_strokes) = match body.room_id.as_deref() {
        Some(room_id) if !room_id.is_empty() => {
            let Some(shapes) = room::shape_snapshot(&state, room_id).await else {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "success": false, "error": "Room not found" })),
                )
                    .into_response();
            };
            (room_id.to_owned(), shapes, vec![], vec![])
        }
        _ => (
            String::new(),
            body.shapes.unwrap_or_default(),
            body.strokes.unwrap_or_default(),
            body.eraser_strokes.unwrap_or_default(),
        ),
    };

    match state
        .boards
        .save(&body.board_name, &room_id, shapes, strokes, eraser_strokes, &body.username)
        .await
    {
        Ok(meta) => Json(json!({
            "success": true,
            "boardId": meta.board_id,
            "message": "Board saved successfully",
        }))
        .into_response(),
        Err(e) => storage_error_response(&e).into_response(),
    }
}

/// `GET /api/boards/list`
pub async fn list_boards(State(state): State<AppState>) -> Json<serde_json::Value> {
    let boards = state.boards.list().await;
    Json(json!({ "success": true, "boards": boards }))
}

/// `GET /api/boards/load/{board_id}`
pub async fn load_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Response {
    match state.boards.load(&board_id).await {
        Ok(board) => Json(json!({ "success": true, "board": board })).into_response(),
        Err(e) => storage_error_response(&e).into_response(),
    }
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub username: Option<String>,
}

/// `DELETE /api/boards/delete/{board_id}?username=…` — owner only.
pub async fn delete_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Response {
    let Some(username) = query.username.filter(|u| !u.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "username is required" })),
        )
            .into_response();
    };

    match state.boards.delete(&board_id, &username).await {
        Ok(()) => Json(json!({ "success": true, "message": "Board deleted successfully" }))
            .into_response(),
        Err(e) => storage_error_response(&e).into_response(),
    }
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBody {
    pub board_id: String,
}

/// `POST /api/boards/export`
pub async fn export_board(
    State(state): State<AppState>,
    Json(body): Json<ExportBody>,
) -> Response {
    match state.boards.export(&body.board_id).await {
        Ok(data) => Json(json!({ "success": true, "data": data })).into_response(),
        Err(e) => storage_error_response(&e).into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBody {
    pub board_name: String,
    pub data: String,
    pub username: String,
}

/// `POST /api/boards/import`
pub async fn import_board(
    State(state): State<AppState>,
    Json(body): Json<ImportBody>,
) -> Response {
    match state.boards.import(&body.board_name, &body.data, &body.username).await {
        Ok(meta) => Json(json!({
            "success": true,
            "boardId": meta.board_id,
            "message": "Board imported successfully",
        }))
        .into_response(),
        Err(e) => storage_error_response(&e).into_response(),
    }
}

// =============================================================================
// TIMELAPSE
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTimelapseBody {
    pub board_id: String,
    #[serde(default)]
    pub duration: Option<u32>,
}

/// `POST /api/boards/generate-timelapse` — 202 with a pollable job id.
pub async fn generate_timelapse(
    State(state): State<AppState>,
    Json(body): Json<GenerateTimelapseBody>,
) -> Response {
    if state.renderer.is_none() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "error": "timelapse renderer not configured" })),
        )
            .into_response();
    }

    let duration = body.duration.unwrap_or(timelapse::DEFAULT_DURATION_SECONDS);
    let job = state.jobs.create(&body.board_id);
    tokio::spawn(timelapse::run_generation(
        state.clone(),
        job.job_id.clone(),
        body.board_id,
        duration,
    ));

    (
        StatusCode::ACCEPTED,
        Json(json!({ "jobId": job.job_id, "status": job.status })),
    )
        .into_response()
}

/// `GET /api/boards/timelapse-status/{job_id}`
pub async fn timelapse_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let Some(job) = state.jobs.get(&job_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "Job not found" })),
        )
            .into_response();
    };

    let mut body = json!({
        "status": job.status,
        "progress": job.progress,
        "message": job.message,
    });
    if job.status == JobStatus::Completed {
        body["videoUrl"] = json!(format!("/api/boards/timelapse-video/{job_id}"));
    }
    Json(body).into_response()
}

/// `GET /api/boards/timelapse-video/{job_id}` — the finished MP4.
pub async fn timelapse_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let is_ready = state
        .jobs
        .get(&job_id)
        .is_some_and(|job| job.status == JobStatus::Completed);
    if !is_ready {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "Video not ready" })),
        )
            .into_response();
    }

    match tokio::fs::read(state.boards.timelapse_path(&job_id)).await {
        Ok(bytes) => (
            [
                (CONTENT_TYPE, "video/mp4".to_owned()),
                (
                    CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{job_id}.mp4\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "Video file missing" })),
        )
            .into_response(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "boards_test.rs"]
mod tests;
