//! Image upload port — persist uploaded bytes and inject the board event.
//!
//! DESIGN
//! ======
//! Uploads are addressed to a room by *name*. The bytes are written under
//! a random filename (never the client's), dimensions are probed straight
//! from the image header, and a synthetic `shapeAdded` envelope is
//! appended to the room's replay log, indexed, and broadcast, so both
//! live members and late joiners see the image.
//!
//! Dimension probing reads the PNG/GIF/JPEG headers by hand; anything
//! undecodable falls back to 200×200.

use tracing::info;
use uuid::Uuid;

use crate::envelope::ShapeData;
use crate::services::room;
use crate::state::AppState;

/// Dimensions used when the image header cannot be decoded.
pub const FALLBACK_DIMENSIONS: (u32, u32) = (200, 200);

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a stored upload, echoed back to the HTTP caller.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub filename: String,
    pub image_url: String,
}

/// Persist an uploaded image and broadcast it into `room_name`.
///
/// # Errors
///
/// `RoomNotFound` when no room bears that name; `Io` when the file
/// cannot be written. Nothing is written for an unknown room.
pub async fn store_upload(
    state: &AppState,
    room_name: &str,
    host: &str,
    bytes: &[u8],
    content_type: Option<&str>,
) -> Result<StoredImage, UploadError> {
    let Some(room_id) = room::find_room_id_by_name(state, room_name).await else {
        return Err(UploadError::RoomNotFound(room_name.to_owned()));
    };

    let image_id = Uuid::new_v4().to_string();
    let filename = format!("{image_id}.{}", extension_for(content_type, bytes));
    let images_dir = state.boards.images_dir();
    tokio::fs::create_dir_all(&images_dir).await?;
    tokio::fs::write(images_dir.join(&filename), bytes).await?;

    let (width, height) = probe_dimensions(bytes).unwrap_or(FALLBACK_DIMENSIONS);
    let image_url = format!("http://{host}/images/{filename}");

    let shape = image_shape(&image_id, &image_url, width, height);
    if room::inject_image_shape(state, &room_id, room_name, shape).await.is_none() {
        // Room vanished between lookup and insert.
        return Err(UploadError::RoomNotFound(room_name.to_owned()));
    }

    info!(%room_name, %filename, width, height, size = bytes.len(), "image uploaded");
    Ok(StoredImage { filename, image_url })
}

fn image_shape(image_id: &str, url: &str, width: u32, height: u32) -> ShapeData {
    ShapeData {
        id: format!("img-{image_id}"),
        shape_type: "IMAGE".into(),
        x: 100.0,
        y: 100.0,
        width: Some(f64::from(width)),
        height: Some(f64::from(height)),
        radius: None,
        end_x: None,
        end_y: None,
        color: None,
        size: None,
        fill_color: None,
        text: None,
        font_size: None,
        url: Some(url.to_owned()),
        username: None,
        timestamp: None,
        extra: serde_json::Map::new(),
    }
}

// =============================================================================
// FORMAT DETECTION
// =============================================================================

/// File extension for the stored image: sniffed from the bytes first,
/// then from the declared content type.
#[must_use]
pub fn extension_for(content_type: Option<&str>, bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        return "png";
    }
    if bytes.starts_with(b"GIF8") {
        return "gif";
    }
    if bytes.starts_with(&[0xFF, 0xD8]) {
        return "jpg";
    }
    match content_type {
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        Some("image/svg+xml") => "svg",
        _ => "bin",
    }
}

/// Probe pixel dimensions from a PNG, GIF or JPEG header.
#[must_use]
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    png_dimensions(bytes)
        .or_else(|| gif_dimensions(bytes))
        .or_else(|| jpeg_dimensions(bytes))
}

/// PNG: 8-byte signature, then the IHDR chunk with width/height at
/// byte offsets 16 and 20 (big-endian).
fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 24 || !bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return None;
    }
    if &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    Some((width, height))
}

/// GIF: logical screen size, little-endian, right after the 6-byte magic.
fn gif_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 10 || (!bytes.starts_with(b"GIF87a") && !bytes.starts_with(b"GIF89a")) {
        return None;
    }
    let width = u32::from(u16::from_le_bytes([bytes[6], bytes[7]]));
    let height = u32::from(u16::from_le_bytes([bytes[8], bytes[9]]));
    Some((width, height))
}

/// JPEG: walk the marker segments until a start-of-frame, which carries
/// height then width as big-endian u16s.
fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        // Fill bytes and standalone markers carry no length field.
        if marker == 0xFF {
            i += 1;
            continue;
        }
        if (0xD0..=0xD9).contains(&marker) {
            i += 2;
            continue;
        }
        let len = usize::from(u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]));
        if len < 2 {
            return None;
        }
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            if i + 9 > bytes.len() {
                return None;
            }
            let height = u32::from(u16::from_be_bytes([bytes[i + 5], bytes[i + 6]]));
            let width = u32::from(u16::from_be_bytes([bytes[i + 7], bytes[i + 8]]));
            return Some((width, height));
        }
        i += 2 + len;
    }
    None
}

// =============================================================================
// STATIC SERVING RULES
// =============================================================================

/// Filenames accepted by `GET /images/<name>` on either port. Uploads
/// are always flat random names, so path separators and parent
/// references can only mean traversal and are rejected outright.
#[must_use]
pub fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
}

/// Content type by extension for served images.
#[must_use]
pub fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".svg") {
        "image/svg+xml"
    } else {
        "application/octet-stream"
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "image_test.rs"]
mod tests;
