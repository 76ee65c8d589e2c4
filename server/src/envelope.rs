//! Envelope — the JSON message model for the whiteboard protocol.
//!
//! ARCHITECTURE
//! ============
//! Every message on the WebSocket wire is a minified JSON object with a
//! mandatory `type` field. Inbound envelopes deserialize into the tagged
//! [`Inbound`] sum; outbound envelopes are built by the [`outbound`]
//! constructors. Draw, cursor and shape events are re-broadcast verbatim
//! from the raw inbound text, so the parsed form only needs the fields
//! the server itself inspects.
//!
//! DESIGN
//! ======
//! - The envelope tag owns the `type` key, so the shape kind travels as
//!   `shapeType` (rectangle, circle, line, triangle, text, image).
//! - Unknown `type` values fail deserialization; the router logs and
//!   ignores them rather than terminating the connection.
//! - [`ShapeData`] keeps unrecognized fields in a flattened map so a
//!   save → load round trip preserves whatever the client sent.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Current time as milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// SHAPES
// =============================================================================

/// One vector shape as carried by `addShape` / `updateShape` and stored
/// in the per-room shape index. Kind-specific fields are optional; the
/// flattened `extra` map preserves anything this server does not model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeData {
    pub id: String,
    pub shape_type: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// =============================================================================
// ROOM SUMMARY
// =============================================================================

/// One row of a `roomList` message. Never carries the password or the
/// invitee list; private-room details stay server-side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub room_name: String,
    pub creator: String,
    pub participants: usize,
    pub max_participants: usize,
    pub is_public: bool,
    pub has_password: bool,
}

// =============================================================================
// INBOUND
// =============================================================================

fn default_true() -> bool {
    true
}

/// Every message a client may send, dispatched on the `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    SetUsername {
        username: String,
    },
    GetRooms,
    GetActiveUsers,
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        room_name: String,
        #[serde(default = "default_true")]
        is_public: bool,
        #[serde(default)]
        password: String,
        #[serde(default)]
        invited_users: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        #[serde(default)]
        password: String,
    },
    LeaveRoom,
    Draw {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: String,
        size: f64,
    },
    AddShape(ShapeData),
    UpdateShape(ShapeData),
    DeleteShape {
        id: String,
    },
    Clear,
    Cursor {
        x: f64,
        y: f64,
        #[serde(default)]
        username: String,
    },
    ChatMessage {
        message: String,
    },
    GetChatHistory,
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Constructors for every server→client envelope. All return minified
/// JSON ready for the frame encoder.
pub mod outbound {
    use serde::Serialize;
    use serde_json::json;

    use super::{RoomSummary, ShapeData};

    #[must_use]
    pub fn room_list(rooms: &[RoomSummary]) -> String {
        json!({ "type": "roomList", "rooms": rooms }).to_string()
    }

    #[must_use]
    pub fn active_users(users: &[String]) -> String {
        json!({ "type": "activeUsers", "users": users }).to_string()
    }

    #[must_use]
    pub fn room_created(room_id: &str, room_name: &str, is_public: bool) -> String {
        json!({
            "type": "roomCreated",
            "roomId": room_id,
            "roomName": room_name,
            "isPublic": is_public,
        })
        .to_string()
    }

    #[must_use]
    pub fn room_joined(room_id: &str, room_name: &str) -> String {
        json!({ "type": "roomJoined", "roomId": room_id, "roomName": room_name }).to_string()
    }

    #[must_use]
    pub fn new_public_room(room_id: &str, room_name: &str, creator: &str) -> String {
        json!({
            "type": "newPublicRoom",
            "roomId": room_id,
            "roomName": room_name,
            "creator": creator,
        })
        .to_string()
    }

    #[must_use]
    pub fn new_private_room_invite(
        room_id: &str,
        room_name: &str,
        creator: &str,
        has_password: bool,
    ) -> String {
        json!({
            "type": "newPrivateRoomInvite",
            "roomId": room_id,
            "roomName": room_name,
            "creator": creator,
            "hasPassword": has_password,
        })
        .to_string()
    }

    #[must_use]
    pub fn user_joined(username: &str) -> String {
        json!({ "type": "userJoined", "username": username }).to_string()
    }

    #[must_use]
    pub fn user_left(username: &str, participants: usize) -> String {
        json!({ "type": "userLeft", "username": username, "participants": participants }).to_string()
    }

    #[must_use]
    pub fn clear(username: &str) -> String {
        json!({ "type": "clear", "username": username }).to_string()
    }

    #[must_use]
    pub fn chat_message(username: &str, message: &str, timestamp: i64) -> String {
        json!({
            "type": "chatMessage",
            "username": username,
            "message": message,
            "timestamp": timestamp,
        })
        .to_string()
    }

    #[must_use]
    pub fn chat_history<T: Serialize>(messages: &[T]) -> String {
        json!({ "type": "chatHistory", "messages": messages }).to_string()
    }

    #[must_use]
    pub fn error(message: &str) -> String {
        json!({ "type": "error", "message": message }).to_string()
    }

    /// Synthetic envelope injected by the image upload port. The shape
    /// rides inside `payload` together with the target room name.
    #[must_use]
    pub fn shape_added(shape: &ShapeData, room_name: &str) -> String {
        let mut payload = serde_json::to_value(shape).unwrap_or_else(|_| json!({}));
        if let Some(map) = payload.as_object_mut() {
            map.insert("room".into(), json!(room_name));
        }
        json!({ "type": "shapeAdded", "payload": payload }).to_string()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "envelope_test.rs"]
mod tests;
