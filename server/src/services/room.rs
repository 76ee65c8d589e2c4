//! Room service — registry operations and room-scoped fan-out.
//!
//! DESIGN
//! ======
//! Every function that mutates a room also enqueues the resulting
//! broadcast on its members *before releasing the rooms write lock*.
//! That single serialization domain is what guarantees that all members
//! observe broadcasts in one total order, and that a joiner's replay
//! prefix is exactly the log at join time with no live event interleaved.
//!
//! Access control lives here too: entry validation runs in the fixed
//! order exists → invited → password → capacity, and refusals carry the
//! exact client-facing messages.

use std::collections::HashSet;

use tracing::info;
use uuid::Uuid;

use crate::envelope::{outbound, ShapeData};
use crate::services::chat::ChatMessage;
use crate::state::{AppState, ConnId, OutboundQueue, Room, RoomMember};

// =============================================================================
// ERRORS
// =============================================================================

/// Why a join was refused. Display strings go to the client verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinRefusal {
    #[error("Room not found")]
    NotFound,
    #[error("You are not invited to this private room")]
    NotInvited,
    #[error("Incorrect password")]
    WrongPassword,
    #[error("Room is full")]
    Full,
}

// =============================================================================
// CREATE
// =============================================================================

/// What the router needs to announce a freshly created room.
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub room_id: String,
    pub room_name: String,
    pub creator: String,
    pub is_public: bool,
    pub has_password: bool,
    pub invitees: Vec<String>,
}

/// Create a room with the sender as first participant.
pub async fn create_room(
    state: &AppState,
    conn_id: ConnId,
    username: &str,
    queue: OutboundQueue,
    room_name: &str,
    is_public: bool,
    password: String,
    invited_users: Vec<String>,
) -> CreatedRoom {
    let room_id = Uuid::new_v4().to_string();
    let invitees: HashSet<String> =
        if is_public { HashSet::new() } else { invited_users.into_iter().collect() };

    let mut room = Room::new(
        room_id.clone(),
        room_name.to_owned(),
        username.to_owned(),
        is_public,
        password,
        invitees.clone(),
        state.config.max_participants,
    );
    room.members.insert(conn_id, RoomMember { username: username.to_owned(), outbound: queue });

    let created = CreatedRoom {
        room_id: room_id.clone(),
        room_name: room_name.to_owned(),
        creator: username.to_owned(),
        is_public,
        has_password: room.has_password(),
        invitees: invitees.into_iter().collect(),
    };

    let mut rooms = state.rooms.write().await;
    rooms.insert(room_id.clone(), room);
    info!(%room_id, room_name, %username, is_public, "room created");

    created
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

/// Join a room: validate, ack, replay, announce, atomically with
/// respect to the room.
///
/// The joiner's queue receives `roomJoined`, then the replay log exactly
/// as it exists now; only then does the member record go in, so every
/// later broadcast is strictly after the replay prefix.
///
/// # Errors
///
/// A [`JoinRefusal`] in validation order; refusals have no side effects.
pub async fn join_room(
    state: &AppState,
    conn_id: ConnId,
    username: &str,
    queue: OutboundQueue,
    room_id: &str,
    password: &str,
) -> Result<(), JoinRefusal> {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(room_id) else {
        return Err(JoinRefusal::NotFound);
    };

    if !room.is_public && username != room.creator && !room.invitees.contains(username) {
        return Err(JoinRefusal::NotInvited);
    }
    if room.has_password() && room.password != password {
        return Err(JoinRefusal::WrongPassword);
    }
    if room.is_full() {
        return Err(JoinRefusal::Full);
    }

    queue.enqueue(&outbound::room_joined(&room.room_id, &room.room_name));
    for entry in &room.replay {
        queue.enqueue(entry);
    }

    room.members.insert(conn_id, RoomMember { username: username.to_owned(), outbound: queue });
    room.broadcast(&outbound::user_joined(username), Some(conn_id));
    room.push_chat(ChatMessage::joined_notice(room_id, username));

    info!(%room_id, %username, participants = room.members.len(), "user joined room");
    Ok(())
}

/// Remove a connection from a room, announce the departure, and collect
/// the room if it ended up empty (always keeping at least one room
/// alive). Returns `false` when the connection was not a member.
pub async fn leave_room(state: &AppState, room_id: &str, conn_id: ConnId) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(room_id) else {
        return false;
    };
    let Some(member) = room.members.remove(&conn_id) else {
        return false;
    };
    let username = member.username;

    room.broadcast(&outbound::user_left(&username, room.members.len()), None);
    room.push_chat(ChatMessage::left_notice(room_id, &username));
    info!(%room_id, %username, remaining = room.members.len(), "user left room");
    let now_empty = room.is_empty();

    if now_empty && rooms.len() > 1 {
        rooms.remove(room_id);
        info!(%room_id, "removed empty room");
    }
    true
}

// =============================================================================
// BOARD EVENTS
// =============================================================================

/// Append a freehand stroke to the replay log and relay it to the rest
/// of the room. Returns `false` if the room is gone.
pub async fn record_draw(state: &AppState, room_id: &str, conn_id: ConnId, raw: &str) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(room_id) else {
        return false;
    };
    room.push_replay(raw.to_owned(), state.config.replay_soft_cap);
    room.broadcast(raw, Some(conn_id));
    true
}

/// Index a new shape, log it, relay it.
pub async fn add_shape(
    state: &AppState,
    room_id: &str,
    conn_id: ConnId,
    shape: ShapeData,
    raw: &str,
) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(room_id) else {
        return false;
    };
    room.shapes.insert(shape.id.clone(), shape);
    room.push_replay(raw.to_owned(), state.config.replay_soft_cap);
    room.broadcast(raw, Some(conn_id));
    true
}

/// Upsert the latest shape state. The replay log keeps the earlier
/// version too; the index is authoritative.
pub async fn update_shape(
    state: &AppState,
    room_id: &str,
    conn_id: ConnId,
    shape: ShapeData,
    raw: &str,
) -> bool {
    add_shape(state, room_id, conn_id, shape, raw).await
}

/// Drop a shape from the index, log the deletion, relay it.
pub async fn delete_shape(
    state: &AppState,
    room_id: &str,
    conn_id: ConnId,
    shape_id: &str,
    raw: &str,
) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(room_id) else {
        return false;
    };
    room.shapes.remove(shape_id);
    room.push_replay(raw.to_owned(), state.config.replay_soft_cap);
    room.broadcast(raw, Some(conn_id));
    true
}

/// Truncate the board. Every member receives the clear notification,
/// the sender included.
pub async fn clear_room(state: &AppState, room_id: &str, username: &str) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(room_id) else {
        return false;
    };
    room.clear_board();
    room.broadcast(&outbound::clear(username), None);
    info!(%room_id, %username, "canvas cleared");
    true
}

/// Relay a cursor position. Ephemeral: never logged.
pub async fn broadcast_cursor(state: &AppState, room_id: &str, conn_id: ConnId, raw: &str) {
    let rooms = state.rooms.read().await;
    if let Some(room) = rooms.get(room_id) {
        room.broadcast(raw, Some(conn_id));
    }
}

// =============================================================================
// CHAT
// =============================================================================

/// Record a chat message and relay it to the rest of the room.
pub async fn record_chat(
    state: &AppState,
    room_id: &str,
    conn_id: ConnId,
    username: &str,
    text: &str,
) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(room_id) else {
        return false;
    };
    let message = ChatMessage::new(crate::services::chat::ChatKind::Chat, username, text, room_id);
    let payload = outbound::chat_message(username, text, message.timestamp);
    room.push_chat(message);
    room.broadcast(&payload, Some(conn_id));
    true
}

/// Snapshot a room's chat history for a `chatHistory` reply.
pub async fn chat_history_snapshot(state: &AppState, room_id: &str) -> Vec<ChatMessage> {
    let rooms = state.rooms.read().await;
    rooms
        .get(room_id)
        .map(|room| room.chat.iter().cloned().collect())
        .unwrap_or_default()
}

// =============================================================================
// LOOKUPS
// =============================================================================

/// Resolve a room by its human-readable name (first match). The upload
/// port addresses rooms by name, not id.
pub async fn find_room_id_by_name(state: &AppState, room_name: &str) -> Option<String> {
    let rooms = state.rooms.read().await;
    rooms
        .values()
        .find(|room| room.room_name == room_name)
        .map(|room| room.room_id.clone())
}

/// Inject a synthetic image shape (from the upload port): index it,
/// log it, broadcast to every member. Returns the broadcast payload, or
/// `None` when the room does not exist.
pub async fn inject_image_shape(
    state: &AppState,
    room_id: &str,
    room_name: &str,
    shape: ShapeData,
) -> Option<String> {
    let mut rooms = state.rooms.write().await;
    let room = rooms.get_mut(room_id)?;

    let payload = outbound::shape_added(&shape, room_name);
    room.shapes.insert(shape.id.clone(), shape);
    room.push_replay(payload.clone(), state.config.replay_soft_cap);
    room.broadcast(&payload, None);
    Some(payload)
}

/// Rooms visible to `username`, oldest first.
pub async fn room_summaries_for(state: &AppState, username: &str) -> Vec<crate::envelope::RoomSummary> {
    let rooms = state.rooms.read().await;
    let mut visible: Vec<_> = rooms
        .values()
        .filter(|room| room.visible_to(username))
        .map(|room| (room.created_at, room.summary()))
        .collect();
    visible.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.room_id.cmp(&b.1.room_id)));
    visible.into_iter().map(|(_, summary)| summary).collect()
}

/// Public rooms only, oldest first. Used by `getRooms` before a client
/// has identified itself.
pub async fn public_room_summaries(state: &AppState) -> Vec<crate::envelope::RoomSummary> {
    let rooms = state.rooms.read().await;
    let mut visible: Vec<_> = rooms
        .values()
        .filter(|room| room.is_public)
        .map(|room| (room.created_at, room.summary()))
        .collect();
    visible.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.room_id.cmp(&b.1.room_id)));
    visible.into_iter().map(|(_, summary)| summary).collect()
}

/// Snapshot a room's indexed shapes (used by board save).
pub async fn shape_snapshot(state: &AppState, room_id: &str) -> Option<Vec<ShapeData>> {
    let rooms = state.rooms.read().await;
    rooms.get(room_id).map(|room| room.shapes.values().cloned().collect())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
