//! Event router — dispatch of inbound envelopes.
//!
//! DESIGN
//! ======
//! `dispatch` parses one inbound text frame and routes it by `type`.
//! Handlers mutate rooms through `services::room` (which fans out to the
//! room under its own lock) and return [`Action`]s for everything else.
//! They never write sockets, so tests drive the whole protocol without
//! a network.
//!
//! ERROR HANDLING
//! ==============
//! Bad JSON earns an `error` envelope; a well-formed envelope with an
//! unknown or unparsable `type` is logged and ignored. Precondition
//! failures (no username, not in a room, entry refusals) answer the
//! sender only and have no side effects. Nothing here closes the
//! connection.

use tracing::{info, warn};

use crate::envelope::{outbound, Inbound};
use crate::services::fanout::{self, Action};
use crate::services::room;
use crate::state::{AppState, ConnId, OutboundQueue};

const ERR_INVALID: &str = "Invalid message format";
const ERR_USERNAME_REQUIRED: &str = "Username not set";
const ERR_NOT_IN_ROOM: &str = "You must join a room first";
const ERR_CHAT_UNAUTHENTICATED: &str = "Not authenticated or not in a room";
const ERR_CHAT_NOT_IN_ROOM: &str = "Not in a room";

// =============================================================================
// CONNECTION CONTEXT
// =============================================================================

/// Per-connection routing state, owned by the connection's read loop.
pub struct ConnContext {
    pub conn_id: ConnId,
    /// Set by `setUsername`.
    pub username: Option<String>,
    /// The one room this connection currently occupies.
    pub room_id: Option<String>,
    pub outbound: OutboundQueue,
}

impl ConnContext {
    #[must_use]
    pub fn new(conn_id: ConnId, outbound: OutboundQueue) -> Self {
        Self { conn_id, username: None, room_id: None, outbound }
    }

    fn reply(&self, payload: String) -> Vec<Action> {
        vec![Action::Unicast { to: self.conn_id, payload }]
    }

    fn error(&self, message: &str) -> Vec<Action> {
        self.reply(outbound::error(message))
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Route one inbound text frame and return the resulting outbound work.
pub async fn dispatch(state: &AppState, ctx: &mut ConnContext, raw: &str) -> Vec<Action> {
    let inbound: Inbound = match serde_json::from_str(raw) {
        Ok(msg) => msg,
        Err(e) => {
            // A well-formed envelope with a `type` we cannot handle is
            // ignored; only actually-broken JSON earns an error reply.
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
                if let Some(kind) = value.get("type").and_then(|t| t.as_str()) {
                    warn!(conn_id = %ctx.conn_id, kind, error = %e, "ignoring unhandled event");
                    return vec![];
                }
            }
            warn!(conn_id = %ctx.conn_id, error = %e, "invalid inbound JSON");
            return ctx.error(ERR_INVALID);
        }
    };

    match inbound {
        Inbound::SetUsername { username } => set_username(state, ctx, username).await,
        Inbound::GetRooms => {
            let rooms = room::public_room_summaries(state).await;
            ctx.reply(outbound::room_list(&rooms))
        }
        Inbound::GetActiveUsers => {
            let users = fanout::active_usernames(state).await;
            ctx.reply(outbound::active_users(&users))
        }
        Inbound::CreateRoom { room_name, is_public, password, invited_users } => {
            create_room(state, ctx, room_name, is_public, password, invited_users).await
        }
        Inbound::JoinRoom { room_id, password } => join_room(state, ctx, room_id, password).await,
        Inbound::LeaveRoom => leave_room(state, ctx).await,
        Inbound::Draw { .. } => {
            let Some(room_id) = ctx.room_id.clone() else {
                return ctx.error(ERR_NOT_IN_ROOM);
            };
            room::record_draw(state, &room_id, ctx.conn_id, raw).await;
            vec![]
        }
        Inbound::AddShape(shape) => {
            let Some(room_id) = ctx.room_id.clone() else {
                return ctx.error(ERR_NOT_IN_ROOM);
            };
            room::add_shape(state, &room_id, ctx.conn_id, shape, raw).await;
            vec![]
        }
        Inbound::UpdateShape(shape) => {
            let Some(room_id) = ctx.room_id.clone() else {
                return ctx.error(ERR_NOT_IN_ROOM);
            };
            room::update_shape(state, &room_id, ctx.conn_id, shape, raw).await;
            vec![]
        }
        Inbound::DeleteShape { id } => {
            let Some(room_id) = ctx.room_id.clone() else {
                return ctx.error(ERR_NOT_IN_ROOM);
            };
            room::delete_shape(state, &room_id, ctx.conn_id, &id, raw).await;
            vec![]
        }
        Inbound::Clear => {
            let Some(room_id) = ctx.room_id.clone() else {
                return ctx.error(ERR_NOT_IN_ROOM);
            };
            let username = ctx.username.clone().unwrap_or_default();
            room::clear_room(state, &room_id, &username).await;
            vec![]
        }
        Inbound::Cursor { .. } => {
            // Ephemeral; silently dropped when not in a room.
            if let Some(room_id) = ctx.room_id.clone() {
                room::broadcast_cursor(state, &room_id, ctx.conn_id, raw).await;
            }
            vec![]
        }
        Inbound::ChatMessage { message } => {
            let (Some(username), Some(room_id)) = (ctx.username.clone(), ctx.room_id.clone())
            else {
                return ctx.error(ERR_CHAT_UNAUTHENTICATED);
            };
            room::record_chat(state, &room_id, ctx.conn_id, &username, &message).await;
            vec![]
        }
        Inbound::GetChatHistory => {
            let Some(room_id) = ctx.room_id.clone() else {
                return ctx.error(ERR_CHAT_NOT_IN_ROOM);
            };
            let messages = room::chat_history_snapshot(state, &room_id).await;
            ctx.reply(outbound::chat_history(&messages))
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn set_username(state: &AppState, ctx: &mut ConnContext, username: String) -> Vec<Action> {
    ctx.username = Some(username.clone());
    {
        let mut connections = state.connections.write().await;
        if let Some(entry) = connections.get_mut(&ctx.conn_id) {
            entry.username = Some(username.clone());
        }
    }
    info!(conn_id = %ctx.conn_id, %username, "username set");

    let rooms = room::room_summaries_for(state, &username).await;
    ctx.reply(outbound::room_list(&rooms))
}

async fn create_room(
    state: &AppState,
    ctx: &mut ConnContext,
    room_name: String,
    is_public: bool,
    password: String,
    invited_users: Vec<String>,
) -> Vec<Action> {
    let Some(username) = ctx.username.clone() else {
        return ctx.error(ERR_USERNAME_REQUIRED);
    };

    // One room per connection: creating implies leaving the current one.
    if let Some(old_room) = ctx.room_id.take() {
        room::leave_room(state, &old_room, ctx.conn_id).await;
    }

    let created = room::create_room(
        state,
        ctx.conn_id,
        &username,
        ctx.outbound.clone(),
        &room_name,
        is_public,
        password,
        invited_users,
    )
    .await;
    ctx.room_id = Some(created.room_id.clone());

    let mut actions =
        ctx.reply(outbound::room_created(&created.room_id, &created.room_name, created.is_public));
    if created.is_public {
        actions.push(Action::Global {
            payload: outbound::new_public_room(&created.room_id, &created.room_name, &created.creator),
        });
    } else {
        actions.push(Action::Multicast {
            usernames: created.invitees.clone(),
            payload: outbound::new_private_room_invite(
                &created.room_id,
                &created.room_name,
                &created.creator,
                created.has_password,
            ),
        });
    }
    actions.push(Action::RefreshRoomLists);
    actions
}

async fn join_room(
    state: &AppState,
    ctx: &mut ConnContext,
    room_id: String,
    password: String,
) -> Vec<Action> {
    let Some(username) = ctx.username.clone() else {
        return ctx.error(ERR_USERNAME_REQUIRED);
    };

    if let Some(old_room) = ctx.room_id.take() {
        room::leave_room(state, &old_room, ctx.conn_id).await;
    }

    match room::join_room(state, ctx.conn_id, &username, ctx.outbound.clone(), &room_id, &password)
        .await
    {
        Ok(()) => {
            ctx.room_id = Some(room_id);
            vec![Action::RefreshRoomLists]
        }
        Err(refusal) => ctx.error(&refusal.to_string()),
    }
}

async fn leave_room(state: &AppState, ctx: &mut ConnContext) -> Vec<Action> {
    let Some(room_id) = ctx.room_id.take() else {
        return ctx.error(ERR_NOT_IN_ROOM);
    };
    room::leave_room(state, &room_id, ctx.conn_id).await;
    vec![Action::RefreshRoomLists]
}

// =============================================================================
// DISCONNECT
// =============================================================================

/// Tear down a connection: leave its room (announcing the departure),
/// refresh room lists, and drop the registry entry. Runs for peer
/// closes, read/write failures, and queue-overflow evictions alike.
pub async fn disconnect(state: &AppState, ctx: &ConnContext) {
    if let Some(room_id) = &ctx.room_id {
        if room::leave_room(state, room_id, ctx.conn_id).await {
            fanout::refresh_room_lists(state).await;
        }
    }
    let mut connections = state.connections.write().await;
    connections.remove(&ctx.conn_id);
    info!(conn_id = %ctx.conn_id, "connection closed");
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
