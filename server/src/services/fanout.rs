//! Fan-out fabric — delivery of router actions outside a single room.
//!
//! DESIGN
//! ======
//! The router returns a list of [`Action`]s; this module executes them
//! against the connection table. Room-scoped broadcasts and the join
//! composite are *not* actions: they run inside `services::room` under
//! the rooms lock so they share the mutation's serialization domain.
//!
//! Delivery is best-effort `try_send`: a full queue latches that
//! connection's shutdown signal and the frame is dropped. See the
//! backpressure policy on `OutboundQueue`.

use crate::envelope::outbound;
use crate::state::{AppState, ConnId};

/// Outbound work the router asks for.
#[derive(Debug, Clone)]
pub enum Action {
    /// Deliver one payload to one connection.
    Unicast { to: ConnId, payload: String },
    /// Deliver to every connection whose username is in the list.
    Multicast { usernames: Vec<String>, payload: String },
    /// Deliver to every connection.
    Global { payload: String },
    /// Push a personalized, visibility-filtered `roomList` to every
    /// identified connection.
    RefreshRoomLists,
}

/// Execute a batch of actions in order.
pub async fn execute(state: &AppState, actions: Vec<Action>) {
    for action in actions {
        match action {
            Action::Unicast { to, payload } => unicast(state, to, &payload).await,
            Action::Multicast { usernames, payload } => multicast(state, &usernames, &payload).await,
            Action::Global { payload } => global(state, &payload).await,
            Action::RefreshRoomLists => refresh_room_lists(state).await,
        }
    }
}

/// Deliver one payload to one connection, if it is still registered.
pub async fn unicast(state: &AppState, to: ConnId, payload: &str) {
    let connections = state.connections.read().await;
    if let Some(entry) = connections.get(&to) {
        entry.outbound.enqueue(payload);
    }
}

/// Deliver to every connection currently bearing one of the usernames.
pub async fn multicast(state: &AppState, usernames: &[String], payload: &str) {
    let connections = state.connections.read().await;
    for entry in connections.values() {
        let Some(username) = &entry.username else {
            continue;
        };
        if usernames.iter().any(|u| u == username) {
            entry.outbound.enqueue(payload);
        }
    }
}

/// Deliver to every connection, identified or not.
pub async fn global(state: &AppState, payload: &str) {
    let connections = state.connections.read().await;
    for entry in connections.values() {
        entry.outbound.enqueue(payload);
    }
}

/// Push each identified connection its own filtered room list. The room
/// snapshot is taken first and the rooms lock released before touching
/// the connection table; the two locks are never nested.
pub async fn refresh_room_lists(state: &AppState) {
    let snapshot: Vec<(crate::envelope::RoomSummary, bool, String, Vec<String>)> = {
        let rooms = state.rooms.read().await;
        let mut entries: Vec<_> = rooms
            .values()
            .map(|room| {
                (
                    room.created_at,
                    (
                        room.summary(),
                        room.is_public,
                        room.creator.clone(),
                        room.invitees.iter().cloned().collect::<Vec<_>>(),
                    ),
                )
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1 .0.room_id.cmp(&b.1 .0.room_id)));
        entries.into_iter().map(|(_, entry)| entry).collect()
    };

    let connections = state.connections.read().await;
    for entry in connections.values() {
        let Some(username) = &entry.username else {
            continue;
        };
        let visible: Vec<_> = snapshot
            .iter()
            .filter(|(_, is_public, creator, invitees)| {
                *is_public || creator == username || invitees.iter().any(|u| u == username)
            })
            .map(|(summary, ..)| summary.clone())
            .collect();
        entry.outbound.enqueue(&outbound::room_list(&visible));
    }
}

/// Usernames of every identified connection, deduplicated and sorted.
pub async fn active_usernames(state: &AppState) -> Vec<String> {
    let connections = state.connections.read().await;
    let mut users: Vec<String> = connections
        .values()
        .filter_map(|entry| entry.username.clone())
        .collect();
    users.sort();
    users.dedup();
    users
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "fanout_test.rs"]
mod tests;
