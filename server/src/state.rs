//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is cloned into every connection task and axum handler. It
//! holds the room registry and the connection table, both behind their
//! own `RwLock`. Members' outbound queues live *inside* each room entry,
//! so a room mutation and the fan-out to its members happen under one
//! lock acquisition; that is what gives every member the same broadcast
//! order.
//!
//! LOCKING
//! =======
//! The rooms lock and the connections lock are never held at the same
//! time; code that needs both snapshots one, releases it, then takes the
//! other. File and database I/O never runs under either lock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::{mpsc, Notify, RwLock};
use uuid::Uuid;

use crate::config::Config;
use crate::envelope::{now_ms, RoomSummary, ShapeData};
use crate::services::chat::{self, ChatMessage};
use crate::services::storage::BoardStore;
use crate::services::timelapse::{TimelapseJobs, TimelapseRenderer};

/// Stable identifier for one client connection.
pub type ConnId = Uuid;

// =============================================================================
// OUTBOUND QUEUE
// =============================================================================

/// Bounded per-connection outbound buffer.
///
/// The fan-out side enqueues with `try_send`; a full queue means the
/// client cannot keep up, so the queue latches its shutdown signal and
/// the connection task tears the session down. This keeps one slow
/// client from back-pressuring a whole room.
#[derive(Clone)]
pub struct OutboundQueue {
    tx: mpsc::Sender<String>,
    shutdown: Arc<Notify>,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, shutdown: Arc::new(Notify::new()) }, rx)
    }

    /// Enqueue one serialized envelope. Returns `false` when the frame
    /// was dropped because the queue is full or the connection is gone;
    /// a full queue also latches the shutdown signal.
    pub fn enqueue(&self, payload: &str) -> bool {
        match self.tx.try_send(payload.to_owned()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.shutdown.notify_one();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Ask the owning connection task to shut down.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// Signal awaited by the connection's read loop.
    #[must_use]
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }
}

// =============================================================================
// CONNECTIONS
// =============================================================================

/// Registry entry for one live connection.
pub struct ConnectionEntry {
    /// Set by `setUsername`; `None` until then.
    pub username: Option<String>,
    pub outbound: OutboundQueue,
}

// =============================================================================
// ROOM
// =============================================================================

/// One seat in a room.
pub struct RoomMember {
    pub username: String,
    pub outbound: OutboundQueue,
}

/// One collaborative whiteboard.
pub struct Room {
    pub room_id: String,
    pub room_name: String,
    pub creator: String,
    pub created_at: i64,
    pub is_public: bool,
    /// Empty string means no password.
    pub password: String,
    /// Only meaningful for private rooms.
    pub invitees: HashSet<String>,
    pub max_participants: usize,
    /// Connected members keyed by connection id.
    pub members: HashMap<ConnId, RoomMember>,
    /// Ordered outbound envelopes that reproduce the visible board for a
    /// late joiner. Append-only except for `clear` and soft-cap eviction.
    pub replay: VecDeque<String>,
    /// Latest state of each indexed shape.
    pub shapes: HashMap<String, ShapeData>,
    /// Bounded chat history.
    pub chat: VecDeque<ChatMessage>,
}

impl Room {
    #[must_use]
    pub fn new(
        room_id: String,
        room_name: String,
        creator: String,
        is_public: bool,
        password: String,
        invitees: HashSet<String>,
        max_participants: usize,
    ) -> Self {
        Self {
            room_id,
            room_name,
            creator,
            created_at: now_ms(),
            is_public,
            password,
            invitees,
            max_participants,
            members: HashMap::new(),
            replay: VecDeque::new(),
            shapes: HashMap::new(),
            chat: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_participants
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Room-list visibility: public rooms for everyone, private rooms
    /// only for the creator and invitees.
    #[must_use]
    pub fn visible_to(&self, username: &str) -> bool {
        self.is_public || self.creator == username || self.invitees.contains(username)
    }

    /// Usernames currently in the room.
    #[must_use]
    pub fn participants(&self) -> Vec<String> {
        self.members.values().map(|m| m.username.clone()).collect()
    }

    #[must_use]
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id.clone(),
            room_name: self.room_name.clone(),
            creator: self.creator.clone(),
            participants: self.members.len(),
            max_participants: self.max_participants,
            is_public: self.is_public,
            has_password: self.has_password(),
        }
    }

    /// Append to the replay log, evicting the oldest entries past the
    /// soft cap. Replay is lossy past the cap.
    pub fn push_replay(&mut self, payload: String, soft_cap: usize) {
        self.replay.push_back(payload);
        while self.replay.len() > soft_cap {
            self.replay.pop_front();
        }
    }

    /// Truncate both the replay log and the shape index.
    pub fn clear_board(&mut self) {
        self.replay.clear();
        self.shapes.clear();
    }

    /// Record a chat entry, respecting the retention bound.
    pub fn push_chat(&mut self, message: ChatMessage) {
        chat::push_history(&mut self.chat, message);
    }

    /// Enqueue a payload on every member, optionally excluding one.
    /// Callers must hold the rooms write lock, which is what serializes
    /// the broadcast order for all members.
    pub fn broadcast(&self, payload: &str, exclude: Option<ConnId>) {
        for (conn_id, member) in &self.members {
            if exclude == Some(*conn_id) {
                continue;
            }
            member.outbound.enqueue(payload);
        }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared server state. Clone is cheap; all fields are `Arc`-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub rooms: Arc<RwLock<HashMap<String, Room>>>,
    pub connections: Arc<RwLock<HashMap<ConnId, ConnectionEntry>>>,
    pub boards: Arc<BoardStore>,
    pub jobs: Arc<TimelapseJobs>,
    /// External video encoder. `None` disables the timelapse endpoints.
    pub renderer: Option<Arc<dyn TimelapseRenderer>>,
}

impl AppState {
    #[must_use]
    pub fn new(
        pool: SqlitePool,
        config: Config,
        boards: BoardStore,
        renderer: Option<Arc<dyn TimelapseRenderer>>,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            rooms: Arc::new(RwLock::new(HashMap::new())),
            connections: Arc::new(RwLock::new(HashMap::new())),
            boards: Arc::new(boards),
            jobs: Arc::new(TimelapseJobs::new()),
            renderer,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
