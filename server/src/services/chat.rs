//! Per-room chat history.
//!
//! Rooms keep the most recent 100 messages, including join/leave notices,
//! so `getChatHistory` can backfill a freshly opened chat panel.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::envelope::now_ms;

/// Retention bound per room. Oldest messages fall off first.
pub const MAX_HISTORY_PER_ROOM: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChatKind {
    Chat,
    UserJoined,
    UserLeft,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub kind: ChatKind,
    pub username: String,
    pub message: String,
    pub room_id: String,
    pub timestamp: i64,
}

impl ChatMessage {
    #[must_use]
    pub fn new(kind: ChatKind, username: &str, message: &str, room_id: &str) -> Self {
        Self {
            kind,
            username: username.to_owned(),
            message: message.to_owned(),
            room_id: room_id.to_owned(),
            timestamp: now_ms(),
        }
    }

    /// Notice recorded when a user enters the room.
    #[must_use]
    pub fn joined_notice(room_id: &str, username: &str) -> Self {
        Self::new(ChatKind::UserJoined, username, &format!("{username} joined the room"), room_id)
    }

    /// Notice recorded when a user leaves the room.
    #[must_use]
    pub fn left_notice(room_id: &str, username: &str) -> Self {
        Self::new(ChatKind::UserLeft, username, &format!("{username} left the room"), room_id)
    }
}

/// Append a message, evicting the oldest entries past the retention bound.
pub fn push_history(history: &mut VecDeque<ChatMessage>, message: ChatMessage) {
    history.push_back(message);
    while history.len() > MAX_HISTORY_PER_ROOM {
        history.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_insertion_order() {
        let mut history = VecDeque::new();
        push_history(&mut history, ChatMessage::new(ChatKind::Chat, "a", "one", "r"));
        push_history(&mut history, ChatMessage::new(ChatKind::Chat, "b", "two", "r"));
        let texts: Vec<_> = history.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn history_is_bounded_oldest_out() {
        let mut history = VecDeque::new();
        for i in 0..MAX_HISTORY_PER_ROOM + 25 {
            push_history(&mut history, ChatMessage::new(ChatKind::Chat, "u", &format!("m{i}"), "r"));
        }
        assert_eq!(history.len(), MAX_HISTORY_PER_ROOM);
        assert_eq!(history.front().map(|m| m.message.as_str()), Some("m25"));
    }

    #[test]
    fn kind_serializes_camel_case() {
        let msg = ChatMessage::joined_notice("r1", "alice");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["kind"], "userJoined");
        assert_eq!(v["roomId"], "r1");
        assert_eq!(v["message"], "alice joined the room");
    }
}
