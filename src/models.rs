//! Records exchanged with the backend and echoed to clients in notifications.

use crate::ws::types::{ChatId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A friendship, which owns exactly one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub user_id1: UserId,
    pub user_id2: UserId,
    pub chat_id: ChatId,
}

impl Friend {
    /// The other member of the chat, or `None` if `user_id` is not a member.
    pub fn other_member(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.user_id1 {
            Some(self.user_id2)
        } else if user_id == self.user_id2 {
            Some(self.user_id1)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub is_ignored: bool,
}

/// A stored chat message. `id` is the server-assigned, time-ordered message id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub content: String,
    pub date: DateTime<Utc>,
    pub id: i64,
    pub is_encrypted: bool,
}

/// A message as submitted by its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: UserId,
    pub chat_id: ChatId,
    pub content: String,
    pub is_encrypted: bool,
    /// Id the client picked. The server assigns its own.
    pub client_time_id: i64,
}

/// The newest message id a user has read in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadTime {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub time_id: i64,
}
