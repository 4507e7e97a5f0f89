//! A process-local [`ChatBackend`] backed by `DashMap` tables.
//!
//! Each table is independently consistent, the way separate repositories are;
//! use cases touching several tables are not transactional.

use super::ChatBackend;
use crate::error::ServiceError;
use crate::models::{ChatMessage, Friend, NewMessage, ReadTime};
use crate::ws::types::{ChatId, UserId};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeMap;
use tracing::debug;

/// Longest accepted message body, in bytes.
pub const MAX_MESSAGE_LEN: usize = 2048;

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    users: DashSet<UserId>,
    /// (sender, recipient) → is_ignored
    friend_requests: DashMap<(UserId, UserId), bool>,
    friends: DashMap<ChatId, Friend>,
    messages: DashMap<ChatId, BTreeMap<i64, ChatMessage>>,
    read_times: DashMap<(UserId, ChatId), i64>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: UserId) {
        self.users.insert(user_id);
    }

    /// The friendship between two users, in either order.
    pub fn friend_between(&self, a: UserId, b: UserId) -> Option<Friend> {
        self.friends
            .iter()
            .find(|entry| {
                let f = entry.value();
                (f.user_id1 == a && f.user_id2 == b) || (f.user_id1 == b && f.user_id2 == a)
            })
            .map(|entry| *entry.value())
    }

    /// Messages of a chat, oldest first.
    pub fn messages(&self, chat_id: ChatId) -> Vec<ChatMessage> {
        self.messages
            .get(&chat_id)
            .map(|chat| chat.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn friend_request(&self, sender: UserId, recipient: UserId) -> Option<bool> {
        self.friend_requests.get(&(sender, recipient)).map(|r| *r)
    }

    fn friend_by_chat(&self, chat_id: ChatId) -> Result<Friend, ServiceError> {
        self.friends
            .get(&chat_id)
            .map(|f| *f)
            .ok_or_else(|| ServiceError::not_found("no such chat"))
    }

    fn ensure_not_self(a: UserId, b: UserId) -> Result<(), ServiceError> {
        if a == b {
            return Err(ServiceError::invalid("cannot befriend yourself"));
        }
        Ok(())
    }
}

fn now_time_id() -> i64 {
    Utc::now().timestamp_micros() * 10
}

#[async_trait]
impl ChatBackend for InMemoryBackend {
    async fn user_exists(&self, user_id: UserId) -> Result<bool, ServiceError> {
        Ok(self.users.contains(&user_id))
    }

    async fn add_friend_request(
        &self,
        sender: UserId,
        recipient: UserId,
    ) -> Result<(), ServiceError> {
        Self::ensure_not_self(sender, recipient)?;
        if !self.users.contains(&recipient) {
            return Err(ServiceError::not_found("no such user"));
        }
        if self.friend_between(sender, recipient).is_some() {
            return Err(ServiceError::invalid("this friendship already exists"));
        }
        if self.friend_requests.contains_key(&(recipient, sender)) {
            return Err(ServiceError::invalid("this user already wants to be friends"));
        }
        match self.friend_requests.entry((sender, recipient)) {
            Entry::Occupied(_) => Err(ServiceError::invalid("this friend request already exists")),
            Entry::Vacant(slot) => {
                slot.insert(false);
                debug!(%sender, %recipient, "Friend request stored.");
                Ok(())
            }
        }
    }

    async fn delete_friend_request(
        &self,
        sender: UserId,
        recipient: UserId,
    ) -> Result<(), ServiceError> {
        self.friend_requests
            .remove(&(sender, recipient))
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("no such friend request"))
    }

    async fn update_friend_request(
        &self,
        sender: UserId,
        recipient: UserId,
        ignored: bool,
    ) -> Result<(), ServiceError> {
        Self::ensure_not_self(sender, recipient)?;
        let mut request = self
            .friend_requests
            .get_mut(&(sender, recipient))
            .ok_or_else(|| ServiceError::not_found("no such friend request"))?;
        *request = ignored;
        Ok(())
    }

    async fn accept_friend_request(
        &self,
        sender: UserId,
        recipient: UserId,
    ) -> Result<Friend, ServiceError> {
        Self::ensure_not_self(sender, recipient)?;
        self.friend_requests
            .remove(&(sender, recipient))
            .ok_or_else(|| ServiceError::not_found("no such friend request"))?;

        let friend = Friend {
            user_id1: sender,
            user_id2: recipient,
            chat_id: ChatId::new_v4(),
        };
        self.friends.insert(friend.chat_id, friend);
        self.read_times.insert((sender, friend.chat_id), 0);
        self.read_times.insert((recipient, friend.chat_id), 0);
        debug!(%sender, %recipient, chat_id = %friend.chat_id, "Friendship created.");
        Ok(friend)
    }

    async fn delete_friend(&self, user_a: UserId, user_b: UserId) -> Result<(), ServiceError> {
        let friend = self
            .friend_between(user_a, user_b)
            .ok_or_else(|| ServiceError::not_found("no such friend"))?;

        self.messages.remove(&friend.chat_id);
        self.read_times
            .retain(|(_, chat_id), _| *chat_id != friend.chat_id);
        self.friends.remove(&friend.chat_id);
        Ok(())
    }

    async fn send_message(
        &self,
        message: NewMessage,
    ) -> Result<(UserId, ChatMessage), ServiceError> {
        if message.content.is_empty() {
            return Err(ServiceError::invalid("message is empty"));
        }
        if message.content.len() > MAX_MESSAGE_LEN {
            return Err(ServiceError::invalid("message is too long"));
        }

        let friend = self.friend_by_chat(message.chat_id)?;
        // The last digit tells which member wrote the message.
        let (recipient, member_digit) = if message.sender == friend.user_id1 {
            (friend.user_id2, 1)
        } else if message.sender == friend.user_id2 {
            (friend.user_id1, 2)
        } else {
            return Err(ServiceError::invalid("user is not a member of this chat"));
        };

        let mut chat = self.messages.entry(message.chat_id).or_default();
        let mut id = now_time_id() + member_digit;
        while chat.contains_key(&id) {
            id += 10;
        }

        let stored = ChatMessage {
            user_id: message.sender,
            chat_id: message.chat_id,
            content: message.content,
            date: Utc::now(),
            id,
            is_encrypted: message.is_encrypted,
        };
        chat.insert(id, stored.clone());
        Ok((recipient, stored))
    }

    async fn delete_message(
        &self,
        sender: UserId,
        chat_id: ChatId,
        message_id: i64,
    ) -> Result<UserId, ServiceError> {
        let friend = self.friend_by_chat(chat_id)?;
        let recipient = friend
            .other_member(sender)
            .ok_or_else(|| ServiceError::invalid("user is not a member of this chat"))?;

        self.messages
            .get_mut(&chat_id)
            .and_then(|mut chat| chat.remove(&message_id))
            .ok_or_else(|| ServiceError::not_found("no such message"))?;
        Ok(recipient)
    }

    async fn get_read_time(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> Result<ReadTime, ServiceError> {
        let time_id = self
            .read_times
            .get(&(user_id, chat_id))
            .map(|t| *t)
            .ok_or_else(|| ServiceError::not_found("no such readTime"))?;
        Ok(ReadTime {
            user_id,
            chat_id,
            time_id,
        })
    }

    async fn update_read_time(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        time_id: i64,
    ) -> Result<(ReadTime, UserId), ServiceError> {
        let friend = self.friend_by_chat(chat_id)?;
        let receiver = friend
            .other_member(user_id)
            .ok_or_else(|| ServiceError::invalid("you are not in this chat"))?;

        // Read receipts end in 3, never colliding with message ids.
        let time_id = (time_id / 10) * 10 + 3;
        if time_id > now_time_id() {
            return Err(ServiceError::invalid("invalid timeId"));
        }
        self.read_times.insert((user_id, chat_id), time_id);

        Ok((
            ReadTime {
                user_id,
                chat_id,
                time_id,
            },
            receiver,
        ))
    }
}
