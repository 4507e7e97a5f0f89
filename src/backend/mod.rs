//! The use cases the reader loops call into.
//!
//! The hub never touches persistence: only reader loops await these calls, so a
//! slow backend stalls one connection and never the hub actor.

use crate::error::ServiceError;
use crate::models::{ChatMessage, Friend, NewMessage, ReadTime};
use crate::ws::types::{ChatId, UserId};
use async_trait::async_trait;

pub mod memory;

pub use memory::InMemoryBackend;

/// Friendship, messaging and read-receipt use cases.
///
/// Implement it over your own storage and hand it to
/// [`ChatService::new`](crate::ws::service::ChatService::new). Every error is turned
/// into a `fail` frame for the caller.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Whether the account exists. Checked once, at upgrade time.
    async fn user_exists(&self, user_id: UserId) -> Result<bool, ServiceError>;

    async fn add_friend_request(&self, sender: UserId, recipient: UserId)
    -> Result<(), ServiceError>;

    async fn delete_friend_request(
        &self,
        sender: UserId,
        recipient: UserId,
    ) -> Result<(), ServiceError>;

    /// Marks a received request as ignored or not.
    async fn update_friend_request(
        &self,
        sender: UserId,
        recipient: UserId,
        ignored: bool,
    ) -> Result<(), ServiceError>;

    /// Turns the request into a friendship with its own chat.
    async fn accept_friend_request(
        &self,
        sender: UserId,
        recipient: UserId,
    ) -> Result<Friend, ServiceError>;

    async fn delete_friend(&self, user_a: UserId, user_b: UserId) -> Result<(), ServiceError>;

    /// Stores a message. Returns the other chat member and the stored message.
    async fn send_message(&self, message: NewMessage)
    -> Result<(UserId, ChatMessage), ServiceError>;

    /// Deletes a message. Returns the other chat member.
    async fn delete_message(
        &self,
        sender: UserId,
        chat_id: ChatId,
        message_id: i64,
    ) -> Result<UserId, ServiceError>;

    async fn get_read_time(&self, user_id: UserId, chat_id: ChatId)
    -> Result<ReadTime, ServiceError>;

    /// Records a read receipt. Returns it with the other chat member.
    async fn update_read_time(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        time_id: i64,
    ) -> Result<(ReadTime, UserId), ServiceError>;
}
