//! Inbound envelopes, action payloads and outbound frames.
//!
//! Inbound text frames carry `{"action": <string>, "content": <object>}`.
//! Outbound frames are one of:
//!
//! - `{"status": "ok"}`
//! - `{"status": "fail", "content": <message>}`
//! - `{"status": <notification kind>, "content": <payload>}`

use crate::error::{IdKind, ProtocolError};
use crate::ws::presence::DisplayStatus;
use crate::ws::types::{ChatId, UserId};
use axum::extract::ws::{Message, Utf8Bytes};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::str::FromStr;

/// The fixed set of commands a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SendFriendRequest,
    DeleteFriendRequest,
    UpdateFriendRequest,
    AcceptFriendRequest,
    DeleteFriend,
    SendMessage,
    DeleteMessage,
    CheckStatus,
    UpdateStatus,
    GetReadTime,
    UpdateReadTime,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SendFriendRequest => "send-friend-request",
            Action::DeleteFriendRequest => "delete-friend-request",
            Action::UpdateFriendRequest => "update-friend-request",
            Action::AcceptFriendRequest => "accept-friend-request",
            Action::DeleteFriend => "delete-friend",
            Action::SendMessage => "send-message",
            Action::DeleteMessage => "delete-message",
            Action::CheckStatus => "check-status",
            Action::UpdateStatus => "update-status",
            Action::GetReadTime => "get-read-time",
            Action::UpdateReadTime => "update-read-time",
        }
    }
}

impl FromStr for Action {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "send-friend-request" => Action::SendFriendRequest,
            "delete-friend-request" => Action::DeleteFriendRequest,
            "update-friend-request" => Action::UpdateFriendRequest,
            "accept-friend-request" => Action::AcceptFriendRequest,
            "delete-friend" => Action::DeleteFriend,
            "send-message" => Action::SendMessage,
            "delete-message" => Action::DeleteMessage,
            "check-status" => Action::CheckStatus,
            "update-status" => Action::UpdateStatus,
            "get-read-time" => Action::GetReadTime,
            "update-read-time" => Action::UpdateReadTime,
            _ => return Err(ProtocolError::UnknownAction),
        };
        Ok(action)
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    action: String,
    #[serde(default)]
    content: Option<Value>,
}

/// Splits a text frame into its action and (still undecoded) content.
pub fn decode_envelope(text: &str) -> Result<(Action, Value), ProtocolError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)?;
    let content = match envelope.content {
        Some(content) if !envelope.action.is_empty() => content,
        _ => return Err(ProtocolError::MissingField),
    };
    let action = envelope.action.parse()?;
    Ok((action, content))
}

/// Decodes an action-specific payload.
pub fn decode_content<T: DeserializeOwned>(content: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(content).map_err(|_| ProtocolError::InvalidContent)
}

/// Parses an identifier field; empty or malformed values are rejected.
pub fn parse_id(raw: &str, kind: IdKind) -> Result<uuid::Uuid, ProtocolError> {
    uuid::Uuid::parse_str(raw.trim()).map_err(|_| ProtocolError::InvalidId(kind))
}

// --- Inbound payloads ---

/// `{id}`: the other user of a friend action.
#[derive(Debug, Deserialize)]
pub struct PeerInput {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFriendRequestInput {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub is_ignored: bool,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageInput {
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub is_encrypted: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessageInput {
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckStatusInput {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusInput {
    #[serde(default)]
    pub user_id: String,
    /// Missing means `0`, online.
    #[serde(default)]
    pub status: i64,
}

/// `user_id` defaults to the caller.
#[derive(Debug, Deserialize)]
pub struct GetReadTimeInput {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReadTimeInput {
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub time_id: i64,
}

// --- Notification payloads that are not plain models ---

/// Content of a `status-update` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusNotice {
    pub user_id: UserId,
    pub status: DisplayStatus,
}

/// Content of a `message-deleted` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageDeleted {
    pub chat_id: ChatId,
    pub id: i64,
}

/// Content of a `friend-deleted` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FriendDeleted {
    pub user_id1: UserId,
    pub user_id2: UserId,
}

// --- Outbound frames ---

/// Kinds of server-originated frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    FriendRequestReceived,
    FriendRequestDeleted,
    FriendRequestUpdated,
    FriendRequestAccepted,
    FriendAdded,
    FriendDeleted,
    MessageReceived,
    MessageDeleted,
    StatusUpdate,
    ReadTimeReceived,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::FriendRequestReceived => "friend-request-received",
            NotificationKind::FriendRequestDeleted => "friend-request-deleted",
            NotificationKind::FriendRequestUpdated => "friend-request-updated",
            NotificationKind::FriendRequestAccepted => "friend-request-accepted",
            NotificationKind::FriendAdded => "friend-added",
            NotificationKind::FriendDeleted => "friend-deleted",
            NotificationKind::MessageReceived => "message-received",
            NotificationKind::MessageDeleted => "message-deleted",
            NotificationKind::StatusUpdate => "status-update",
            NotificationKind::ReadTimeReceived => "read-time-received",
        }
    }
}

/// One outbound frame, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Fail(String),
    Notification {
        kind: NotificationKind,
        content: Value,
    },
}

#[derive(Serialize)]
struct OutboundFrame<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a Value>,
}

impl Reply {
    pub fn fail(message: impl Into<String>) -> Self {
        Reply::Fail(message.into())
    }

    pub fn notification<T: Serialize>(
        kind: NotificationKind,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Reply::Notification {
            kind,
            content: serde_json::to_value(payload)?,
        })
    }

    /// Serializes into a text frame.
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        let fail_content;
        let frame = match self {
            Reply::Ok => OutboundFrame {
                status: "ok",
                content: None,
            },
            Reply::Fail(message) => {
                fail_content = Value::String(message.clone());
                OutboundFrame {
                    status: "fail",
                    content: Some(&fail_content),
                }
            }
            Reply::Notification { kind, content } => OutboundFrame {
                status: kind.as_str(),
                content: Some(content),
            },
        };
        let json = serde_json::to_string(&frame)?;
        Ok(Message::Text(Utf8Bytes::from(json)))
    }
}
