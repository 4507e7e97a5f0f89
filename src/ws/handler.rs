//! Turns one decoded client action into a reply for the caller and the
//! follow-up work the reader loop hands to the hub.
//!
//! Nothing here touches a socket or the hub. Handlers only await the
//! [`ChatBackend`], so they can be tested without a running actor.

use crate::backend::ChatBackend;
use crate::error::{IdKind, ProtocolError, ServiceError};
use crate::models::{FriendRequest, NewMessage};
use crate::ws::presence::StatusChange;
use crate::ws::protocol::{
    Action, CheckStatusInput, DeleteMessageInput, FriendDeleted, GetReadTimeInput,
    MessageDeleted, NotificationKind, PeerInput, Reply, SendMessageInput, UpdateFriendRequestInput,
    UpdateReadTimeInput, UpdateStatusInput, decode_content, parse_id,
};
use crate::ws::types::{ConnectionId, UserId};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Per-connection state handed to every action.
#[derive(Clone)]
pub struct ConnectionContext {
    /// The unique ID of the connection.
    pub conn_id: ConnectionId,
    /// The authenticated user, bound at upgrade time.
    pub user_id: UserId,
    pub backend: Arc<dyn ChatBackend>,
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("conn_id", &self.conn_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Work the hub performs after the caller has been answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Followup {
    /// Deliver a notification to `target`, if online.
    Notify { target: UserId, reply: Reply },
    /// Record and announce the caller's status toward `target`.
    StatusUpdate { target: UserId, change: StatusChange },
    /// Report `target`'s status back to the caller.
    StatusCheck { target: UserId },
}

/// The terminal frame for the caller plus any follow-ups, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub reply: Reply,
    pub followups: Vec<Followup>,
}

impl Outcome {
    pub fn ok(followups: Vec<Followup>) -> Self {
        Self {
            reply: Reply::Ok,
            followups,
        }
    }

    /// A `fail` reply with no follow-ups.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            reply: Reply::fail(message),
            followups: Vec::new(),
        }
    }
}

/// Why an action did not succeed.
#[derive(Debug)]
pub enum HandlerError {
    /// The payload was malformed.
    Protocol(ProtocolError),
    /// The use case rejected the request.
    Service(ServiceError),
    /// A notification payload could not be serialized.
    Serialization(serde_json::Error),
}

impl From<ProtocolError> for HandlerError {
    fn from(value: ProtocolError) -> Self {
        HandlerError::Protocol(value)
    }
}

impl From<ServiceError> for HandlerError {
    fn from(value: ServiceError) -> Self {
        HandlerError::Service(value)
    }
}

// Allow easy conversion from serde_json::Error.
impl From<serde_json::Error> for HandlerError {
    fn from(value: serde_json::Error) -> Self {
        HandlerError::Serialization(value)
    }
}

impl HandlerError {
    /// The text sent back in the `fail` frame.
    pub fn client_message(&self) -> String {
        match self {
            HandlerError::Protocol(e) => e.to_string(),
            HandlerError::Service(e) => e.client_message(),
            HandlerError::Serialization(_) => "internal error".to_string(),
        }
    }
}

/// Runs one action. Every failure becomes a `fail` reply; nothing is fatal.
#[instrument(skip_all, fields(action = action.as_str(), user_id = %ctx.user_id))]
pub async fn handle_action(action: Action, content: Value, ctx: &ConnectionContext) -> Outcome {
    match dispatch(action, content, ctx).await {
        Ok(followups) => {
            debug!(followups = followups.len(), "Action handled.");
            Outcome::ok(followups)
        }
        Err(e) => {
            match &e {
                HandlerError::Service(ServiceError::Internal(detail)) => {
                    error!("Backend failure: {}", detail)
                }
                HandlerError::Serialization(err) => {
                    error!("Failed to serialize notification: {}", err)
                }
                other => debug!("Action rejected: {}", other.client_message()),
            }
            Outcome::fail(e.client_message())
        }
    }
}

async fn dispatch(
    action: Action,
    content: Value,
    ctx: &ConnectionContext,
) -> Result<Vec<Followup>, HandlerError> {
    match action {
        Action::SendFriendRequest => send_friend_request(content, ctx).await,
        Action::DeleteFriendRequest => delete_friend_request(content, ctx).await,
        Action::UpdateFriendRequest => update_friend_request(content, ctx).await,
        Action::AcceptFriendRequest => accept_friend_request(content, ctx).await,
        Action::DeleteFriend => delete_friend(content, ctx).await,
        Action::SendMessage => send_message(content, ctx).await,
        Action::DeleteMessage => delete_message(content, ctx).await,
        Action::CheckStatus => check_status(content),
        Action::UpdateStatus => update_status(content),
        Action::GetReadTime => get_read_time(content, ctx).await,
        Action::UpdateReadTime => update_read_time(content, ctx).await,
    }
}

fn notify<T: Serialize>(
    target: UserId,
    kind: NotificationKind,
    payload: &T,
) -> Result<Followup, HandlerError> {
    Ok(Followup::Notify {
        target,
        reply: Reply::notification(kind, payload)?,
    })
}

async fn send_friend_request(
    content: Value,
    ctx: &ConnectionContext,
) -> Result<Vec<Followup>, HandlerError> {
    let input: PeerInput = decode_content(content)?;
    let recipient = parse_id(&input.id, IdKind::Peer)?;

    ctx.backend.add_friend_request(ctx.user_id, recipient).await?;

    let request = FriendRequest {
        sender_id: ctx.user_id,
        recipient_id: recipient,
        is_ignored: false,
    };
    Ok(vec![notify(
        recipient,
        NotificationKind::FriendRequestReceived,
        &request,
    )?])
}

async fn delete_friend_request(
    content: Value,
    ctx: &ConnectionContext,
) -> Result<Vec<Followup>, HandlerError> {
    let input: PeerInput = decode_content(content)?;
    let recipient = parse_id(&input.id, IdKind::Peer)?;

    ctx.backend
        .delete_friend_request(ctx.user_id, recipient)
        .await?;

    let request = FriendRequest {
        sender_id: ctx.user_id,
        recipient_id: recipient,
        is_ignored: false,
    };
    Ok(vec![notify(
        recipient,
        NotificationKind::FriendRequestDeleted,
        &request,
    )?])
}

/// The caller is the recipient; `id` names the original sender.
async fn update_friend_request(
    content: Value,
    ctx: &ConnectionContext,
) -> Result<Vec<Followup>, HandlerError> {
    let input: UpdateFriendRequestInput = decode_content(content)?;
    let sender = parse_id(&input.id, IdKind::Peer)?;

    ctx.backend
        .update_friend_request(sender, ctx.user_id, input.is_ignored)
        .await?;

    let request = FriendRequest {
        sender_id: sender,
        recipient_id: ctx.user_id,
        is_ignored: input.is_ignored,
    };
    Ok(vec![notify(
        sender,
        NotificationKind::FriendRequestUpdated,
        &request,
    )?])
}

async fn accept_friend_request(
    content: Value,
    ctx: &ConnectionContext,
) -> Result<Vec<Followup>, HandlerError> {
    let input: PeerInput = decode_content(content)?;
    let sender = parse_id(&input.id, IdKind::Peer)?;

    let friend = ctx
        .backend
        .accept_friend_request(sender, ctx.user_id)
        .await?;

    Ok(vec![
        notify(sender, NotificationKind::FriendRequestAccepted, &friend)?,
        notify(ctx.user_id, NotificationKind::FriendAdded, &friend)?,
    ])
}

async fn delete_friend(
    content: Value,
    ctx: &ConnectionContext,
) -> Result<Vec<Followup>, HandlerError> {
    let input: PeerInput = decode_content(content)?;
    let other = parse_id(&input.id, IdKind::Peer)?;

    ctx.backend.delete_friend(ctx.user_id, other).await?;

    let deleted = FriendDeleted {
        user_id1: other,
        user_id2: ctx.user_id,
    };
    Ok(vec![notify(other, NotificationKind::FriendDeleted, &deleted)?])
}

async fn send_message(
    content: Value,
    ctx: &ConnectionContext,
) -> Result<Vec<Followup>, HandlerError> {
    let input: SendMessageInput = decode_content(content)?;
    let chat_id = parse_id(&input.chat_id, IdKind::Chat)?;

    let (recipient, message) = ctx
        .backend
        .send_message(NewMessage {
            sender: ctx.user_id,
            chat_id,
            content: input.content,
            is_encrypted: input.is_encrypted,
            client_time_id: input.id,
        })
        .await?;

    // The sender gets the stored copy too, to learn the server-assigned id.
    Ok(vec![
        notify(recipient, NotificationKind::MessageReceived, &message)?,
        notify(ctx.user_id, NotificationKind::MessageReceived, &message)?,
    ])
}

async fn delete_message(
    content: Value,
    ctx: &ConnectionContext,
) -> Result<Vec<Followup>, HandlerError> {
    let input: DeleteMessageInput = decode_content(content)?;
    let chat_id = parse_id(&input.chat_id, IdKind::Chat)?;

    let recipient = ctx
        .backend
        .delete_message(ctx.user_id, chat_id, input.id)
        .await?;

    let deleted = MessageDeleted {
        chat_id,
        id: input.id,
    };
    Ok(vec![
        notify(recipient, NotificationKind::MessageDeleted, &deleted)?,
        notify(ctx.user_id, NotificationKind::MessageDeleted, &deleted)?,
    ])
}

fn check_status(content: Value) -> Result<Vec<Followup>, HandlerError> {
    let input: CheckStatusInput = decode_content(content)?;
    let target = parse_id(&input.user_id, IdKind::User)?;
    Ok(vec![Followup::StatusCheck { target }])
}

fn update_status(content: Value) -> Result<Vec<Followup>, HandlerError> {
    let input: UpdateStatusInput = decode_content(content)?;
    let target = parse_id(&input.user_id, IdKind::User)?;
    let change = StatusChange::try_from(input.status)?;
    Ok(vec![Followup::StatusUpdate { target, change }])
}

async fn get_read_time(
    content: Value,
    ctx: &ConnectionContext,
) -> Result<Vec<Followup>, HandlerError> {
    let input: GetReadTimeInput = decode_content(content)?;
    let chat_id = parse_id(&input.chat_id, IdKind::Chat)?;
    let user_id = match input.user_id.as_deref() {
        Some(raw) if !raw.is_empty() => parse_id(raw, IdKind::User)?,
        _ => ctx.user_id,
    };

    let read_time = ctx.backend.get_read_time(user_id, chat_id).await?;
    Ok(vec![notify(
        ctx.user_id,
        NotificationKind::ReadTimeReceived,
        &read_time,
    )?])
}

async fn update_read_time(
    content: Value,
    ctx: &ConnectionContext,
) -> Result<Vec<Followup>, HandlerError> {
    let input: UpdateReadTimeInput = decode_content(content)?;
    let chat_id = parse_id(&input.chat_id, IdKind::Chat)?;

    let (read_time, receiver) = ctx
        .backend
        .update_read_time(ctx.user_id, chat_id, input.time_id)
        .await?;

    Ok(vec![notify(
        receiver,
        NotificationKind::ReadTimeReceived,
        &read_time,
    )?])
}
