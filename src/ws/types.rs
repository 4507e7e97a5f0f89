// axum-chat-hub/src/ws/types.rs

//! Identifiers and the event vocabulary consumed by the hub actor.

use crate::ws::connection::ConnectionRef;
use crate::ws::presence::StatusChange;
use axum::extract::ws::Message;
use uuid::Uuid;

/// Identifies a user. Sole key for registry and presence lookups.
pub type UserId = Uuid;

/// Identifies a chat between two friends.
pub type ChatId = Uuid;

/// A unique identifier for a single WebSocket connection.
///
/// Distinguishes two connections of the same user, so that a stale unregister
/// never removes a newer registration.
pub type ConnectionId = Uuid;

/// Text frame sent by the keepalive tick.
pub const KEEPALIVE_PING: &str = "ping";

/// Text frame clients send back in answer to [`KEEPALIVE_PING`].
pub const KEEPALIVE_PONG: &str = "pong";

/// An event serialized through the hub's inbound queue.
///
/// The hub processes one event completely before taking the next one, which
/// gives every registry and presence mutation a total order.
#[derive(Debug)]
pub enum HubEvent {
    /// A freshly upgraded connection. Evicts any previous connection of the same user.
    Register(ConnectionRef),
    /// A connection is going away. Ignored unless it is still the registered one.
    Unregister(ConnectionRef),
    /// Deliver a frame to whatever connection `target` currently has.
    Broadcast { target: UserId, frame: Message },
    /// `sender` reports an interaction status toward `target`.
    StatusUpdate {
        sender: UserId,
        target: UserId,
        status: StatusChange,
    },
    /// `sender` asks how `target` currently looks from its point of view.
    StatusCheck { sender: UserId, target: UserId },
    /// Ping every live connection.
    Tick,
}

impl HubEvent {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            HubEvent::Register(_) => "register",
            HubEvent::Unregister(_) => "unregister",
            HubEvent::Broadcast { .. } => "broadcast",
            HubEvent::StatusUpdate { .. } => "status_update",
            HubEvent::StatusCheck { .. } => "status_check",
            HubEvent::Tick => "tick",
        }
    }
}
