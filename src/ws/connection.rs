//! The write side of one live socket, and the weak handle the registry keeps to it.

use crate::error::ConnectionError;
use crate::ws::types::{ConnectionId, UserId};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, stream::SplitSink};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

/// The WebSocket's writing half, as produced by `socket.split()`.
pub type WsSink = Mutex<SplitSink<WebSocket, Message>>;

/// Something frames can be written to.
///
/// Implemented for any `Mutex<S>` where `S` is a `Sink<Message>`, which covers
/// the axum socket half as well as in-process channels.
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    /// Writes one frame.
    async fn send(&self, frame: Message) -> Result<(), ConnectionError>;

    /// Flushes and closes the sink. Errors are ignored.
    async fn close(&self);
}

#[async_trait]
impl<S> FrameSink for Mutex<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: fmt::Display,
{
    async fn send(&self, frame: Message) -> Result<(), ConnectionError> {
        let mut sink = self.lock().await;
        sink.send(frame)
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.lock().await;
        let _ = SinkExt::close(&mut *sink).await;
    }
}

/// An accepted, upgraded connection, owned by its reader loop.
///
/// The owning user is bound at handshake time and never changes.
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    sink: Arc<dyn FrameSink>,
}

impl Connection {
    pub fn new(user_id: UserId, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            id: ConnectionId::new_v4(),
            user_id,
            sink,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// A lookup-only handle for the registry. It does not keep the socket alive.
    pub fn downgrade(&self) -> ConnectionRef {
        ConnectionRef {
            id: self.id,
            user_id: self.user_id,
            sink: Arc::downgrade(&self.sink),
        }
    }

    pub async fn send(&self, frame: Message) -> Result<(), ConnectionError> {
        self.sink.send(frame).await
    }

    /// Sends a close frame and shuts the sink, ignoring failures.
    pub async fn close(&self) {
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink.close().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Non-owning reference to a [`Connection`], held by the registry for routing.
#[derive(Clone)]
pub struct ConnectionRef {
    id: ConnectionId,
    user_id: UserId,
    sink: Weak<dyn FrameSink>,
}

impl ConnectionRef {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Whether both handles point at the same accepted connection.
    pub fn same_connection(&self, other: &ConnectionRef) -> bool {
        self.id == other.id
    }

    /// Whether the owning reader loop still holds the socket.
    pub fn is_alive(&self) -> bool {
        self.sink.strong_count() > 0
    }

    pub async fn send(&self, frame: Message) -> Result<(), ConnectionError> {
        let sink = self.sink.upgrade().ok_or(ConnectionError::Closed)?;
        sink.send(frame).await
    }

    /// Best-effort close frame followed by closing the sink.
    pub async fn close(&self) {
        if let Some(sink) = self.sink.upgrade() {
            let _ = sink.send(Message::Close(None)).await;
            sink.close().await;
        }
    }
}

impl fmt::Debug for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRef")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("alive", &self.is_alive())
            .finish()
    }
}
