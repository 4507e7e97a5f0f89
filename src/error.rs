//! Error types shared across the hub, the reader loops and the backend.

use thiserror::Error;

/// A failure reported by a [`ChatBackend`](crate::backend::ChatBackend) use case.
///
/// The `Display` output is the message sent back to the client in a `fail` frame,
/// except for [`ServiceError::Internal`], see [`ServiceError::client_message`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The request was well-formed but violates a business rule.
    #[error("{0}")]
    InvalidInput(String),
    /// The referenced record does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The caller is not allowed to perform the operation.
    #[error("{0}")]
    Unauthorized(String),
    /// Storage or infrastructure failure.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// The text that may be shown to the client. Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Which identifier of a payload failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// Another user referenced by a friend action (`id`).
    Peer,
    /// A chat (`chat_id`).
    Chat,
    /// A user referenced by a presence action (`user_id`).
    User,
}

impl IdKind {
    fn prefix(&self) -> &'static str {
        match self {
            IdKind::Peer => "",
            IdKind::Chat => "chat ",
            IdKind::User => "user ",
        }
    }
}

/// A malformed inbound frame. Never fatal to the connection.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid json")]
    InvalidJson,
    #[error("invalid \"action\" or \"content\" field")]
    MissingField,
    #[error("invalid \"action\"")]
    UnknownAction,
    #[error("invalid \"content\"")]
    InvalidContent,
    #[error("invalid {}\"id\"", .0.prefix())]
    InvalidId(IdKind),
    #[error("invalid status")]
    InvalidStatus,
    #[error("invalid websocket message type")]
    UnsupportedFrame,
}

/// A write to a live socket failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The owning reader loop is gone; the registry only held a weak reference.
    #[error("connection already closed")]
    Closed,
    #[error("write timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

/// The hub no longer accepts events (it was shut down).
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("hub is closed")]
    Closed,
}

/// Invalid hub configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
