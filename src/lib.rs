//! # Axum Chat Hub
//!
//! A real-time messaging hub for Axum WebSockets. Each online user holds at most
//! one live connection; a single hub actor routes direct messages and
//! notifications between users, tracks who is "online" or "writing" toward
//! whom, and reaps connections whose writes fail.
//!
//! ## Core Features
//!
//! - **`ChatService`**: Owns the hub actor and the keepalive ticker, and runs a reader loop per socket.
//! - **Actor-owned state**: The connection registry and presence store are touched only by the hub task.
//! - **Pluggable persistence**: Implement `ChatBackend` over your storage, or start with `InMemoryBackend`.
//! - **Flexible Authentication**: A generic `WsAuth` extractor that works with headers, cookies or query params.
//!
//! ## Getting Started
//!
//! See [`ws::upgrade::upgrade_handler`] for how to wire the service into a router,
//! and the `chat_server` demo for a complete server.
//!
//! ---

pub mod backend;
pub mod config;
pub mod error;
pub mod models;

// The `ws` module contains all WebSocket-related logic.
pub mod ws;

// It will only be part of the crate if the "auth" feature is enabled.
#[cfg(feature = "auth")]
pub mod auth;

/// Public prelude for convenience.
///
/// This allows users to import the most common types with a single `use` statement:
/// `use axum_chat_hub::prelude::*;`
pub mod prelude {
    pub use crate::backend::{ChatBackend, InMemoryBackend};
    pub use crate::config::HubConfig;
    pub use crate::error::ServiceError;
    pub use crate::ws::{
        hub::{Hub, HubHandle},
        service::ChatService,
        types::{ChatId, UserId},
        upgrade::upgrade_handler,
    };

    // Re-export the WsAuth extractor if the feature is enabled.
    #[cfg(feature = "auth")]
    pub use crate::auth::{TokenValidator, WsAuth};
}
