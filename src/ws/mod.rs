//! Everything that runs over the WebSocket: the hub actor and its state, the
//! wire protocol, and the per-connection reader loops.
//!
//! Reader loops never touch the registry or presence store directly. They
//! enqueue [`types::HubEvent`]s through a [`hub::HubHandle`]; the single hub task
//! applies them in order and performs every socket write.

pub mod connection;
pub mod handler;
pub mod hub;
pub mod keepalive;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod session;
pub mod types;
pub mod upgrade;

#[cfg(test)]
pub(crate) mod testing;
