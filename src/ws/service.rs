//! The primary `ChatService` that owns the hub and hands sockets to reader loops.

use crate::backend::ChatBackend;
use crate::config::HubConfig;
use crate::error::ConfigError;
use crate::ws::{
    connection::{Connection, FrameSink},
    handler::ConnectionContext,
    hub::{Hub, HubHandle},
    keepalive,
    session::Session,
    types::UserId,
};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{Stream, StreamExt};
use std::fmt::{self, Debug, Display};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

struct BackgroundTasks {
    hub: JoinHandle<()>,
    keepalive: JoinHandle<()>,
}

/// The main service: one hub actor, one keepalive ticker, and a reader loop
/// per connected socket.
///
/// Each service owns an independent hub, so several can live in one process.
pub struct ChatService {
    hub: HubHandle,
    backend: Arc<dyn ChatBackend>,
    config: HubConfig,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl Debug for ChatService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatService")
            .field("hub", &self.hub)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChatService {
    /// Creates a new `ChatService` and spawns the hub actor and keepalive ticker.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    /// * `backend` - The use cases reader loops call into.
    /// * `config` - Queue capacity, timeouts and frame limits.
    ///
    /// Returns [`ConfigError::Zero`] if any capacity or duration in `config` is zero.
    pub fn new(backend: Arc<dyn ChatBackend>, config: HubConfig) -> Result<Arc<Self>, ConfigError> {
        let (hub, hub_task) = Hub::spawn(&config)?;

        info!(period = ?config.keepalive_interval, "Spawning keepalive ticker...");
        let keepalive_task = keepalive::spawn(hub.clone(), config.keepalive_interval);

        Ok(Arc::new(Self {
            hub,
            backend,
            config,
            tasks: Mutex::new(Some(BackgroundTasks {
                hub: hub_task,
                keepalive: keepalive_task,
            })),
        }))
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Public entry point called by the Axum handler for each new connection.
    pub async fn handle_connection(self: Arc<Self>, socket: WebSocket, user_id: UserId) {
        let (sink, stream) = socket.split();
        let sink: Arc<dyn FrameSink> = Arc::new(Mutex::new(sink));
        self.serve(user_id, sink, stream).await;
    }

    /// Registers a connection with the hub and runs its reader loop to completion.
    ///
    /// `sink` receives every outbound frame; `stream` yields inbound ones.
    #[instrument(skip_all, fields(conn_id, user_id = %user_id))]
    pub async fn serve<S, E>(&self, user_id: UserId, sink: Arc<dyn FrameSink>, stream: S)
    where
        S: Stream<Item = Result<Message, E>> + Unpin + Send,
        E: Display,
    {
        let connection = Connection::new(user_id, sink);
        tracing::Span::current().record("conn_id", tracing::field::display(connection.id()));

        if self.hub.register(connection.downgrade()).await.is_err() {
            warn!("Hub is shut down. Refusing connection.");
            connection.close().await;
            return;
        }
        info!("Client connected and registered.");

        let context = ConnectionContext {
            conn_id: connection.id(),
            user_id,
            backend: Arc::clone(&self.backend),
        };
        Session::new(connection, context, self.hub.clone(), self.config.idle_timeout)
            .run(stream)
            .await;
        info!("Client disconnected.");
    }

    /// Stops the keepalive ticker, then lets the hub drain its queue and waits for it.
    ///
    /// Reader loops are not cancelled; they end when their sockets do.
    pub async fn shutdown(&self) {
        let Some(tasks) = self.tasks.lock().await.take() else {
            return;
        };
        info!("Shutting down chat service...");
        tasks.keepalive.abort();
        self.hub.shutdown();
        if let Err(e) = tasks.hub.await {
            error!("Hub task ended abnormally: {}", e);
        }
        info!("Chat service stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::models::Friend;
    use crate::ws::testing::{TestClient, init_tracing};
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    struct World {
        backend: Arc<InMemoryBackend>,
        service: Arc<ChatService>,
    }

    impl World {
        fn new() -> Self {
            init_tracing();
            let backend = Arc::new(InMemoryBackend::new());
            let service = ChatService::new(backend.clone(), HubConfig::default()).unwrap();
            Self { backend, service }
        }

        async fn user(&self) -> TestClient {
            let id = Uuid::new_v4();
            self.backend.add_user(id);
            TestClient::connect(&self.service, id).await
        }

        async fn befriend(&self, a: UserId, b: UserId) -> Friend {
            self.backend.add_friend_request(a, b).await.unwrap();
            self.backend.accept_friend_request(a, b).await.unwrap()
        }
    }

    fn status_update(user: UserId, status: &str) -> serde_json::Value {
        json!({ "status": "status-update", "content": { "user_id": user, "status": status } })
    }

    #[tokio::test]
    async fn writing_status_reaches_target() {
        let world = World::new();
        let mut a = world.user().await;
        let mut b = world.user().await;

        a.send_action("update-status", json!({ "user_id": b.user_id, "status": 1 }));

        assert_eq!(a.next_json().await, json!({ "status": "ok" }));
        assert_eq!(b.next_json().await, status_update(a.user_id, "writing"));
        a.expect_silence().await;
    }

    #[tokio::test]
    async fn message_is_delivered_with_server_id() {
        let world = World::new();
        let mut a = world.user().await;
        let mut b = world.user().await;
        let chat = world.befriend(a.user_id, b.user_id).await.chat_id;

        a.send_action(
            "send-message",
            json!({ "chat_id": chat, "content": "hi", "id": 0 }),
        );

        assert_eq!(a.next_json().await, json!({ "status": "ok" }));
        let received = b.next_json().await;
        assert_eq!(received["status"], "message-received");
        assert_eq!(received["content"]["content"], "hi");
        assert_eq!(received["content"]["chat_id"], json!(chat));
        let id = received["content"]["id"].as_i64().unwrap();
        assert!(id > 0);

        let echo = a.next_json().await;
        assert_eq!(echo["status"], "message-received");
        assert_eq!(echo["content"]["id"].as_i64(), Some(id));
    }

    #[tokio::test]
    async fn check_status_of_offline_user() {
        let world = World::new();
        let mut a = world.user().await;
        let absent = Uuid::new_v4();

        a.send_action("check-status", json!({ "user_id": absent }));

        assert_eq!(a.next_json().await, json!({ "status": "ok" }));
        assert_eq!(a.next_json().await, status_update(absent, "offline"));
    }

    #[tokio::test]
    async fn disconnect_announces_offline_once() {
        let world = World::new();
        let mut a = world.user().await;
        let mut b = world.user().await;
        let a_id = a.user_id;

        a.send_action("update-status", json!({ "user_id": b.user_id, "status": 0 }));
        assert_eq!(a.next_json().await, json!({ "status": "ok" }));
        assert_eq!(b.next_json().await, status_update(a_id, "online"));

        a.disconnect().await;

        assert_eq!(b.next_json().await, status_update(a_id, "offline"));
        b.expect_silence().await;
    }

    #[tokio::test]
    async fn check_status_sees_status_aimed_at_viewer() {
        let world = World::new();
        let mut a = world.user().await;
        let mut b = world.user().await;

        a.send_action("update-status", json!({ "user_id": b.user_id, "status": 1 }));
        a.next_json().await;
        b.next_json().await;

        b.send_action("check-status", json!({ "user_id": a.user_id }));
        assert_eq!(b.next_json().await, json!({ "status": "ok" }));
        assert_eq!(b.next_json().await, status_update(a.user_id, "writing"));
    }

    #[tokio::test]
    async fn reconnect_evicts_previous_session() {
        let world = World::new();
        let first = world.user().await;
        let user = first.user_id;

        let mut second = TestClient::connect(&world.service, user).await;

        let mut old_frames = first.disconnect().await;
        assert!(matches!(old_frames.next().await, Some(Message::Close(None))));

        // The old session's unregister was stale; the new one still gets traffic.
        let mut peer = world.user().await;
        peer.send_action("update-status", json!({ "user_id": user, "status": 0 }));
        assert_eq!(peer.next_json().await, json!({ "status": "ok" }));
        assert_eq!(second.next_json().await, status_update(peer.user_id, "online"));
    }

    #[tokio::test]
    async fn friend_request_flow() {
        let world = World::new();
        let mut a = world.user().await;
        let mut b = world.user().await;

        a.send_action("send-friend-request", json!({ "id": b.user_id }));
        assert_eq!(a.next_json().await, json!({ "status": "ok" }));
        assert_eq!(
            b.next_json().await,
            json!({
                "status": "friend-request-received",
                "content": { "sender_id": a.user_id, "recipient_id": b.user_id, "is_ignored": false }
            })
        );

        b.send_action("accept-friend-request", json!({ "id": a.user_id }));
        assert_eq!(b.next_json().await, json!({ "status": "ok" }));
        let accepted = a.next_json().await;
        let added = b.next_json().await;
        assert_eq!(accepted["status"], "friend-request-accepted");
        assert_eq!(added["status"], "friend-added");
        assert_eq!(accepted["content"], added["content"]);
        assert!(world.backend.friend_between(a.user_id, b.user_id).is_some());
    }

    #[tokio::test]
    async fn failures_reach_only_the_caller() {
        let world = World::new();
        let mut a = world.user().await;
        let mut b = world.user().await;

        a.send_action(
            "send-message",
            json!({ "chat_id": Uuid::new_v4(), "content": "hi" }),
        );

        assert_eq!(
            a.next_json().await,
            json!({ "status": "fail", "content": "no such chat" })
        );
        b.expect_silence().await;
    }

    #[tokio::test]
    async fn shutdown_stops_hub_and_refuses_new_sessions() {
        let world = World::new();
        let mut a = world.user().await;

        world.service.shutdown().await;
        assert!(world.service.hub().is_closed());

        // The reader loop notices on its next routed reply.
        a.send_action("check-status", json!({ "user_id": a.user_id }));
        a.wait_closed(Duration::from_secs(1)).await;

        let (tx, rx) = futures::channel::mpsc::unbounded::<Message>();
        let (_in_tx, in_rx) = futures::channel::mpsc::unbounded::<Result<Message, axum::Error>>();
        let sink: Arc<dyn FrameSink> = Arc::new(Mutex::new(tx));
        world.service.serve(Uuid::new_v4(), sink, in_rx).await;
        let frames: Vec<Message> = rx.collect().await;
        assert!(matches!(frames.as_slice(), [Message::Close(None)]));
    }

    #[tokio::test]
    async fn zero_settings_are_rejected() {
        init_tracing();
        let backend = Arc::new(InMemoryBackend::new());

        let no_keepalive = HubConfig::default().with_keepalive_interval(Duration::ZERO);
        assert_eq!(
            ChatService::new(backend.clone(), no_keepalive).err(),
            Some(ConfigError::Zero("keepalive_interval"))
        );

        let no_queue = HubConfig::default().with_event_capacity(0);
        assert_eq!(
            ChatService::new(backend, no_queue).err(),
            Some(ConfigError::Zero("event_capacity"))
        );
    }
}
