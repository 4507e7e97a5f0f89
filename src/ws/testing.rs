//! Test doubles: channel-backed sinks, broken sinks and a scripted client.

use crate::backend::ChatBackend;
use crate::error::{ConnectionError, ServiceError};
use crate::models::{ChatMessage, Friend, NewMessage, ReadTime};
use crate::ws::connection::{Connection, FrameSink};
use crate::ws::service::ChatService;
use crate::ws::types::{ChatId, UserId};
use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use once_cell::sync::Lazy;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "axum_chat_hub=debug".into()),
        )
        .with_test_writer()
        .try_init();
});

pub(crate) fn init_tracing() {
    Lazy::force(&TRACING);
}

/// A connection whose frames land in the returned receiver.
pub(crate) fn recording_connection(user_id: UserId) -> (Connection, UnboundedReceiver<Message>) {
    let (tx, rx) = unbounded();
    let sink: Arc<dyn FrameSink> = Arc::new(Mutex::new(tx));
    (Connection::new(user_id, sink), rx)
}

/// A sink whose every write fails, counting the attempts.
#[derive(Debug, Default)]
pub(crate) struct FailingSink {
    attempts: AtomicUsize,
}

impl FailingSink {
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSink for FailingSink {
    async fn send(&self, _frame: Message) -> Result<(), ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ConnectionError::Transport("broken pipe".into()))
    }

    async fn close(&self) {}
}

/// A backend whose storage is unreachable: every call fails with `Internal`.
pub(crate) struct BrokenBackend;

fn unreachable_store<T>() -> Result<T, ServiceError> {
    Err(ServiceError::Internal("pool exhausted".into()))
}

#[async_trait]
impl ChatBackend for BrokenBackend {
    async fn user_exists(&self, _: UserId) -> Result<bool, ServiceError> {
        unreachable_store()
    }
    async fn add_friend_request(&self, _: UserId, _: UserId) -> Result<(), ServiceError> {
        unreachable_store()
    }
    async fn delete_friend_request(&self, _: UserId, _: UserId) -> Result<(), ServiceError> {
        unreachable_store()
    }
    async fn update_friend_request(&self, _: UserId, _: UserId, _: bool) -> Result<(), ServiceError> {
        unreachable_store()
    }
    async fn accept_friend_request(&self, _: UserId, _: UserId) -> Result<Friend, ServiceError> {
        unreachable_store()
    }
    async fn delete_friend(&self, _: UserId, _: UserId) -> Result<(), ServiceError> {
        unreachable_store()
    }
    async fn send_message(&self, _: NewMessage) -> Result<(UserId, ChatMessage), ServiceError> {
        unreachable_store()
    }
    async fn delete_message(&self, _: UserId, _: ChatId, _: i64) -> Result<UserId, ServiceError> {
        unreachable_store()
    }
    async fn get_read_time(&self, _: UserId, _: ChatId) -> Result<ReadTime, ServiceError> {
        unreachable_store()
    }
    async fn update_read_time(
        &self,
        _: UserId,
        _: ChatId,
        _: i64,
    ) -> Result<(ReadTime, UserId), ServiceError> {
        unreachable_store()
    }
}

/// Parses a text frame as JSON.
pub(crate) fn frame_json(frame: &Message) -> Value {
    match frame {
        Message::Text(text) => serde_json::from_str(text.as_str())
            .unwrap_or_else(|e| panic!("frame is not json ({}): {:?}", e, text)),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

/// A client driving one session through in-process channels.
pub(crate) struct TestClient {
    pub(crate) user_id: UserId,
    inbound: Option<UnboundedSender<Result<Message, axum::Error>>>,
    outbound: UnboundedReceiver<Message>,
    task: JoinHandle<()>,
}

impl TestClient {
    /// Starts a session for `user_id` and waits until the hub has registered it.
    pub(crate) async fn connect(service: &Arc<ChatService>, user_id: UserId) -> Self {
        let (in_tx, in_rx) = unbounded::<Result<Message, axum::Error>>();
        let (out_tx, out_rx) = unbounded::<Message>();
        let sink: Arc<dyn FrameSink> = Arc::new(Mutex::new(out_tx));

        let service = Arc::clone(service);
        let task = tokio::spawn(async move { service.serve(user_id, sink, in_rx).await });

        let mut client = Self {
            user_id,
            inbound: Some(in_tx),
            outbound: out_rx,
            task,
        };

        // The ok reply is routed through the hub after the register event, so
        // receiving it proves the registration went through.
        client.send_action("check-status", json!({ "user_id": user_id }));
        assert_eq!(client.next_json().await, json!({ "status": "ok" }));
        let own = client.next_json().await;
        assert_eq!(own["status"], "status-update");
        client
    }

    pub(crate) fn send_raw(&self, frame: Message) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.unbounded_send(Ok(frame));
        }
    }

    pub(crate) fn send_action(&self, action: &str, content: Value) {
        let envelope = json!({ "action": action, "content": content });
        self.send_raw(Message::Text(envelope.to_string().into()));
    }

    /// Next outbound frame, failing the test after one second.
    pub(crate) async fn next_frame(&mut self) -> Message {
        match tokio::time::timeout(Duration::from_secs(1), self.outbound.next()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => panic!("connection of {} closed", self.user_id),
            Err(_) => panic!("no frame for {} within 1s", self.user_id),
        }
    }

    pub(crate) async fn next_json(&mut self) -> Value {
        let frame = self.next_frame().await;
        frame_json(&frame)
    }

    /// Asserts nothing arrives for a short while.
    pub(crate) async fn expect_silence(&mut self) {
        if let Ok(Some(frame)) =
            tokio::time::timeout(Duration::from_millis(100), self.outbound.next()).await
        {
            panic!("unexpected frame for {}: {:?}", self.user_id, frame);
        }
    }

    /// Ends the inbound stream and waits for the reader loop to finish.
    pub(crate) async fn disconnect(mut self) -> UnboundedReceiver<Message> {
        self.inbound.take();
        tokio::time::timeout(Duration::from_secs(1), &mut self.task)
            .await
            .expect("session did not stop")
            .expect("session panicked");
        self.outbound
    }

    /// Waits for the reader loop to end on its own.
    pub(crate) async fn wait_closed(&mut self, within: Duration) {
        tokio::time::timeout(within, &mut self.task)
            .await
            .expect("session did not stop")
            .expect("session panicked");
    }
}
