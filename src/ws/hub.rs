//! The hub actor: single owner of the connection registry and the presence store.
//!
//! Every reader loop talks to the hub through a [`HubHandle`], which feeds one
//! bounded FIFO queue. The actor drains that queue one event at a time, so no
//! two events ever interleave and no lock guards the state.
//!
//! Broken peers are detected lazily: a failed write while delivering to a
//! connection queues an unregister for it and closes it. The keepalive tick is
//! the only write whose failure is ignored.

use crate::config::HubConfig;
use crate::error::{ConfigError, ConnectionError, HubError};
use crate::ws::connection::ConnectionRef;
use crate::ws::presence::{DisplayStatus, PresenceStore, StatusChange};
use crate::ws::protocol::{NotificationKind, Reply, StatusNotice};
use crate::ws::registry::ConnectionRegistry;
use crate::ws::types::{HubEvent, KEEPALIVE_PING, UserId};
use axum::extract::ws::Message;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Cloneable sending side of the hub's event queue.
#[derive(Debug, Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl HubHandle {
    /// Enqueues an event, waiting for room if the queue is full.
    pub async fn send(&self, event: HubEvent) -> Result<(), HubError> {
        self.events.send(event).await.map_err(|_| HubError::Closed)
    }

    pub async fn register(&self, conn: ConnectionRef) -> Result<(), HubError> {
        self.send(HubEvent::Register(conn)).await
    }

    pub async fn unregister(&self, conn: ConnectionRef) -> Result<(), HubError> {
        self.send(HubEvent::Unregister(conn)).await
    }

    pub async fn broadcast(&self, target: UserId, frame: Message) -> Result<(), HubError> {
        self.send(HubEvent::Broadcast { target, frame }).await
    }

    pub async fn status_update(
        &self,
        sender: UserId,
        target: UserId,
        status: StatusChange,
    ) -> Result<(), HubError> {
        self.send(HubEvent::StatusUpdate {
            sender,
            target,
            status,
        })
        .await
    }

    pub async fn status_check(&self, sender: UserId, target: UserId) -> Result<(), HubError> {
        self.send(HubEvent::StatusCheck { sender, target }).await
    }

    pub async fn tick(&self) -> Result<(), HubError> {
        self.send(HubEvent::Tick).await
    }

    /// Asks the actor to stop accepting events. Buffered events are still processed.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// The actor. Construct with [`Hub::new`], then drive it with [`Hub::run`].
#[derive(Debug)]
pub struct Hub {
    registry: ConnectionRegistry,
    presence: PresenceStore,
    events: mpsc::Receiver<HubEvent>,
    shutdown: watch::Receiver<bool>,
    /// Events raised by the hub itself (reaps), processed before the next queued one.
    pending: VecDeque<HubEvent>,
    write_timeout: Duration,
}

impl Hub {
    /// Fails if `config` has a zero capacity or duration.
    pub fn new(config: &HubConfig) -> Result<(Self, HubHandle), ConfigError> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let hub = Self {
            registry: ConnectionRegistry::new(),
            presence: PresenceStore::new(),
            events: events_rx,
            shutdown: shutdown_rx,
            pending: VecDeque::new(),
            write_timeout: config.write_timeout,
        };
        let handle = HubHandle {
            events: events_tx,
            shutdown: Arc::new(shutdown_tx),
        };
        Ok((hub, handle))
    }

    /// Creates a hub and runs it on a background task.
    pub fn spawn(config: &HubConfig) -> Result<(HubHandle, JoinHandle<()>), ConfigError> {
        let (hub, handle) = Self::new(config)?;
        info!("Spawning hub actor...");
        let task = tokio::spawn(hub.run());
        Ok((handle, task))
    }

    /// Consumes events until the queue is closed and drained.
    pub async fn run(mut self) {
        let mut closing = false;
        loop {
            while let Some(event) = self.pending.pop_front() {
                self.handle_event(event).await;
            }

            tokio::select! {
                biased;
                _ = self.shutdown.changed(), if !closing => {
                    info!("Hub shutdown requested. Draining queued events.");
                    closing = true;
                    self.events.close();
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }
        info!(
            connections = self.registry.len(),
            "Hub event queue closed. Actor stopped."
        );
    }

    /// Applies one event to the hub state.
    #[instrument(skip_all, fields(event = event.kind()))]
    pub(crate) async fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register(conn) => self.on_register(conn).await,
            HubEvent::Unregister(conn) => self.on_unregister(conn).await,
            HubEvent::Broadcast { target, frame } => self.on_broadcast(target, frame).await,
            HubEvent::StatusUpdate {
                sender,
                target,
                status,
            } => self.on_status_update(sender, target, status).await,
            HubEvent::StatusCheck { sender, target } => self.on_status_check(sender, target).await,
            HubEvent::Tick => self.on_tick().await,
        }
    }

    async fn on_register(&mut self, conn: ConnectionRef) {
        let user_id = conn.user_id();
        let conn_id = conn.id();
        if let Some(evicted) = self.registry.register(conn) {
            info!(%user_id, evicted = %evicted.id(), "Replacing existing connection of user.");
            self.close(&evicted).await;
        }
        debug!(%user_id, %conn_id, online = self.registry.len(), "Connection registered.");
    }

    async fn on_unregister(&mut self, conn: ConnectionRef) {
        let user_id = conn.user_id();
        if !self.registry.unregister(&conn) {
            debug!(%user_id, conn_id = %conn.id(), "Ignoring unregister of a stale connection.");
            return;
        }
        debug!(%user_id, online = self.registry.len(), "Connection unregistered.");

        if let Some(target) = self.presence.clear_status(user_id) {
            self.notify_status(target, user_id, DisplayStatus::Offline).await;
        }
    }

    async fn on_broadcast(&mut self, target: UserId, frame: Message) {
        let Some(conn) = self.registry.lookup(target).cloned() else {
            debug!(%target, "Target is offline. Dropping frame.");
            return;
        };
        self.deliver(&conn, frame).await;
    }

    async fn on_status_update(&mut self, sender: UserId, target: UserId, change: StatusChange) {
        if !self.registry.contains(sender) {
            debug!(%sender, "Status update from a disconnected user. Dropping.");
            return;
        }

        let previous = self.presence.set_status(sender, target, change);
        self.notify_status(target, sender, change.display()).await;

        if let Some(previous) = previous {
            if previous.target != target {
                self.notify_status(previous.target, sender, DisplayStatus::Offline)
                    .await;
            }
        }
    }

    async fn on_status_check(&mut self, sender: UserId, target: UserId) {
        if !self.registry.contains(sender) {
            debug!(%sender, "Status check from a disconnected user. Dropping.");
            return;
        }
        let status = self
            .presence
            .effective_status(target, sender, self.registry.contains(target));
        self.notify_status(sender, target, status).await;
    }

    async fn on_tick(&mut self) {
        let connections: Vec<ConnectionRef> = self.registry.iter().cloned().collect();
        debug!(count = connections.len(), "Sending keepalive pings.");
        for conn in connections {
            if let Err(e) = self.write(&conn, Message::Text(KEEPALIVE_PING.into())).await {
                debug!(user_id = %conn.user_id(), "Keepalive ping failed: {}", e);
            }
        }
    }

    /// Sends `recipient` a `status-update` about `subject`, if `recipient` is online.
    async fn notify_status(&mut self, recipient: UserId, subject: UserId, status: DisplayStatus) {
        let Some(conn) = self.registry.lookup(recipient).cloned() else {
            return;
        };
        let notice = StatusNotice {
            user_id: subject,
            status,
        };
        let frame = match Reply::notification(NotificationKind::StatusUpdate, &notice)
            .and_then(|reply| reply.to_message())
        {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to serialize status notice: {}", e);
                return;
            }
        };
        self.deliver(&conn, frame).await;
    }

    /// Writes a routed frame, reaping the connection if the write fails.
    async fn deliver(&mut self, conn: &ConnectionRef, frame: Message) {
        if let Err(e) = self.write(conn, frame).await {
            warn!(user_id = %conn.user_id(), conn_id = %conn.id(), "Delivery failed, reaping connection: {}", e);
            self.reap(conn).await;
        }
    }

    async fn write(&self, conn: &ConnectionRef, frame: Message) -> Result<(), ConnectionError> {
        match tokio::time::timeout(self.write_timeout, conn.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        }
    }

    async fn reap(&mut self, conn: &ConnectionRef) {
        self.pending.push_back(HubEvent::Unregister(conn.clone()));
        self.close(conn).await;
    }

    async fn close(&self, conn: &ConnectionRef) {
        if tokio::time::timeout(self.write_timeout, conn.close())
            .await
            .is_err()
        {
            debug!(conn_id = %conn.id(), "Closing connection timed out.");
        }
    }
}
