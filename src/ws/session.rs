//! The per-connection reader loop.
//!
//! One loop runs per live socket. It reads a frame, runs the action to
//! completion, then hands the reply and any notifications to the hub before
//! reading the next frame, so commands from one client are applied in order.

use crate::error::{HubError, ProtocolError};
use crate::ws::connection::Connection;
use crate::ws::handler::{ConnectionContext, Followup, Outcome, handle_action};
use crate::ws::hub::HubHandle;
use crate::ws::protocol::{Reply, decode_envelope};
use crate::ws::types::{KEEPALIVE_PONG, UserId};
use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// The reading half of one connection, and the connection it owns.
#[derive(Debug)]
pub struct Session {
    connection: Connection,
    ctx: ConnectionContext,
    hub: HubHandle,
    idle_timeout: Duration,
}

impl Session {
    pub fn new(
        connection: Connection,
        ctx: ConnectionContext,
        hub: HubHandle,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            ctx,
            hub,
            idle_timeout,
        }
    }

    /// Reads frames until the peer goes away, a read fails, the idle timeout
    /// elapses or the hub shuts down. Always unregisters and closes on exit.
    #[instrument(skip_all, fields(conn_id = %self.ctx.conn_id, user_id = %self.ctx.user_id))]
    pub async fn run<S, E>(self, mut stream: S)
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        info!("Starting reader loop for client.");
        loop {
            let frame = match timeout(self.idle_timeout, stream.next()).await {
                Err(_) => {
                    info!("Client idle for too long. Closing connection.");
                    break;
                }
                Ok(None) => {
                    debug!("Client stream ended.");
                    break;
                }
                Ok(Some(Err(e))) => {
                    debug!("Failed to read from client: {}", e);
                    break;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            let outcome = match frame {
                Message::Text(text) => {
                    if text.as_str() == KEEPALIVE_PONG {
                        continue;
                    }
                    match decode_envelope(text.as_str()) {
                        Ok((action, content)) => handle_action(action, content, &self.ctx).await,
                        Err(e) => {
                            debug!("Malformed frame from client: {}", e);
                            Outcome::fail(e.to_string())
                        }
                    }
                }
                Message::Binary(_) => Outcome::fail(ProtocolError::UnsupportedFrame.to_string()),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => {
                    debug!("Received close frame from client.");
                    break;
                }
            };

            if let Err(e) = self.route(outcome).await {
                warn!("Cannot route outcome: {}. Stopping reader loop.", e);
                break;
            }
        }

        if self
            .hub
            .unregister(self.connection.downgrade())
            .await
            .is_err()
        {
            debug!("Hub already closed; skipping unregister.");
        }
        self.connection.close().await;
        info!("Reader loop stopped.");
    }

    /// Sends the caller its reply, then every follow-up in order.
    async fn route(&self, outcome: Outcome) -> Result<(), HubError> {
        let user_id = self.ctx.user_id;
        self.deliver(user_id, &outcome.reply).await?;

        for followup in outcome.followups {
            match followup {
                Followup::Notify { target, reply } => self.deliver(target, &reply).await?,
                Followup::StatusUpdate { target, change } => {
                    self.hub.status_update(user_id, target, change).await?
                }
                Followup::StatusCheck { target } => self.hub.status_check(user_id, target).await?,
            }
        }
        Ok(())
    }

    async fn deliver(&self, target: UserId, reply: &Reply) -> Result<(), HubError> {
        match reply.to_message() {
            Ok(frame) => self.hub.broadcast(target, frame).await,
            Err(e) => {
                error!("Failed to serialize frame: {}", e);
                Ok(())
            }
        }
    }
}
