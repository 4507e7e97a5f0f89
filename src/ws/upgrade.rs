//! Provides the Axum handler for upgrading HTTP requests to chat WebSockets.

use crate::backend::ChatBackend;
use crate::ws::service::ChatService;
use crate::ws::types::UserId;
use axum::{
    extract::{State, ws::WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, instrument, warn};

/// An Axum handler that checks the caller's account and upgrades the request.
///
/// The caller must already be authenticated: pass the `UserId` taken from
/// your auth layer (for example the [`WsAuth`](crate::auth::WsAuth) extractor).
/// Unknown users are rejected with `403 Forbidden`; a failing backend lookup
/// yields `500 Internal Server Error`. Accepted sockets are limited to
/// [`HubConfig::max_frame_size`](crate::config::HubConfig::max_frame_size) bytes
/// per message.
///
/// ## Example Usage
///
/// ```rust,no_run
/// # use axum::{Router, routing::get, extract::{State, WebSocketUpgrade}};
/// # use std::sync::Arc;
/// # use axum_chat_hub::prelude::*;
/// # use uuid::Uuid;
/// #[tokio::main]
/// async fn main() {
///     let backend = Arc::new(InMemoryBackend::new());
///     let service = ChatService::new(backend, HubConfig::default()).expect("valid config");
///
///     let app: Router = Router::new()
///         .route(
///             "/connect/{user_id}",
///             get(|ws: WebSocketUpgrade,
///                  axum::extract::Path(user_id): axum::extract::Path<Uuid>,
///                  State(service): State<Arc<ChatService>>| async move {
///                 // In a real app the user comes from an auth extractor, not the path.
///                 upgrade_handler(ws, State(service), user_id).await
///             }),
///         )
///         .with_state(service);
///     // ... serve the app
/// }
/// ```
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(service): State<Arc<ChatService>>,
    user_id: UserId,
) -> Response {
    if let Err(status) = authorize(service.backend().as_ref(), user_id).await {
        return status.into_response();
    }

    let max_frame_size = service.config().max_frame_size;
    // Runs once the handshake completes, detached from this request.
    ws.max_message_size(max_frame_size)
        .on_upgrade(move |socket| async move {
            service.handle_connection(socket, user_id).await;
        })
}

/// `403` for an unknown account, `500` if the lookup itself fails.
async fn authorize(backend: &dyn ChatBackend, user_id: UserId) -> Result<(), StatusCode> {
    match backend.user_exists(user_id).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!("WebSocket connection rejected: unknown user.");
            Err(StatusCode::FORBIDDEN)
        }
        Err(e) => {
            error!("Failed to look up user before upgrade: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
