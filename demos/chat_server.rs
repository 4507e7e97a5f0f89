//! A runnable chat server on top of the in-memory backend.
//!
//! Two befriended demo users are created at startup; their ids are logged.
//! Connect with `websocat "ws://127.0.0.1:3000/connect?token=<user id>"` and
//! send frames such as
//! `{"action":"send-message","content":{"chat_id":"<chat id>","content":"hi","id":0}}`.

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    routing::get,
};
use axum_chat_hub::{
    auth::{TokenValidator, WsAuth}, // WsAuth needs the "auth" feature
    prelude::*,
};
use std::{fmt, net::SocketAddr, sync::Arc};
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
struct AuthError(String);

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for AuthError {}

#[derive(Clone)]
struct ServerState {
    backend: Arc<InMemoryBackend>,
    chat: Arc<ChatService>,
}

// Demo tokens are plain user ids. A real server would look up a session.
#[async_trait::async_trait]
impl TokenValidator for ServerState {
    type User = UserId;
    type Error = AuthError;

    async fn validate_token(&self, token: &str) -> Result<Self::User, Self::Error> {
        let user_id =
            Uuid::parse_str(token).map_err(|_| AuthError("malformed token".to_string()))?;
        match self.backend.user_exists(user_id).await {
            Ok(true) => Ok(user_id),
            Ok(false) => Err(AuthError("unknown user".to_string())),
            Err(e) => Err(AuthError(e.to_string())),
        }
    }
}

async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
    WsAuth(user_id): WsAuth<UserId>,
) -> axum::response::Response {
    upgrade_handler(ws, State(state.chat), user_id).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_server=info".parse()?)
                .add_directive("axum_chat_hub=info".parse()?),
        )
        .init();

    let config = HubConfig::from_env()?;
    let backend = Arc::new(InMemoryBackend::new());

    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    backend.add_user(alice);
    backend.add_user(bob);
    backend.add_friend_request(alice, bob).await?;
    let friend = backend.accept_friend_request(alice, bob).await?;
    info!(%alice, %bob, chat_id = %friend.chat_id, "Seeded demo users.");

    let chat = ChatService::new(backend.clone(), config)?;
    let state = ServerState {
        backend,
        chat: Arc::clone(&chat),
    };

    let app = Router::new()
        .route("/connect", get(connect))
        .route("/health", get(|| async { "OK" }))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    chat.shutdown().await;
    Ok(())
}
