//! Token authentication for the upgrade request.
//!
//! Browsers cannot set headers on a WebSocket handshake, so besides the
//! `Authorization: Bearer` header the token is also accepted from the
//! `access_token` cookie and the `token` query parameter, in that order.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use async_trait::async_trait;
//! # use axum::{response::Response, routing::get, Router, response::IntoResponse};
//! # use axum_chat_hub::auth::{TokenValidator, WsAuth};
//! # use uuid::Uuid;
//! #
//! // 1. Your application's shared state
//! #[derive(Clone)]
//! struct AppState {
//!     // ... your session store, etc.
//! }
//!
//! // 2. Resolve tokens to user ids
//! #[async_trait]
//! impl TokenValidator for AppState {
//!     type User = Uuid;
//!     type Error = std::io::Error;
//!
//!     async fn validate_token(&self, token: &str) -> Result<Self::User, Self::Error> {
//!         // Look the session up...
//! #        Uuid::parse_str(token)
//! #            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
//!     }
//! }
//!
//! // 3. Take the user id in the handler
//! async fn websocket_handler(auth: WsAuth<Uuid>) -> Response {
//!     let user_id: Uuid = auth.0;
//!     format!("Authenticated user: {}", user_id).into_response()
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app: Router = Router::new()
//!         .route("/connect", get(websocket_handler))
//!         .with_state(AppState {});
//!     // ...
//! }
//! ```

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

/// Name of the cookie checked when no bearer header is present.
pub const TOKEN_COOKIE: &str = "access_token";

/// Resolves a handshake token to a user. Implement it on the router state to
/// enable [`WsAuth`].
#[async_trait]
pub trait TokenValidator {
    /// The user type that is returned upon successful validation, typically the
    /// [`UserId`](crate::ws::types::UserId) the hub routes by.
    type User: Send + Sync + 'static;
    /// Why a token was refused. Only logged; the client always sees `401`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Checks `token` (already stripped of any `Bearer ` prefix).
    async fn validate_token(&self, token: &str) -> Result<Self::User, Self::Error>;
}

/// Extracts the authenticated user of an upgrade request.
///
/// Rejects with `401 Unauthorized` when no token is found in any source or the
/// [`TokenValidator`] refuses it.
#[derive(Debug)]
pub struct WsAuth<U>(pub U)
where
    U: Send + Sync + 'static;

/// `?token=…`
#[derive(Deserialize)]
struct TokenQuery {
    token: String,
}

impl<S, U> FromRequestParts<S> for WsAuth<U>
where
    S: TokenValidator<User = U> + Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    type Rejection = Response;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, <Self as FromRequestParts<S>>::Rejection>> + Send {
        Box::pin(async move {
            let token = match get_token_from_headers(&parts.headers)
                .or_else(|| get_token_from_cookies(&parts.headers))
            {
                Some(t) => Some(t),
                None => match Query::<TokenQuery>::from_request_parts(parts, state).await {
                    Ok(Query(q)) => Some(q.token),
                    Err(_) => None,
                },
            };

            let token = match token {
                Some(t) if !t.is_empty() => t,
                _ => return Err(StatusCode::UNAUTHORIZED.into_response()),
            };

            match state.validate_token(&token).await {
                Ok(user) => Ok(WsAuth(user)),
                Err(e) => {
                    debug!("Rejected WebSocket token: {}", e);
                    Err(StatusCode::UNAUTHORIZED.into_response())
                }
            }
        })
    }
}

/// Extracts a bearer token from the Authorization header.
fn get_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header_val| {
            header_val
                .strip_prefix("Bearer ")
                .map(|token| token.trim().to_owned())
        })
}

/// Extracts the [`TOKEN_COOKIE`] value from any `Cookie` header.
fn get_token_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, token)| token.trim_matches('"').to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use uuid::Uuid;

    #[derive(Debug, thiserror::Error)]
    #[error("bad token")]
    struct BadToken;

    struct UuidTokens;

    #[async_trait]
    impl TokenValidator for UuidTokens {
        type User = Uuid;
        type Error = BadToken;

        async fn validate_token(&self, token: &str) -> Result<Uuid, BadToken> {
            Uuid::parse_str(token).map_err(|_| BadToken)
        }
    }

    fn parts(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    async fn extract(request: Request<()>) -> Result<Uuid, StatusCode> {
        let mut parts = parts(request);
        WsAuth::<Uuid>::from_request_parts(&mut parts, &UuidTokens)
            .await
            .map(|auth| auth.0)
            .map_err(|response| response.status())
    }

    #[test]
    fn reads_bearer_header() {
        let parts = parts(
            Request::builder()
                .header("Authorization", "Bearer abc")
                .body(())
                .unwrap(),
        );
        assert_eq!(get_token_from_headers(&parts.headers).as_deref(), Some("abc"));

        let basic = parts_with_header("Authorization", "Basic abc");
        assert_eq!(get_token_from_headers(&basic.headers), None);
    }

    fn parts_with_header(name: &str, value: &str) -> Parts {
        parts(Request::builder().header(name, value).body(()).unwrap())
    }

    #[test]
    fn reads_access_token_cookie() {
        let parts = parts_with_header("Cookie", "theme=dark; access_token=xyz; lang=en");
        assert_eq!(get_token_from_cookies(&parts.headers).as_deref(), Some("xyz"));

        let other = parts_with_header("Cookie", "theme=dark");
        assert_eq!(get_token_from_cookies(&other.headers), None);
    }

    #[tokio::test]
    async fn header_wins_over_cookie_and_query() {
        let user = Uuid::new_v4();
        let request = Request::builder()
            .uri("/connect?token=not-a-uuid")
            .header("Authorization", format!("Bearer {}", user))
            .header("Cookie", "access_token=also-bad")
            .body(())
            .unwrap();

        assert_eq!(extract(request).await, Ok(user));
    }

    #[tokio::test]
    async fn falls_back_to_cookie_then_query() {
        let user = Uuid::new_v4();
        let cookie = Request::builder()
            .uri("/connect?token=not-a-uuid")
            .header("Cookie", format!("access_token={}", user))
            .body(())
            .unwrap();
        assert_eq!(extract(cookie).await, Ok(user));

        let query = Request::builder()
            .uri(format!("/connect?token={}", user))
            .body(())
            .unwrap();
        assert_eq!(extract(query).await, Ok(user));
    }

    #[tokio::test]
    async fn missing_or_invalid_token_is_unauthorized() {
        let missing = Request::builder().uri("/connect").body(()).unwrap();
        assert_eq!(extract(missing).await, Err(StatusCode::UNAUTHORIZED));

        let invalid = Request::builder()
            .uri("/connect?token=nope")
            .body(())
            .unwrap();
        assert_eq!(extract(invalid).await, Err(StatusCode::UNAUTHORIZED));
    }
}
