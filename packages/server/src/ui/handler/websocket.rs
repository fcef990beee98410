//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, ws::WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{domain::AuthError, infrastructure::dto::http::ErrorResponseDto, ui::state::AppState};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    /// Token for clients that cannot set headers on the upgrade request
    pub jwt: Option<String>,
}

/// Authenticate the upgrade request, then hand the socket to the real-time server.
///
/// The token comes from `Authorization: Bearer <token>`, falling back to the
/// `jwt` query parameter. Unauthenticated requests get 401 and no socket.
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = match request_token(&headers, &query) {
        Some(token) => token,
        None => return unauthorized(AuthError::MissingToken),
    };

    let user_id = match state.authenticator.authenticate(token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!("Rejected websocket upgrade: {}", e);
            return unauthorized(e);
        }
    };

    tracing::info!(user_id = %user_id, "Upgrading authenticated connection");
    ws.on_upgrade(move |socket| async move { state.realtime.accept(user_id, socket).await })
}

fn request_token<'a>(headers: &'a HeaderMap, query: &'a ConnectQuery) -> Option<&'a str> {
    bearer_token(headers).or_else(|| query.jwt.as_deref().filter(|token| !token.is_empty()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}

fn unauthorized(error: AuthError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponseDto::new(error.to_string())),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn query(jwt: Option<&str>) -> ConnectQuery {
        ConnectQuery {
            jwt: jwt.map(str::to_string),
        }
    }

    #[test]
    fn test_bearer_header_wins_over_query() {
        // テスト項目: Authorization ヘッダーのトークンがクエリより優先される
        // given (前提条件):
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));

        let query = query(Some("query-token"));

        // when (操作):
        let token = request_token(&headers, &query);

        // then (期待する結果):
        assert_eq!(token, Some("header-token"));
    }

    #[test]
    fn test_query_fallback_and_missing_token() {
        // テスト項目: ヘッダーがない場合は jwt クエリを使い、どちらもなければ None
        // given (前提条件):
        let mut malformed = HeaderMap::new();
        malformed.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));

        // when (操作) / then (期待する結果):
        assert_eq!(
            request_token(&HeaderMap::new(), &query(Some("query-token"))),
            Some("query-token")
        );
        assert_eq!(
            request_token(&malformed, &query(Some("query-token"))),
            Some("query-token")
        );
        assert_eq!(request_token(&HeaderMap::new(), &query(Some(""))), None);
        assert_eq!(request_token(&malformed, &query(None)), None);
    }
}
