//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{infrastructure::dto::http::RoomsStateDto, ui::state::AppState};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Debug endpoint listing every room and its members (for testing purposes)
pub async fn debug_rooms(State(state): State<Arc<AppState>>) -> Json<RoomsStateDto> {
    let hub = state.realtime.hub();
    Json(RoomsStateDto {
        connected_users: hub.connections().len().await,
        rooms: hub.rooms().snapshot().await,
    })
}
