//! HTTP API response DTOs.

use serde::Serialize;

use crate::realtime::RoomSnapshot;

/// `GET /debug/rooms` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomsStateDto {
    pub connected_users: usize,
    pub rooms: Vec<RoomSnapshot>,
}

/// Body of an error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponseDto {
    pub error: String,
}

impl ErrorResponseDto {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
