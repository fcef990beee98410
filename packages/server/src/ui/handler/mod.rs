//! Request handlers.

mod http;
mod websocket;

pub use http::{debug_rooms, health_check};
pub use websocket::websocket_handler;
