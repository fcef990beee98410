//! Data Transfer Objects (DTOs)
//!
//! Wire shapes exchanged with clients, kept apart from the domain entities.

pub mod http;
pub mod websocket;
