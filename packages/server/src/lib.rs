//! Real-time chat server library.
//!
//! Authenticated websocket clients are registered per user, joined to one
//! room per chat they participate in, and receive every message sent to
//! those chats as `{ event, data }` envelopes.

// layers
pub mod domain;
pub mod infrastructure;
pub mod realtime;
pub mod ui;
pub mod usecase;

pub mod config;
