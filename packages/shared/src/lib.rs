//! Utilities shared by the chat server binary and its tests.

pub mod logger;
pub mod time;
