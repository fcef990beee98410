//! InMemory Repository 実装

mod chat;
mod message;

pub use chat::InMemoryChatRepository;
pub use message::InMemoryMessageRepository;
