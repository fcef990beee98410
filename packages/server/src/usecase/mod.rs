//! UseCase 層
//!
//! チャットのユースケースをソケットのイベントリスナーとして提供します。

mod chat_events;
mod error;
mod farewell;
mod join_chats;
mod send_message;

pub use chat_events::ChatEvents;
pub use error::{JoinChatsError, SendMessageError};
pub use farewell::{FAREWELL_CONTENT, FarewellUseCase};
pub use join_chats::JoinChatsUseCase;
pub use send_message::SendMessageUseCase;
