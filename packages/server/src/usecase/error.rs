//! UseCase 層のエラー型

use thiserror::Error;

use crate::{
    domain::{ChatId, RepositoryError},
    infrastructure::dto::websocket::MessageFromRequest,
    realtime::{Envelope, RegistryError},
};

/// "message" イベントが拒否される理由
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendMessageError {
    /// `data` が [`MessageFromRequest`] の形ではない
    #[error("invalid message data format")]
    InvalidDataFormat,

    #[error("not allowed to write to that chat")]
    NotAllowed(ChatId),

    #[error(transparent)]
    Room(#[from] RegistryError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

impl SendMessageError {
    /// 送信者に返すエラーイベント
    pub fn reply(&self) -> Envelope {
        match self {
            Self::InvalidDataFormat => Envelope::invalid_data_format::<MessageFromRequest>(),
            other => Envelope::error(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinChatsError {
    #[error("failed to list chats: {0}")]
    Repository(#[from] RepositoryError),
}
