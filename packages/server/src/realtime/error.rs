//! リアルタイム層のエラー型

use thiserror::Error;

use crate::domain::{ChatId, UserId};

/// レジストリの検索失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no socket with user id {0}")]
    ConnectionNotFound(UserId),

    #[error("no room with id {0}")]
    RoomNotFound(ChatId),
}

/// 接続への書き込み失敗
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// 接続の writer が終了している
    #[error("connection {0} is closed")]
    Closed(UserId),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// イベントリスナーが報告する失敗
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ListenerError(String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<ConnectionError> for ListenerError {
    fn from(error: ConnectionError) -> Self {
        Self(error.to_string())
    }
}

impl From<RegistryError> for ListenerError {
    fn from(error: RegistryError) -> Self {
        Self(error.to_string())
    }
}
