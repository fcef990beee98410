//! Domain entities.

use serde::{Deserialize, Serialize};

use super::{ChatId, UserId};

/// A chat message ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub sender_id: UserId,
    pub chat_id: ChatId,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

/// A chat message in its canonical stored form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: i64,
    pub sender_id: UserId,
    pub chat_id: ChatId,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// RFC 3339 creation time assigned by the store
    pub created_at: String,
}

impl StoredMessage {
    pub fn from_new(id: i64, message: NewMessage, created_at: String) -> Self {
        Self {
            id,
            sender_id: message.sender_id,
            chat_id: message.chat_id,
            kind: message.kind,
            content: message.content,
            created_at,
        }
    }
}
