//! WebSocket payload DTOs.

use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatId, NewMessage, UserId},
    realtime::signature::{JsonSignature, object_signature},
};

/// Application event carrying chat messages in both directions
pub const EVENT_MESSAGE: &str = "message";

/// `data` of an inbound "message" event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFromRequest {
    pub chat_id: ChatId,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl MessageFromRequest {
    pub fn into_new_message(self, sender_id: UserId) -> NewMessage {
        NewMessage {
            sender_id,
            chat_id: self.chat_id,
            kind: self.kind,
            content: self.content,
        }
    }
}

impl JsonSignature for MessageFromRequest {
    fn signature() -> String {
        object_signature(&[
            ("chatId", i64::signature()),
            ("type", String::signature()),
            ("content", String::signature()),
        ])
    }
}
