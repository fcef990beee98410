//! InMemory Message Repository 実装

use std::sync::Arc;

use async_trait::async_trait;
use rtchat_shared::time::{Clock, SystemClock, timestamp_to_rfc3339};
use tokio::sync::Mutex;

use crate::domain::{ChatId, MessageRepository, NewMessage, RepositoryError, StoredMessage};

/// インメモリ Message Repository 実装
///
/// Ids are assigned sequentially from 1, creation time comes from the clock.
pub struct InMemoryMessageRepository {
    messages: Mutex<Vec<StoredMessage>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Messages stored for a chat, oldest first
    pub async fn chat_messages(&self, chat_id: ChatId) -> Vec<StoredMessage> {
        let messages = self.messages.lock().await;
        messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.messages.lock().await.len()
    }
}

impl Default for InMemoryMessageRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(&self, message: NewMessage) -> Result<StoredMessage, RepositoryError> {
        let mut messages = self.messages.lock().await;
        let id = messages.len() as i64 + 1;
        let created_at = timestamp_to_rfc3339(self.clock.now_millis());
        let stored = StoredMessage::from_new(id, message, created_at);
        messages.push(stored.clone());
        Ok(stored)
    }
}
