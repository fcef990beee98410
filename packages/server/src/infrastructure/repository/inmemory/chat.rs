//! InMemory Chat Repository 実装
//!
//! ドメイン層が定義する ChatRepository trait の具体的な実装。
//! chat id → 参加者集合の HashMap をインメモリ DB として使用します。

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{ChatId, ChatRepository, RepositoryError, UserId};

/// インメモリ Chat Repository 実装
#[derive(Debug, Default)]
pub struct InMemoryChatRepository {
    /// chat id → participants
    participants: RwLock<HashMap<ChatId, HashSet<UserId>>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository from a JSON object mapping chat ids to participant ids.
    ///
    /// ```
    /// use rtchat_server::infrastructure::repository::InMemoryChatRepository;
    ///
    /// let repo = InMemoryChatRepository::from_json(r#"{"5": [1, 2], "7": [1]}"#).unwrap();
    /// # let _ = repo;
    /// ```
    pub fn from_json(seed: &str) -> Result<Self, RepositoryError> {
        let chats: BTreeMap<i64, Vec<i64>> = serde_json::from_str(seed)
            .map_err(|e| RepositoryError::InvalidInput(format!("participants seed: {}", e)))?;

        let participants = chats
            .into_iter()
            .map(|(chat_id, users)| {
                (
                    ChatId::new(chat_id),
                    users.into_iter().map(UserId::new).collect(),
                )
            })
            .collect();

        Ok(Self {
            participants: RwLock::new(participants),
        })
    }

    /// Add a user to a chat, creating the chat if needed
    pub async fn add_participant(&self, chat_id: ChatId, user_id: UserId) {
        let mut participants = self.participants.write().await;
        participants.entry(chat_id).or_default().insert(user_id);
    }

    pub async fn chat_count(&self) -> usize {
        self.participants.read().await.len()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn user_chats(&self, user_id: UserId) -> Result<Vec<ChatId>, RepositoryError> {
        let participants = self.participants.read().await;
        let mut chats: Vec<ChatId> = participants
            .iter()
            .filter(|(_, users)| users.contains(&user_id))
            .map(|(chat_id, _)| *chat_id)
            .collect();
        chats.sort();
        Ok(chats)
    }

    async fn is_participant(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> Result<bool, RepositoryError> {
        let participants = self.participants.read().await;
        Ok(participants
            .get(&chat_id)
            .is_some_and(|users| users.contains(&user_id)))
    }
}
