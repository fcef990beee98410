//! Collaborator traits the real-time layer depends on.
//!
//! Persistence and token validation live outside this server; these traits
//! are the seams. Concrete implementations are in the infrastructure layer.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::{AuthError, ChatId, NewMessage, RepositoryError, StoredMessage, UserId};

/// Establishes the identity behind a bearer token
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Chat participation lookups
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Chats the user currently participates in
    async fn user_chats(&self, user_id: UserId) -> Result<Vec<ChatId>, RepositoryError>;

    /// Whether the user is an authorized participant of the chat
    async fn is_participant(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> Result<bool, RepositoryError>;
}

/// Message persistence
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Store a message and return its canonical form
    async fn create(&self, message: NewMessage) -> Result<StoredMessage, RepositoryError>;
}
