//! Domain layer: identities, messages, and the collaborator interfaces.

pub mod entity;
pub mod error;
pub mod repository;
pub mod value_object;

pub use entity::{NewMessage, StoredMessage};
pub use error::{AuthError, RepositoryError};
pub use repository::{Authenticator, ChatRepository, MessageRepository};
pub use value_object::{ChatId, ConnectionId, UserId};

#[cfg(test)]
pub use repository::{MockChatRepository, MockMessageRepository};
