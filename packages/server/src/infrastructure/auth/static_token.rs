//! Fixed token table, for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{AuthError, Authenticator, UserId};

#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl StaticAuthenticator {
    pub fn new(tokens: impl IntoIterator<Item = (String, UserId)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        self.tokens
            .get(token)
            .copied()
            .ok_or_else(|| AuthError::InvalidToken("unknown token".to_string()))
    }
}
