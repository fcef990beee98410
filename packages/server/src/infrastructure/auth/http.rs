//! Token validation against the external auth service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AuthError, Authenticator, UserId};

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    user_id: i64,
}

/// Upper bound for one validation round trip
pub const AUTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Validates tokens with `POST http://{auth_service}/auth/validate`
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
    validate_url: String,
}

impl HttpAuthenticator {
    /// `auth_service` is the `host:port` of the auth service
    pub fn new(auth_service: &str) -> reqwest::Result<Self> {
        Self::with_timeout(auth_service, AUTH_REQUEST_TIMEOUT)
    }

    /// Requests slower than `timeout` fail as [`AuthError::Unavailable`]
    pub fn with_timeout(auth_service: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, auth_service))
    }

    pub fn with_client(client: reqwest::Client, auth_service: &str) -> Self {
        Self {
            client,
            validate_url: format!("http://{}/auth/validate", auth_service),
        }
    }

    pub fn validate_url(&self) -> &str {
        &self.validate_url
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        let response = self
            .client
            .post(&self.validate_url)
            .json(&ValidateRequest { token })
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Token rejected by auth service ({}): {}", status, body);
            return Err(AuthError::InvalidToken(format!("auth service answered {}", status)));
        }

        let payload: TokenPayload = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidToken(format!("bad token payload: {}", e)))?;
        Ok(UserId::new(payload.user_id))
    }
}
