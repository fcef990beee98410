//! Command line and environment configuration.

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use thiserror::Error;

use crate::{
    domain::{Authenticator, RepositoryError, UserId},
    infrastructure::{
        auth::{HttpAuthenticator, StaticAuthenticator},
        repository::InMemoryChatRepository,
    },
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("either --auth-service or at least one --dev-token is required")]
    NoAuthenticator,

    #[error("failed to read participants file {path}: {source}")]
    ReadParticipants {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Participants(#[from] RepositoryError),

    #[error("failed to build the auth service client: {0}")]
    AuthClient(#[from] reqwest::Error),
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rtchat-server")]
#[command(about = "Real-time chat server fanning messages out to chat rooms", long_about = None)]
pub struct Config {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// host:port of the token validation service
    #[arg(long, env = "AUTH_SERVICE")]
    pub auth_service: Option<String>,

    /// Fixed TOKEN=USER_ID pair, used when no auth service is configured
    #[arg(long = "dev-token", value_name = "TOKEN=USER_ID", value_parser = parse_dev_token)]
    pub dev_tokens: Vec<(String, UserId)>,

    /// JSON file mapping chat ids to participant user ids
    #[arg(long, env = "PARTICIPANTS_FILE")]
    pub participants: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "debug")]
    pub log_level: String,
}

impl Config {
    /// The auth service wins over dev tokens when both are given
    pub fn authenticator(&self) -> Result<Arc<dyn Authenticator>, ConfigError> {
        if let Some(auth_service) = &self.auth_service {
            return Ok(Arc::new(HttpAuthenticator::new(auth_service)?));
        }
        if self.dev_tokens.is_empty() {
            return Err(ConfigError::NoAuthenticator);
        }
        Ok(Arc::new(StaticAuthenticator::new(self.dev_tokens.clone())))
    }

    pub fn chat_repository(&self) -> Result<InMemoryChatRepository, ConfigError> {
        let Some(path) = &self.participants else {
            return Ok(InMemoryChatRepository::new());
        };
        let seed = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadParticipants {
            path: path.clone(),
            source,
        })?;
        Ok(InMemoryChatRepository::from_json(&seed)?)
    }
}

fn parse_dev_token(value: &str) -> Result<(String, UserId), String> {
    let (token, user_id) = value
        .split_once('=')
        .ok_or_else(|| format!("expected TOKEN=USER_ID, got '{}'", value))?;
    if token.is_empty() {
        return Err("token must not be empty".to_string());
    }
    let user_id: i64 = user_id
        .parse()
        .map_err(|e| format!("invalid user id '{}': {}", user_id, e))?;
    Ok((token.to_string(), UserId::new(user_id)))
}
