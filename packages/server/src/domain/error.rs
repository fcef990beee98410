//! Domain-level error types.

use thiserror::Error;

/// Errors returned by the collaborator repositories
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The backing store could not be reached or failed the operation
    #[error("storage failure: {0}")]
    Storage(String),

    /// Input rejected by the store
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors returned while establishing a user identity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No bearer token was supplied with the request
    #[error("absent or bad authorization token")]
    MissingToken,

    /// The token was rejected by the validator
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The token validation service could not be consulted
    #[error("auth service unavailable: {0}")]
    Unavailable(String),
}
