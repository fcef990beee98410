//! Authenticator implementations.

mod http;
mod static_token;

pub use http::{AUTH_REQUEST_TIMEOUT, HttpAuthenticator};
pub use static_token::StaticAuthenticator;
