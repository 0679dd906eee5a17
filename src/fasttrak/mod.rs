//! FastTrak identity provider integration.
//!
//! FastTrak is the system of record for credentials and, by default, roles.
//! The client exposes three calls (authenticate, refresh, register). None of
//! them retry; callers decide whether a failure is worth another attempt.

mod client;
mod types;

pub use client::FastTrakClient;
pub use types::strip_comment_lines;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FastTrakError {
    /// Credentials were refused on `/authenticate`.
    #[error("authentication rejected by identity provider ({status})")]
    Authentication { status: u16 },
    /// `/refresh` or `/register` answered with a non-success status.
    #[error("identity provider rejected the request ({status})")]
    Rejected { status: u16 },
    #[error("unexpected identity provider response: {0}")]
    Protocol(String),
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),
}

/// Result of a successful `/authenticate` call.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub external_id: String,
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub roles: Vec<String>,
}

/// Result of a successful `/refresh` call.
///
/// `refresh_token` is `None` when the provider did not rotate it; the caller
/// keeps using the previous one.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub password: SecretString,
    pub email: String,
    pub display_name: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<AuthenticatedIdentity, FastTrakError>;

    async fn refresh(
        &self,
        external_id: &str,
        refresh_token: &SecretString,
    ) -> Result<RefreshedTokens, FastTrakError>;

    /// Create an account at the provider and return its external id.
    async fn register(&self, registration: &Registration) -> Result<String, FastTrakError>;
}
