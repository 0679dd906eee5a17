//! Session token contents and the client-visible session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Sentinel surfaced on a session instead of a raw error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum TokenError {
    /// The last refresh failed; the user must sign in again.
    RefreshAccessTokenError,
    /// The stored access token could not be decrypted.
    TokenDecryptionError,
}

impl TokenError {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RefreshAccessTokenError => "RefreshAccessTokenError",
            Self::TokenDecryptionError => "TokenDecryptionError",
        }
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encrypted provider tokens. The four fields are always replaced or dropped
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedCredentials {
    pub access_token_ciphertext: String,
    pub refresh_token_ciphertext: String,
    pub access_token_expires_at: i64,
    pub refresh_token_expires_at: i64,
}

/// State carried inside the client-held session cookie.
///
/// Holds either `credentials` or a `last_error`; never a partial pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub local_user_id: Uuid,
    pub external_id: String,
    pub roles: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<SealedCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<TokenError>,
    pub issued_at: i64,
}

impl SessionToken {
    /// Same identity, credentials replaced, error cleared.
    #[must_use]
    pub fn with_credentials(self, credentials: SealedCredentials) -> Self {
        Self {
            credentials: Some(credentials),
            last_error: None,
            ..self
        }
    }

    /// Same identity, credentials dropped, error recorded.
    #[must_use]
    pub fn with_error(self, error: TokenError) -> Self {
        Self {
            credentials: None,
            last_error: Some(error),
            ..self
        }
    }
}

/// What the client sees for its session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[schema(value_type = String)]
    pub user_id: Uuid,
    pub external_id: String,
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TokenError>,
    /// Epoch milliseconds after which the session cookie is no longer honored.
    pub expires_at: i64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("external_id", &self.external_id)
            .field("roles", &self.roles)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("error", &self.error)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
