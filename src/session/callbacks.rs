//! Session hooks run by the HTTP layer.
//!
//! Flow Overview:
//! 1) `authorize` turns username/password into a [`Principal`] (FastTrak
//!    sign-in, directory upsert).
//! 2) `on_token` mints or re-checks the session token: with a principal it is a
//!    sign-in, without one it is a routine freshness check.
//! 3) `on_session` turns the token into the client-visible [`Session`]. Cipher
//!    errors stop here and surface only as `TokenDecryptionError`.
//!
//! Each hook takes the prior state and returns a new one.

use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    lifecycle::{CredentialPair, Principal, TokenLifecycleManager},
    token::{Session, SessionToken, TokenError},
};
use crate::directory::UserDirectory;
use crate::error::AppError;

pub const DEFAULT_MAX_SESSION_AGE_SECONDS: i64 = 3600;

#[derive(Clone)]
pub struct SessionCallbacks {
    manager: TokenLifecycleManager,
    directory: Arc<dyn UserDirectory>,
    max_session_age_seconds: i64,
}

impl std::fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("manager", &self.manager)
            .field("max_session_age_seconds", &self.max_session_age_seconds)
            .finish_non_exhaustive()
    }
}

impl SessionCallbacks {
    #[must_use]
    pub fn new(manager: TokenLifecycleManager, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            manager,
            directory,
            max_session_age_seconds: DEFAULT_MAX_SESSION_AGE_SECONDS,
        }
    }

    #[must_use]
    pub fn with_max_session_age_seconds(mut self, seconds: i64) -> Self {
        self.max_session_age_seconds = seconds;
        self
    }

    #[must_use]
    pub fn manager(&self) -> &TokenLifecycleManager {
        &self.manager
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    /// Sign in at FastTrak and record the user locally.
    ///
    /// # Errors
    /// Returns `AppError::Authentication`, `Unreachable` or `Protocol` for
    /// provider failures, `AccountDisabled` for managed accounts that are not
    /// active, and `Internal` for directory failures.
    #[instrument(skip(self, password))]
    pub async fn authorize(
        &self,
        username: &str,
        password: &SecretString,
        now_ms: i64,
    ) -> Result<Principal, AppError> {
        if username.trim().is_empty() || password.expose_secret().is_empty() {
            return Err(AppError::BadRequest(
                "username and password are required".to_string(),
            ));
        }

        let identity = self
            .manager
            .provider()
            .authenticate(username, password)
            .await?;

        if let Some(existing) = self
            .directory
            .find_by_external_id(&identity.external_id)
            .await?
        {
            if !existing.can_sign_in() {
                warn!(external_id = %identity.external_id, "sign-in refused for disabled account");
                return Err(AppError::AccountDisabled);
            }
        }

        let roles: BTreeSet<String> = identity.roles.iter().cloned().collect();
        let record = self.directory.upsert(&identity.external_id, &roles).await?;

        info!(local_user_id = %record.local_id, "user signed in");

        Ok(Principal {
            local_user_id: record.local_id,
            external_id: record.external_id,
            roles: record.roles,
            credentials: CredentialPair::issued(&identity, now_ms),
        })
    }

    /// Mint or update the session token.
    ///
    /// A principal means sign-in: the issued pair is stored unconditionally.
    /// Otherwise the previous token goes through the freshness check.
    pub async fn on_token(
        &self,
        previous: Option<SessionToken>,
        principal: Option<&Principal>,
        now_ms: i64,
    ) -> Option<SessionToken> {
        match (principal, previous) {
            (Some(principal), _) => Some(self.manager.login(principal, now_ms)),
            (None, Some(previous)) => Some(self.manager.ensure_fresh(previous, now_ms).await),
            (None, None) => None,
        }
    }

    /// Materialize the client-visible session.
    #[must_use]
    pub fn on_session(&self, token: &SessionToken) -> Session {
        let (access_token, error) = match (&token.last_error, &token.credentials) {
            (Some(error), _) => (None, Some(*error)),
            (None, Some(credentials)) => match self.manager.decrypt_access_token(credentials) {
                Ok(access_token) => (Some(access_token.expose_secret().to_string()), None),
                Err(e) => {
                    warn!("Failed to decrypt access token: {e}");
                    (None, Some(TokenError::TokenDecryptionError))
                }
            },
            (None, None) => (None, None),
        };

        Session {
            user_id: token.local_user_id,
            external_id: token.external_id.clone(),
            roles: token.roles.iter().cloned().collect(),
            access_token,
            error,
            expires_at: self.expires_at(token),
        }
    }

    /// When the session stops being honored, independent of token expiry.
    #[must_use]
    pub fn expires_at(&self, token: &SessionToken) -> i64 {
        token
            .issued_at
            .saturating_add(self.max_session_age_seconds.saturating_mul(1000))
    }

    #[must_use]
    pub fn max_session_age_seconds(&self) -> i64 {
        self.max_session_age_seconds
    }
}
