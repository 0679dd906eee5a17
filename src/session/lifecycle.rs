//! Token lifecycle: decide on each session read whether the stored provider
//! tokens are reused, refreshed, or dropped.
//!
//! All state lives in the [`SessionToken`]; the manager keeps nothing between
//! calls. Refresh failures never escape as errors. They are folded into
//! `last_error` so the session framework always gets a usable token back.

use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::token::{SealedCredentials, SessionToken, TokenError};
use crate::cipher::{Cipher, DecryptionError, EncryptionError};
use crate::fasttrak::{AuthenticatedIdentity, FastTrakError, IdentityProvider};

pub const DEFAULT_REFRESH_BUFFER_MS: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Access token outlives the refresh buffer; reuse it.
    Fresh,
    /// Inside the buffer, expired, or missing; refresh it.
    Expiring,
    /// A refresh already failed; wait for a new sign-in.
    Errored,
}

/// Plaintext provider tokens with absolute expiries (epoch ms). Never stored
/// as is.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub access_token_expires_at: i64,
    pub refresh_token_expires_at: i64,
}

impl CredentialPair {
    /// Pair issued by `/authenticate`, with expiries counted from `now_ms`.
    #[must_use]
    pub fn issued(identity: &AuthenticatedIdentity, now_ms: i64) -> Self {
        Self {
            access_token: identity.access_token.clone(),
            refresh_token: identity.refresh_token.clone(),
            access_token_expires_at: expires_at(now_ms, identity.access_token_ttl_seconds),
            refresh_token_expires_at: expires_at(now_ms, identity.refresh_token_ttl_seconds),
        }
    }
}

/// A freshly authenticated user, available only on the sign-in request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub local_user_id: Uuid,
    pub external_id: String,
    pub roles: BTreeSet<String>,
    pub credentials: CredentialPair,
}

#[derive(Debug, Error)]
enum RefreshFailure {
    #[error("no stored credentials")]
    MissingCredentials,
    #[error("no external identity")]
    MissingIdentity,
    #[error("refresh token expired")]
    RefreshTokenExpired,
    #[error("stored refresh token unreadable: {0}")]
    Decryption(#[from] DecryptionError),
    #[error(transparent)]
    Provider(#[from] FastTrakError),
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}

fn expires_at(now_ms: i64, ttl_seconds: i64) -> i64 {
    now_ms.saturating_add(ttl_seconds.saturating_mul(1000))
}

#[derive(Clone)]
pub struct TokenLifecycleManager {
    cipher: Cipher,
    provider: Arc<dyn IdentityProvider>,
    refresh_buffer_ms: i64,
}

impl fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("refresh_buffer_ms", &self.refresh_buffer_ms)
            .finish_non_exhaustive()
    }
}

impl TokenLifecycleManager {
    #[must_use]
    pub fn new(cipher: Cipher, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            cipher,
            provider,
            refresh_buffer_ms: DEFAULT_REFRESH_BUFFER_MS,
        }
    }

    #[must_use]
    pub fn with_refresh_buffer_ms(mut self, refresh_buffer_ms: i64) -> Self {
        self.refresh_buffer_ms = refresh_buffer_ms;
        self
    }

    #[must_use]
    pub fn refresh_buffer_ms(&self) -> i64 {
        self.refresh_buffer_ms
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Build the session token for a sign-in. No expiry check: whatever the
    /// provider just issued is encrypted and stored.
    #[instrument(skip(self, principal), fields(external_id = %principal.external_id))]
    pub fn login(&self, principal: &Principal, now_ms: i64) -> SessionToken {
        let token = SessionToken {
            local_user_id: principal.local_user_id,
            external_id: principal.external_id.clone(),
            roles: principal.roles.clone(),
            credentials: None,
            last_error: None,
            issued_at: now_ms,
        };

        match self.seal(&principal.credentials) {
            Ok(credentials) => token.with_credentials(credentials),
            Err(e) => {
                warn!("Failed to encrypt issued tokens: {e}");
                token.with_error(TokenError::RefreshAccessTokenError)
            }
        }
    }

    #[must_use]
    pub fn state(&self, token: &SessionToken, now_ms: i64) -> TokenState {
        if token.last_error.is_some() {
            return TokenState::Errored;
        }

        match &token.credentials {
            Some(credentials)
                if credentials
                    .access_token_expires_at
                    .saturating_sub(self.refresh_buffer_ms)
                    > now_ms =>
            {
                TokenState::Fresh
            }
            _ => TokenState::Expiring,
        }
    }

    /// Reuse, refresh, or leave errored, depending on [`TokenState`].
    pub async fn ensure_fresh(&self, token: SessionToken, now_ms: i64) -> SessionToken {
        match self.state(&token, now_ms) {
            TokenState::Fresh | TokenState::Errored => token,
            TokenState::Expiring => self.refresh(token, now_ms).await,
        }
    }

    /// Exchange the stored refresh token. Success replaces both ciphertexts and
    /// both expiries; failure drops them and records `RefreshAccessTokenError`.
    #[instrument(skip(self, token), fields(external_id = %token.external_id))]
    pub async fn refresh(&self, token: SessionToken, now_ms: i64) -> SessionToken {
        match self.exchange(&token, now_ms).await {
            Ok(credentials) => {
                debug!("access token refreshed");
                token.with_credentials(credentials)
            }
            Err(e) => {
                warn!("Failed to refresh access token: {e}");
                token.with_error(TokenError::RefreshAccessTokenError)
            }
        }
    }

    /// Decrypt the live access token for an outbound call.
    ///
    /// # Errors
    /// Returns `DecryptionError` when the ciphertext is corrupt or sealed under
    /// another key.
    pub fn decrypt_access_token(
        &self,
        credentials: &SealedCredentials,
    ) -> Result<SecretString, DecryptionError> {
        self.cipher
            .decrypt(&credentials.access_token_ciphertext)
            .map(SecretString::from)
    }

    async fn exchange(
        &self,
        token: &SessionToken,
        now_ms: i64,
    ) -> Result<SealedCredentials, RefreshFailure> {
        let stored = token
            .credentials
            .as_ref()
            .ok_or(RefreshFailure::MissingCredentials)?;
        if token.external_id.is_empty() {
            return Err(RefreshFailure::MissingIdentity);
        }
        if stored.refresh_token_expires_at <= now_ms {
            return Err(RefreshFailure::RefreshTokenExpired);
        }

        let refresh_token =
            SecretString::from(self.cipher.decrypt(&stored.refresh_token_ciphertext)?);

        let refreshed = self
            .provider
            .refresh(&token.external_id, &refresh_token)
            .await?;

        // Rotation is optional on the provider side.
        let refresh_token = refreshed.refresh_token.unwrap_or(refresh_token);

        Ok(self.seal(&CredentialPair {
            access_token: refreshed.access_token,
            refresh_token,
            access_token_expires_at: expires_at(now_ms, refreshed.access_token_ttl_seconds),
            refresh_token_expires_at: expires_at(now_ms, refreshed.refresh_token_ttl_seconds),
        })?)
    }

    fn seal(&self, pair: &CredentialPair) -> Result<SealedCredentials, EncryptionError> {
        Ok(SealedCredentials {
            access_token_ciphertext: self.cipher.encrypt(pair.access_token.expose_secret())?,
            refresh_token_ciphertext: self.cipher.encrypt(pair.refresh_token.expose_secret())?,
            access_token_expires_at: pair.access_token_expires_at,
            refresh_token_expires_at: pair.refresh_token_expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::{cipher, principal, StubProvider, NOW};

    fn manager(provider: &Arc<StubProvider>) -> TokenLifecycleManager {
        TokenLifecycleManager::new(cipher(), provider.clone())
    }

    fn with_access_expiry(mut token: SessionToken, expires_at: i64) -> SessionToken {
        if let Some(credentials) = token.credentials.as_mut() {
            credentials.access_token_expires_at = expires_at;
        }
        token
    }

    #[test]
    fn login_sets_expiries_from_issued_ttl() {
        let provider = Arc::new(StubProvider::rotating());
        let manager = manager(&provider);

        let token = manager.login(&principal(NOW), NOW);
        let credentials = token.credentials.expect("credentials");
        assert_eq!(credentials.access_token_expires_at, NOW + 3_600_000);
        assert_eq!(credentials.refresh_token_expires_at, NOW + 86_400_000);
        assert_eq!(token.issued_at, NOW);
        assert!(token.last_error.is_none());
        assert_eq!(provider.refresh_calls(), 0);
    }

    #[test]
    fn login_encrypts_tokens() {
        let provider = Arc::new(StubProvider::rotating());
        let manager = manager(&provider);

        let token = manager.login(&principal(NOW), NOW);
        let credentials = token.credentials.expect("credentials");
        assert_ne!(credentials.access_token_ciphertext, "access-1");
        assert_eq!(
            cipher()
                .decrypt(&credentials.access_token_ciphertext)
                .expect("decrypt"),
            "access-1"
        );
        assert_eq!(
            cipher()
                .decrypt(&credentials.refresh_token_ciphertext)
                .expect("decrypt"),
            "refresh-1"
        );
    }

    #[test]
    fn login_is_unconditional_even_for_already_expired_pairs() {
        let provider = Arc::new(StubProvider::rotating());
        let manager = manager(&provider);

        let mut expired = principal(NOW);
        expired.credentials.access_token_expires_at = NOW - 1;
        let token = manager.login(&expired, NOW);
        assert_eq!(
            token.credentials.map(|c| c.access_token_expires_at),
            Some(NOW - 1)
        );
        assert!(token.last_error.is_none());
    }

    #[tokio::test]
    async fn buffer_boundary_decides_refresh() {
        let provider = Arc::new(StubProvider::rotating());
        let manager = manager(&provider);
        let buffer = manager.refresh_buffer_ms();
        let token = manager.login(&principal(NOW), NOW);

        let fresh = with_access_expiry(token.clone(), NOW + buffer + 1);
        assert_eq!(manager.state(&fresh, NOW), TokenState::Fresh);
        let unchanged = manager.ensure_fresh(fresh.clone(), NOW).await;
        assert_eq!(unchanged, fresh);
        assert_eq!(provider.refresh_calls(), 0);

        let expiring = with_access_expiry(token, NOW + buffer - 1);
        assert_eq!(manager.state(&expiring, NOW), TokenState::Expiring);
        let refreshed = manager.ensure_fresh(expiring, NOW).await;
        assert_eq!(provider.refresh_calls(), 1);
        assert!(refreshed.last_error.is_none());
    }

    #[tokio::test]
    async fn already_expired_token_refreshes() {
        let provider = Arc::new(StubProvider::rotating());
        let manager = manager(&provider);
        let token = with_access_expiry(manager.login(&principal(NOW), NOW), NOW - 5_000);

        let refreshed = manager.ensure_fresh(token, NOW).await;
        assert_eq!(provider.refresh_calls(), 1);
        assert!(refreshed.credentials.is_some());
    }

    #[tokio::test]
    async fn successful_refresh_replaces_all_four_fields() {
        let provider = Arc::new(StubProvider::rotating());
        let manager = manager(&provider);
        let token = with_access_expiry(manager.login(&principal(NOW), NOW), NOW);
        let before = token.credentials.clone().expect("credentials");

        let later = NOW + 1_000;
        let refreshed = manager.refresh(token, later).await;
        let after = refreshed.credentials.expect("credentials");

        assert_ne!(after.access_token_ciphertext, before.access_token_ciphertext);
        assert_ne!(after.refresh_token_ciphertext, before.refresh_token_ciphertext);
        assert_eq!(after.access_token_expires_at, later + 60_000);
        assert_eq!(after.refresh_token_expires_at, later + 600_000);
        assert_eq!(
            cipher().decrypt(&after.access_token_ciphertext).expect("decrypt"),
            "access-2"
        );
        assert_eq!(
            cipher().decrypt(&after.refresh_token_ciphertext).expect("decrypt"),
            "refresh-2"
        );
        assert!(refreshed.last_error.is_none());
        assert_eq!(provider.last_refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(provider.last_external_id().as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn refresh_without_rotation_keeps_prior_refresh_token() {
        let provider = Arc::new(StubProvider::non_rotating());
        let manager = manager(&provider);
        let token = with_access_expiry(manager.login(&principal(NOW), NOW), NOW);

        let refreshed = manager.refresh(token, NOW).await;
        let after = refreshed.credentials.expect("credentials");
        assert_eq!(
            cipher().decrypt(&after.refresh_token_ciphertext).expect("decrypt"),
            "refresh-1"
        );
    }

    #[tokio::test]
    async fn failed_refresh_clears_all_fields_and_sets_error() {
        let provider = Arc::new(StubProvider::failing());
        let manager = manager(&provider);
        let token = with_access_expiry(manager.login(&principal(NOW), NOW), NOW);

        let failed = manager.ensure_fresh(token, NOW).await;
        assert!(failed.credentials.is_none());
        assert_eq!(failed.last_error, Some(TokenError::RefreshAccessTokenError));
        assert_eq!(failed.external_id, "u1");
        assert_eq!(provider.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn errored_token_is_not_refreshed_again() {
        let provider = Arc::new(StubProvider::failing());
        let manager = manager(&provider);
        let token = with_access_expiry(manager.login(&principal(NOW), NOW), NOW);

        let failed = manager.ensure_fresh(token, NOW).await;
        assert_eq!(manager.state(&failed, NOW), TokenState::Errored);
        let again = manager.ensure_fresh(failed.clone(), NOW + 60_000).await;
        assert_eq!(again, failed);
        assert_eq!(provider.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn missing_credentials_attempt_refresh_and_fail() {
        let provider = Arc::new(StubProvider::rotating());
        let manager = manager(&provider);
        let mut token = manager.login(&principal(NOW), NOW);
        token.credentials = None;

        assert_eq!(manager.state(&token, NOW), TokenState::Expiring);
        let failed = manager.ensure_fresh(token, NOW).await;
        assert_eq!(failed.last_error, Some(TokenError::RefreshAccessTokenError));
        assert_eq!(provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn undecryptable_refresh_token_fails_without_network() {
        let provider = Arc::new(StubProvider::rotating());
        let manager = manager(&provider);
        let mut token = with_access_expiry(manager.login(&principal(NOW), NOW), NOW);
        if let Some(credentials) = token.credentials.as_mut() {
            credentials.refresh_token_ciphertext = "AAAA".to_string();
        }

        let failed = manager.ensure_fresh(token, NOW).await;
        assert!(failed.credentials.is_none());
        assert_eq!(failed.last_error, Some(TokenError::RefreshAccessTokenError));
        assert_eq!(provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn expired_refresh_token_fails_without_network() {
        let provider = Arc::new(StubProvider::rotating());
        let manager = manager(&provider);
        let mut token = with_access_expiry(manager.login(&principal(NOW), NOW), NOW);
        if let Some(credentials) = token.credentials.as_mut() {
            credentials.refresh_token_expires_at = NOW;
        }

        let failed = manager.ensure_fresh(token, NOW).await;
        assert_eq!(failed.last_error, Some(TokenError::RefreshAccessTokenError));
        assert_eq!(provider.refresh_calls(), 0);
    }

    #[test]
    fn custom_buffer_moves_the_boundary() {
        let provider = Arc::new(StubProvider::rotating());
        let manager = manager(&provider).with_refresh_buffer_ms(60_000);
        let token = with_access_expiry(manager.login(&principal(NOW), NOW), NOW + 30_000);
        assert_eq!(manager.state(&token, NOW), TokenState::Expiring);
    }
}
