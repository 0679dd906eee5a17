//! Sealing the session token into the client-held cookie.
//!
//! The token is JSON encrypted under the session secret, so the client can
//! neither read nor alter it. Age is checked against `issued_at` on every open,
//! whatever the state of the provider tokens inside.

use axum::http::{
    header::{InvalidHeaderValue, AUTHORIZATION, COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use thiserror::Error;

use super::token::SessionToken;
use crate::cipher::{Cipher, DecryptionError};

pub const SESSION_COOKIE_NAME: &str = "trakgate_session";

#[derive(Debug, Error)]
pub enum SessionCodecError {
    #[error("session token could not be sealed")]
    Seal,
    #[error("session token failed to open: {0}")]
    Open(#[from] DecryptionError),
    #[error("session token is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("session token expired")]
    Expired,
}

/// Where a sealed token was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Bearer,
    Cookie,
}

#[derive(Clone, Debug)]
pub struct SessionCodec {
    cipher: Cipher,
    max_age_seconds: i64,
    secure: bool,
}

impl SessionCodec {
    #[must_use]
    pub fn new(cipher: Cipher, max_age_seconds: i64) -> Self {
        Self {
            cipher,
            max_age_seconds,
            secure: true,
        }
    }

    /// Only mark cookies `Secure` when the frontend is served over HTTPS.
    #[must_use]
    pub fn with_secure_cookie(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Unix millis after which `open` refuses the token.
    #[must_use]
    pub fn expires_at(&self, token: &SessionToken) -> i64 {
        token
            .issued_at
            .saturating_add(self.max_age_seconds.saturating_mul(1000))
    }

    /// # Errors
    /// Returns `SessionCodecError::Seal` if serialization or encryption fails.
    pub fn seal(&self, token: &SessionToken) -> Result<String, SessionCodecError> {
        let json = serde_json::to_vec(token).map_err(|_| SessionCodecError::Seal)?;
        let blob = self
            .cipher
            .encrypt_raw(&json)
            .map_err(|_| SessionCodecError::Seal)?;
        Ok(Base64UrlUnpadded::encode_string(&blob))
    }

    /// # Errors
    /// Returns `SessionCodecError` when the value was tampered with, sealed
    /// under another secret, or is older than the maximum session age.
    pub fn open(&self, sealed: &str, now_ms: i64) -> Result<SessionToken, SessionCodecError> {
        let blob = Base64UrlUnpadded::decode_vec(sealed).map_err(|_| DecryptionError::Encoding)?;
        let json = self.cipher.decrypt_raw(&blob)?;
        let token: SessionToken = serde_json::from_str(&json)?;

        if self.expires_at(&token) <= now_ms {
            return Err(SessionCodecError::Expired);
        }

        Ok(token)
    }

    /// Build an `HttpOnly` cookie for the sealed token. `Max-Age` covers only
    /// what is left of the session, so a resealed cookie never outlives it.
    ///
    /// # Errors
    /// Returns an error if the value is not a valid header value.
    pub fn cookie(
        &self,
        sealed: &str,
        token: &SessionToken,
        now_ms: i64,
    ) -> Result<HeaderValue, InvalidHeaderValue> {
        let max_age = (self.expires_at(token).saturating_sub(now_ms) / 1000).max(0);
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={sealed}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    /// # Errors
    /// Returns an error if the value is not a valid header value.
    pub fn clear_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie =
            format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

/// Sealed token candidates in the order they should be tried: the bearer
/// header first, then the session cookie.
#[must_use]
pub fn sealed_token_candidates(headers: &HeaderMap) -> Vec<(TokenSource, String)> {
    let mut candidates = Vec::with_capacity(2);
    if let Some(token) = extract_bearer_token(headers) {
        candidates.push((TokenSource::Bearer, token));
    }
    if let Some(token) = extract_cookie_token(headers) {
        candidates.push((TokenSource::Cookie, token));
    }
    candidates
}

fn extract_cookie_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(COOKIE)?.to_str().ok()?;
    for pair in value.split(';') {
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty() {
            return Some(val.trim().to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
