//! Test helpers shared by the session modules.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::lifecycle::{CredentialPair, Principal};
use crate::cipher::Cipher;
use crate::fasttrak::{
    AuthenticatedIdentity, FastTrakError, IdentityProvider, RefreshedTokens, Registration,
};

/// 2024-01-01T00:00:00Z
pub(crate) const NOW: i64 = 1_704_067_200_000;

pub(crate) fn cipher() -> Cipher {
    Cipher::new(&[42u8; 32]).unwrap()
}

pub(crate) fn other_cipher() -> Cipher {
    Cipher::new(&[7u8; 32]).unwrap()
}

pub(crate) fn identity(roles: &[&str]) -> AuthenticatedIdentity {
    AuthenticatedIdentity {
        external_id: "u1".to_string(),
        access_token: SecretString::from("access-1".to_string()),
        refresh_token: SecretString::from("refresh-1".to_string()),
        access_token_ttl_seconds: 3600,
        refresh_token_ttl_seconds: 86400,
        roles: roles.iter().map(ToString::to_string).collect(),
    }
}

pub(crate) fn principal(now_ms: i64) -> Principal {
    let identity = identity(&["Admin"]);
    Principal {
        local_user_id: Uuid::nil(),
        external_id: identity.external_id.clone(),
        roles: BTreeSet::from(["Admin".to_string()]),
        credentials: CredentialPair::issued(&identity, now_ms),
    }
}

enum RefreshBehavior {
    Rotate,
    KeepRefreshToken,
    Reject,
}

/// In-process identity provider that records refresh calls.
pub(crate) struct StubProvider {
    refresh: RefreshBehavior,
    roles: Vec<String>,
    refresh_calls: AtomicUsize,
    last_refresh_token: Mutex<Option<String>>,
    last_external_id: Mutex<Option<String>>,
}

impl StubProvider {
    fn with(refresh: RefreshBehavior) -> Self {
        Self {
            refresh,
            roles: vec!["Admin".to_string()],
            refresh_calls: AtomicUsize::new(0),
            last_refresh_token: Mutex::new(None),
            last_external_id: Mutex::new(None),
        }
    }

    pub(crate) fn rotating() -> Self {
        Self::with(RefreshBehavior::Rotate)
    }

    pub(crate) fn non_rotating() -> Self {
        Self::with(RefreshBehavior::KeepRefreshToken)
    }

    pub(crate) fn failing() -> Self {
        Self::with(RefreshBehavior::Reject)
    }

    pub(crate) fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(ToString::to_string).collect();
        self
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().unwrap().clone()
    }

    pub(crate) fn last_external_id(&self) -> Option<String> {
        self.last_external_id.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<AuthenticatedIdentity, FastTrakError> {
        if username != "alice" || password.expose_secret() != "secret" {
            return Err(FastTrakError::Authentication { status: 401 });
        }
        let roles: Vec<&str> = self.roles.iter().map(String::as_str).collect();
        Ok(identity(&roles))
    }

    async fn refresh(
        &self,
        external_id: &str,
        refresh_token: &SecretString,
    ) -> Result<RefreshedTokens, FastTrakError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock().unwrap() = Some(refresh_token.expose_secret().to_string());
        *self.last_external_id.lock().unwrap() = Some(external_id.to_string());

        let rotated = match self.refresh {
            RefreshBehavior::Rotate => Some(SecretString::from("refresh-2".to_string())),
            RefreshBehavior::KeepRefreshToken => None,
            RefreshBehavior::Reject => return Err(FastTrakError::Rejected { status: 401 }),
        };

        Ok(RefreshedTokens {
            access_token: SecretString::from("access-2".to_string()),
            refresh_token: rotated,
            access_token_ttl_seconds: 60,
            refresh_token_ttl_seconds: 600,
        })
    }

    async fn register(&self, registration: &Registration) -> Result<String, FastTrakError> {
        Ok(format!("ext-{}", registration.username))
    }
}
