//! Role checks against the claims carried by the session.
//!
//! Roles are a flat set: membership is the whole check, no role implies
//! another.

use thiserror::Error;

use crate::error::AppError;
use crate::session::{Session, TokenError};

pub const ADMIN_ROLE: &str = "Admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("insufficient role")]
    InsufficientRole,
}

/// Non-failing role check for conditional logic.
#[must_use]
pub fn has_role(session: Option<&Session>, role: &str) -> bool {
    session.is_some_and(|session| session.roles.iter().any(|r| r == role))
}

/// Return the session when it carries `role`.
///
/// # Errors
/// `Unauthenticated` without a session, `InsufficientRole` when the role is
/// missing.
pub fn require_role<'a>(
    session: Option<&'a Session>,
    role: &str,
) -> Result<&'a Session, AuthzError> {
    let session = session.ok_or(AuthzError::Unauthenticated)?;
    if has_role(Some(session), role) {
        Ok(session)
    } else {
        Err(AuthzError::InsufficientRole)
    }
}

/// Return the live access token for an outbound call.
///
/// Identity and roles stay usable on an errored session, but anything that
/// needs the provider token fails until the user signs in again.
///
/// # Errors
/// `Unauthenticated` without a session, `Decryption` when the stored token was
/// unreadable, `RefreshAccessToken` otherwise.
pub fn require_access_token(session: Option<&Session>) -> Result<&str, AppError> {
    let session = session.ok_or(AppError::Unauthenticated)?;
    match (&session.access_token, session.error) {
        (Some(token), None) => Ok(token),
        (_, Some(TokenError::TokenDecryptionError)) => Err(AppError::Decryption),
        _ => Err(AppError::RefreshAccessToken),
    }
}
