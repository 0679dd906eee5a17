//! Error kinds surfaced at the HTTP boundary.
//!
//! Every kind maps to exactly one status code in [`AppError::status`]; the match
//! is exhaustive, so adding a kind without a status does not compile.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::cipher::DecryptionError;
use crate::fasttrak::FastTrakError;
use crate::guard::AuthzError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid username or password")]
    Authentication,
    #[error("account is disabled")]
    AccountDisabled,
    #[error("identity provider is unreachable")]
    Unreachable,
    #[error("identity provider returned an unexpected response")]
    Protocol,
    #[error("stored token could not be decrypted, sign in again")]
    Decryption,
    #[error("access token could not be refreshed, sign in again")]
    RefreshAccessToken,
    #[error("authentication required")]
    Unauthenticated,
    #[error("insufficient role")]
    InsufficientRole,
    #[error("{0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Authentication => "AuthenticationError",
            Self::AccountDisabled => "AccountDisabledError",
            Self::Unreachable => "UnreachableError",
            Self::Protocol => "ProtocolError",
            Self::Decryption => "DecryptionError",
            Self::RefreshAccessToken => "RefreshAccessTokenError",
            Self::Unauthenticated => "UnauthenticatedError",
            Self::InsufficientRole => "InsufficientRoleError",
            Self::BadRequest(_) => "BadRequest",
            Self::NotFound => "NotFound",
            Self::Conflict(_) => "Conflict",
            Self::Internal(_) => "InternalError",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Authentication
            | Self::Decryption
            | Self::RefreshAccessToken
            | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::AccountDisabled | Self::InsufficientRole => StatusCode::FORBIDDEN,
            Self::Unreachable | Self::Protocol => StatusCode::BAD_GATEWAY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FastTrakError> for AppError {
    fn from(err: FastTrakError) -> Self {
        match err {
            FastTrakError::Authentication { .. } => Self::Authentication,
            FastTrakError::Rejected { status: 409 } => {
                Self::Conflict("account already exists at the identity provider".to_string())
            }
            FastTrakError::Rejected { status } if (400..500).contains(&status) => {
                Self::BadRequest("identity provider rejected the request".to_string())
            }
            FastTrakError::Rejected { .. } | FastTrakError::Unreachable(_) => Self::Unreachable,
            FastTrakError::Protocol(_) => Self::Protocol,
        }
    }
}

impl From<DecryptionError> for AppError {
    fn from(_: DecryptionError) -> Self {
        Self::Decryption
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => Self::Unauthenticated,
            AuthzError::InsufficientRole => Self::InsufficientRole,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(err) => {
                error!("Internal error: {err:#}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(json!({
                "error": self.kind(),
                "message": message,
            })),
        )
            .into_response()
    }
}
