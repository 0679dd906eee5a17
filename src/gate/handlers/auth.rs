use anyhow::anyhow;
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    error::AppError,
    gate::{middleware::CurrentSession, state::AppState},
    guard::require_access_token,
    session::Session,
    unix_millis,
};

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    username: String,
    #[schema(format = Password)]
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    access_token: String,
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in, session cookie set", body = Session, content_type = "application/json"),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account disabled"),
        (status = 502, description = "Identity provider failure"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let password = SecretString::from(request.password);
    let now = unix_millis();

    let callbacks = state.callbacks();
    let principal = callbacks.authorize(&request.username, &password, now).await?;
    let token = callbacks
        .on_token(None, Some(&principal), now)
        .await
        .ok_or_else(|| anyhow!("sign-in produced no session token"))?;

    let sealed = state.codec().seal(&token).map_err(anyhow::Error::from)?;
    let cookie = state
        .codec()
        .cookie(&sealed, &token, now)
        .map_err(anyhow::Error::from)?;

    Ok(([(SET_COOKIE, cookie)], Json(callbacks.on_session(&token))).into_response())
}

#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Current session", body = Session, content_type = "application/json"),
        (status = 204, description = "No session"),
    ),
    tag = "auth"
)]
pub async fn session(Extension(CurrentSession(session)): Extension<CurrentSession>) -> Response {
    match session {
        Some(session) => Json(session).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/auth/access-token",
    responses(
        (status = 200, description = "Live FastTrak access token", body = AccessToken, content_type = "application/json"),
        (status = 401, description = "No session, or the token could not be refreshed or decrypted"),
    ),
    tag = "auth"
)]
pub async fn access_token(
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Result<Json<AccessToken>, AppError> {
    let token = require_access_token(session.as_ref())?;
    Ok(Json(AccessToken {
        access_token: token.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 204, description = "Session cookie cleared"),
    ),
    tag = "auth"
)]
pub async fn logout(Extension(state): Extension<Arc<AppState>>) -> Result<Response, AppError> {
    let cookie = state.codec().clear_cookie().map_err(anyhow::Error::from)?;
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response())
}
