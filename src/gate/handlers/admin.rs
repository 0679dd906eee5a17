use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Path,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    directory::{CreateOutcome, NewManagedUser, UpdateOutcome, UserRecord, UserStatus, UserUpdate},
    error::AppError,
    fasttrak::Registration,
    gate::{handlers::valid_email, middleware::CurrentSession, state::AppState},
    guard::{require_role, ADMIN_ROLE},
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[schema(value_type = String)]
    id: Uuid,
    external_id: String,
    roles: Vec<String>,
    display_name: Option<String>,
    email: Option<String>,
    /// Present only for accounts created through the admin API.
    status: Option<UserStatus>,
    last_seen_at: i64,
    created_at: i64,
}

impl From<UserRecord> for UserView {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.local_id,
            external_id: record.external_id,
            roles: record.roles.into_iter().collect(),
            display_name: record.display_name,
            email: record.email,
            status: record.status,
            last_seen_at: record.last_seen_ms,
            created_at: record.created_at_ms,
        }
    }
}

#[derive(ToSchema, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    username: String,
    #[schema(format = Password)]
    password: String,
    email: String,
    display_name: String,
    #[serde(default)]
    roles: Vec<String>,
    status: Option<UserStatus>,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatchUser {
    roles: Option<Vec<String>>,
    status: Option<UserStatus>,
    display_name: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "Known users", body = [UserView], content_type = "application/json"),
        (status = 401, description = "No session"),
        (status = 403, description = "Admin role required"),
    ),
    tag = "admin"
)]
pub async fn list_users(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Result<Json<Vec<UserView>>, AppError> {
    require_role(session.as_ref(), ADMIN_ROLE)?;

    let users = state.directory().list().await?;

    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/admin/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "Account registered at FastTrak and recorded", body = UserView, content_type = "application/json"),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "No session"),
        (status = 403, description = "Admin role required"),
        (status = 409, description = "Account already exists"),
        (status = 502, description = "Identity provider failure"),
    ),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn create_user(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    payload: Result<Json<CreateUser>, JsonRejection>,
) -> Result<Response, AppError> {
    let admin = require_role(session.as_ref(), ADMIN_ROLE)?;
    let Json(user) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let password = SecretString::from(user.password);
    if user.username.trim().is_empty() || password.expose_secret().is_empty() {
        return Err(AppError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    if !valid_email(&user.email) {
        return Err(AppError::BadRequest("invalid email".to_string()));
    }

    let registration = Registration {
        username: user.username.trim().to_string(),
        password,
        email: user.email.clone(),
        display_name: user.display_name.clone(),
    };
    let external_id = state.provider().register(&registration).await?;

    let outcome = state
        .directory()
        .create_managed(NewManagedUser {
            external_id,
            roles: user.roles.into_iter().collect::<BTreeSet<_>>(),
            display_name: Some(user.display_name),
            email: Some(user.email),
            status: user.status.unwrap_or(UserStatus::Active),
        })
        .await?;

    match outcome {
        CreateOutcome::Created(record) => {
            info!(
                admin = %admin.external_id,
                local_user_id = %record.local_id,
                "managed account created"
            );
            Ok((StatusCode::CREATED, Json(UserView::from(record))).into_response())
        }
        CreateOutcome::Conflict => Err(AppError::Conflict("user already exists".to_string())),
    }
}

#[utoipa::path(
    patch,
    path = "/api/admin/users/{id}",
    params(
        ("id" = String, Path, description = "Local user id")
    ),
    request_body = PatchUser,
    responses(
        (status = 200, description = "Updated user", body = UserView, content_type = "application/json"),
        (status = 400, description = "Invalid id or payload"),
        (status = 401, description = "No session"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Unknown user"),
        (status = 409, description = "Roles and status of this account come from FastTrak"),
    ),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn update_user(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<PatchUser>, JsonRejection>,
) -> Result<Json<UserView>, AppError> {
    let admin = require_role(session.as_ref(), ADMIN_ROLE)?;
    let Path(id) = id.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let Json(patch) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let update = UserUpdate {
        roles: patch.roles.map(|roles| roles.into_iter().collect()),
        status: patch.status,
        display_name: patch.display_name,
    };
    if update.is_empty() {
        return Err(AppError::BadRequest("nothing to update".to_string()));
    }

    match state.directory().update(id, update).await? {
        UpdateOutcome::Updated(record) => {
            info!(admin = %admin.external_id, local_user_id = %id, "user updated");
            Ok(Json(UserView::from(record)))
        }
        UpdateOutcome::NotManaged => Err(AppError::Conflict(
            "roles and status of this account are managed by FastTrak".to_string(),
        )),
        UpdateOutcome::NotFound => Err(AppError::NotFound),
    }
}
