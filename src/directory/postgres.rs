//! Postgres-backed directory. Schema lives in `db/sql/01_trakgate.sql`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::BTreeSet;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    CreateOutcome, NewManagedUser, UpdateOutcome, UserDirectory, UserRecord, UserStatus,
    UserUpdate, LIST_LIMIT,
};

const RETURNING: &str = r"
    id,
    external_id,
    roles,
    display_name,
    email,
    status::text AS status,
    (EXTRACT(EPOCH FROM last_seen) * 1000)::bigint AS last_seen_ms,
    (EXTRACT(EPOCH FROM created_at) * 1000)::bigint AS created_at_ms
";

/// Directory over a pool created once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn record_from_row(row: &PgRow) -> Result<UserRecord> {
    let roles: Vec<String> = row.try_get("roles")?;
    let status: Option<String> = row.try_get("status")?;

    Ok(UserRecord {
        local_id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        roles: roles.into_iter().collect(),
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        status: status.as_deref().map(str::parse::<UserStatus>).transpose()?,
        last_seen_ms: row.try_get("last_seen_ms")?,
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn upsert(&self, external_id: &str, roles: &BTreeSet<String>) -> Result<UserRecord> {
        // Managed accounts (status set) keep the roles assigned here.
        let query = format!(
            r"
            INSERT INTO users (external_id, roles, last_seen)
            VALUES ($1, $2, NOW())
            ON CONFLICT (external_id) DO UPDATE SET
                roles = CASE WHEN users.status IS NULL THEN EXCLUDED.roles ELSE users.roles END,
                last_seen = NOW()
            RETURNING {RETURNING}
            "
        );
        let roles: Vec<String> = roles.iter().cloned().collect();
        let row = sqlx::query(&query)
            .bind(external_id)
            .bind(&roles)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await
            .context("failed to upsert user")?;

        record_from_row(&row)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {RETURNING} FROM users WHERE external_id = $1");
        let row = sqlx::query(&query)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup user by external id")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_by_id(&self, local_id: Uuid) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {RETURNING} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(local_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup user by id")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        let query =
            format!("SELECT {RETURNING} FROM users ORDER BY created_at DESC LIMIT {LIST_LIMIT}");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to list users")?;

        rows.iter().map(record_from_row).collect()
    }

    async fn create_managed(&self, user: NewManagedUser) -> Result<CreateOutcome> {
        let query = format!(
            r"
            INSERT INTO users (external_id, roles, display_name, email, status)
            VALUES ($1, $2, $3, $4, $5::user_status)
            RETURNING {RETURNING}
            "
        );
        let roles: Vec<String> = user.roles.into_iter().collect();
        let row = sqlx::query(&query)
            .bind(&user.external_id)
            .bind(&roles)
            .bind(user.display_name.as_deref())
            .bind(user.email.as_deref())
            .bind(user.status.as_str())
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await;

        match row {
            Ok(row) => Ok(CreateOutcome::Created(record_from_row(&row)?)),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert managed user"),
        }
    }

    async fn update(&self, local_id: Uuid, update: UserUpdate) -> Result<UpdateOutcome> {
        let mut tx = self.pool.begin().await.context("begin update transaction")?;

        let lookup = "SELECT status::text AS status FROM users WHERE id = $1 FOR UPDATE";
        let current = sqlx::query(lookup)
            .bind(local_id)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", lookup))
            .await
            .context("failed to lock user")?;

        let Some(current) = current else {
            tx.rollback()
                .await
                .context("failed to rollback update transaction")?;
            return Ok(UpdateOutcome::NotFound);
        };

        let status: Option<String> = current.try_get("status")?;
        if update.touches_authority() && status.is_none() {
            tx.rollback()
                .await
                .context("failed to rollback update transaction")?;
            return Ok(UpdateOutcome::NotManaged);
        }

        let query = format!(
            r"
            UPDATE users SET
                roles = COALESCE($2, roles),
                status = COALESCE($3::user_status, status),
                display_name = COALESCE($4, display_name)
            WHERE id = $1
            RETURNING {RETURNING}
            "
        );
        let roles: Option<Vec<String>> = update.roles.map(|roles| roles.into_iter().collect());
        let row = sqlx::query(&query)
            .bind(local_id)
            .bind(roles)
            .bind(update.status.map(UserStatus::as_str))
            .bind(update.display_name)
            .fetch_one(&mut *tx)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to update user")?;

        tx.commit().await.context("commit update transaction")?;

        Ok(UpdateOutcome::Updated(record_from_row(&row)?))
    }
}
