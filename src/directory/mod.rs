//! Local user records keyed by FastTrak identity.
//!
//! The directory caches provider-issued roles: every sign-in overwrites them.
//! Accounts created through the admin registration path are *managed*: they
//! carry a status and this application owns their roles, so sign-ins only
//! bump `last_seen` for them.

mod memory;
mod postgres;

pub use memory::MemoryUserDirectory;
pub use postgres::PgUserDirectory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
}

impl UserStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            other => Err(anyhow::anyhow!("unknown user status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub local_id: Uuid,
    pub external_id: String,
    pub roles: BTreeSet<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Only set on managed accounts.
    pub status: Option<UserStatus>,
    pub last_seen_ms: i64,
    pub created_at_ms: i64,
}

impl UserRecord {
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.status.is_some()
    }

    /// Whether the account may sign in. Unmanaged accounts defer to FastTrak.
    #[must_use]
    pub fn can_sign_in(&self) -> bool {
        matches!(self.status, None | Some(UserStatus::Active))
    }
}

#[derive(Debug, Clone)]
pub struct NewManagedUser {
    pub external_id: String,
    pub roles: BTreeSet<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub status: UserStatus,
}

/// Fields an admin may change. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub roles: Option<BTreeSet<String>>,
    pub status: Option<UserStatus>,
    pub display_name: Option<String>,
}

impl UserUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_none() && self.status.is_none() && self.display_name.is_none()
    }

    fn touches_authority(&self) -> bool {
        self.roles.is_some() || self.status.is_some()
    }
}

#[derive(Debug)]
pub enum CreateOutcome {
    Created(UserRecord),
    Conflict,
}

#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(UserRecord),
    /// Roles and status belong to FastTrak for this account.
    NotManaged,
    NotFound,
}

/// Most records `UserDirectory::list` returns.
pub const LIST_LIMIT: usize = 500;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Record a sign-in. Idempotent on `external_id`.
    async fn upsert(&self, external_id: &str, roles: &BTreeSet<String>) -> Result<UserRecord>;

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, local_id: Uuid) -> Result<Option<UserRecord>>;

    /// Newest first, capped at [`LIST_LIMIT`].
    async fn list(&self) -> Result<Vec<UserRecord>>;

    async fn create_managed(&self, user: NewManagedUser) -> Result<CreateOutcome>;

    async fn update(&self, local_id: Uuid, update: UserUpdate) -> Result<UpdateOutcome>;
}
