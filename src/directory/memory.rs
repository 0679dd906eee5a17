//! In-process directory for local development and tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CreateOutcome, NewManagedUser, UpdateOutcome, UserDirectory, UserRecord, UserUpdate,
    LIST_LIMIT,
};

#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: Mutex<HashMap<Uuid, UserRecord>>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn upsert(&self, external_id: &str, roles: &BTreeSet<String>) -> Result<UserRecord> {
        let now = crate::unix_millis();
        let mut users = self.users.lock().await;

        if let Some(record) = users
            .values_mut()
            .find(|record| record.external_id == external_id)
        {
            if !record.is_managed() {
                record.roles.clone_from(roles);
            }
            record.last_seen_ms = now;
            return Ok(record.clone());
        }

        let record = UserRecord {
            local_id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            roles: roles.clone(),
            display_name: None,
            email: None,
            status: None,
            last_seen_ms: now,
            created_at_ms: now,
        };
        users.insert(record.local_id, record.clone());

        Ok(record)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<UserRecord>> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|record| record.external_id == external_id)
            .cloned())
    }

    async fn find_by_id(&self, local_id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.users.lock().await.get(&local_id).cloned())
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        let mut list: Vec<UserRecord> = self.users.lock().await.values().cloned().collect();
        list.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        list.truncate(LIST_LIMIT);
        Ok(list)
    }

    async fn create_managed(&self, user: NewManagedUser) -> Result<CreateOutcome> {
        let now = crate::unix_millis();
        let mut users = self.users.lock().await;

        if users
            .values()
            .any(|record| record.external_id == user.external_id)
        {
            return Ok(CreateOutcome::Conflict);
        }

        let record = UserRecord {
            local_id: Uuid::new_v4(),
            external_id: user.external_id,
            roles: user.roles,
            display_name: user.display_name,
            email: user.email,
            status: Some(user.status),
            last_seen_ms: now,
            created_at_ms: now,
        };
        users.insert(record.local_id, record.clone());

        Ok(CreateOutcome::Created(record))
    }

    async fn update(&self, local_id: Uuid, update: UserUpdate) -> Result<UpdateOutcome> {
        let mut users = self.users.lock().await;
        let Some(record) = users.get_mut(&local_id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if update.touches_authority() && !record.is_managed() {
            return Ok(UpdateOutcome::NotManaged);
        }

        if let Some(roles) = update.roles {
            record.roles = roles;
        }
        if let Some(status) = update.status {
            record.status = Some(status);
        }
        if let Some(display_name) = update.display_name {
            record.display_name = Some(display_name);
        }

        Ok(UpdateOutcome::Updated(record.clone()))
    }
}
