// libs/appointment-cell/src/services/directory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::auth::{User, UserRole};

use crate::services::store::StoreError;

/// Lookup of clinic users, used to validate the doctor and patient of a new
/// booking and to resolve names for listings.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// True when the user exists, is active and holds `role`.
    async fn exists(&self, user_id: Uuid, role: UserRole) -> Result<bool, StoreError> {
        Ok(self
            .find_user(user_id)
            .await?
            .is_some_and(|user| user.has_role(role)))
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id, u)).collect()),
        }
    }

    pub async fn add(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }
}
