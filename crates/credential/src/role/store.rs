//! Role persistence

use std::sync::Arc;

use super::Role;
use crate::core::{EngineError, EngineResult, RequestContext};
use crate::manager::{KeyedLocks, KeyedReadGuard, KeyedWriteGuard};
use crate::storage::{self, ROLE_PREFIX};
use crate::traits::KvStore;

/// Role records in the host store, keyed `roles/{role_name}`
pub struct RoleStore {
    kv: Arc<dyn KvStore>,
    locks: KeyedLocks,
}

impl RoleStore {
    /// Wrap a host store
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            locks: KeyedLocks::new(),
        }
    }

    /// Storage key of role `name`
    pub fn key(name: &str) -> String {
        format!("{ROLE_PREFIX}{name}")
    }

    /// Shared lock on role `name`
    pub async fn read_lock(&self, name: &str) -> KeyedReadGuard<'_> {
        self.locks.read(name).await
    }

    /// Exclusive lock on role `name`
    pub async fn write_lock(&self, name: &str) -> KeyedWriteGuard<'_> {
        self.locks.write(name).await
    }

    /// Load role `name`, `None` if absent
    pub async fn get(&self, ctx: &RequestContext, name: &str) -> EngineResult<Option<Role>> {
        storage::load_json(self.kv.as_ref(), ctx, &Self::key(name)).await
    }

    /// Load role `name` or fail with [`EngineError::RoleNotFound`]
    pub async fn require(&self, ctx: &RequestContext, name: &str) -> EngineResult<Role> {
        self.get(ctx, name)
            .await?
            .ok_or_else(|| EngineError::RoleNotFound {
                name: name.to_string(),
            })
    }

    /// Create or replace a role
    pub async fn save(&self, ctx: &RequestContext, role: &Role) -> EngineResult<()> {
        storage::save_json(self.kv.as_ref(), ctx, &Self::key(&role.role_name), role).await
    }

    /// Remove role `name`
    pub async fn delete(&self, ctx: &RequestContext, name: &str) -> EngineResult<()> {
        storage::delete(self.kv.as_ref(), ctx, &Self::key(name)).await
    }

    /// Names of all roles
    pub async fn list(&self, ctx: &RequestContext) -> EngineResult<Vec<String>> {
        storage::list(self.kv.as_ref(), ctx, ROLE_PREFIX).await
    }
}

impl std::fmt::Debug for RoleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleStore").finish_non_exhaustive()
    }
}
