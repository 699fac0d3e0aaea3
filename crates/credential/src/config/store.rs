//! Config persistence

use std::sync::Arc;

use super::ConfigEntry;
use crate::core::{EngineError, EngineResult, RequestContext};
use crate::manager::{KeyedLocks, KeyedReadGuard, KeyedWriteGuard};
use crate::storage::{self, CONFIG_PREFIX};
use crate::traits::KvStore;

/// Config records in the host store, keyed `config/{name}`
pub struct ConfigStore {
    kv: Arc<dyn KvStore>,
    locks: KeyedLocks,
}

impl ConfigStore {
    /// Wrap a host store
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            locks: KeyedLocks::new(),
        }
    }

    /// Storage key of config `name`
    pub fn key(name: &str) -> String {
        format!("{CONFIG_PREFIX}{name}")
    }

    /// Shared lock on config `name`
    pub async fn read_lock(&self, name: &str) -> KeyedReadGuard<'_> {
        self.locks.read(name).await
    }

    /// Exclusive lock on config `name`
    pub async fn write_lock(&self, name: &str) -> KeyedWriteGuard<'_> {
        self.locks.write(name).await
    }

    /// Load config `name`, `None` if absent
    pub async fn get(&self, ctx: &RequestContext, name: &str) -> EngineResult<Option<ConfigEntry>> {
        storage::load_json(self.kv.as_ref(), ctx, &Self::key(name)).await
    }

    /// Load config `name` or fail with [`EngineError::NotConfigured`]
    pub async fn require(&self, ctx: &RequestContext, name: &str) -> EngineResult<ConfigEntry> {
        self.get(ctx, name)
            .await?
            .ok_or_else(|| EngineError::NotConfigured {
                name: name.to_string(),
            })
    }

    /// Create or replace a config
    pub async fn save(&self, ctx: &RequestContext, entry: &ConfigEntry) -> EngineResult<()> {
        storage::save_json(self.kv.as_ref(), ctx, &Self::key(&entry.name), entry).await
    }

    /// Remove config `name`
    pub async fn delete(&self, ctx: &RequestContext, name: &str) -> EngineResult<()> {
        storage::delete(self.kv.as_ref(), ctx, &Self::key(name)).await
    }

    /// Names of all configs
    pub async fn list(&self, ctx: &RequestContext) -> EngineResult<Vec<String>> {
        storage::list(self.kv.as_ref(), ctx, CONFIG_PREFIX).await
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore").finish_non_exhaustive()
    }
}
