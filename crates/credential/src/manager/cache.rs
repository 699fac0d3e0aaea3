//! Provider client cache with hit/miss tracking.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;

use super::KeyedLocks;
use crate::core::EngineResult;
use crate::traits::ProviderClient;

/// Per-config cache of provider clients
///
/// At most one client is built per config name until that name is
/// invalidated. The miss path runs under the name's write lock and re-checks
/// the cache, so concurrent first use builds once. Invalidation takes the
/// same lock and therefore waits for an in-flight build, which would
/// otherwise re-insert a client made from the old config.
pub struct ClientCache {
    /// Underlying moka cache instance
    cache: Cache<String, Arc<dyn ProviderClient>>,

    /// Serializes build and invalidate per config name
    locks: KeyedLocks,

    /// Cache hit counter
    hits: AtomicU64,

    /// Cache miss counter
    misses: AtomicU64,

    max_capacity: usize,
}

impl ClientCache {
    /// Create a cache holding up to `max_capacity` clients
    ///
    /// # Examples
    ///
    /// ```
    /// use gitlab_secrets_credential::manager::ClientCache;
    ///
    /// let cache = ClientCache::new(16);
    /// assert_eq!(cache.stats().hits, 0);
    /// ```
    pub fn new(max_capacity: usize) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity as u64).build(),
            locks: KeyedLocks::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            max_capacity,
        }
    }

    /// Return the cached client for `name`, building it with `build` on a miss
    ///
    /// A failed build caches nothing.
    pub async fn get_or_build<F, Fut>(
        &self,
        name: &str,
        build: F,
    ) -> EngineResult<Arc<dyn ProviderClient>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Arc<dyn ProviderClient>>>,
    {
        if let Some(client) = self.cache.get(name).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(config_name = %name, "provider client cache hit");
            return Ok(client);
        }

        let _guard = self.locks.write(name).await;

        // Another caller may have built it while we waited
        if let Some(client) = self.cache.get(name).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(config_name = %name, "provider client built concurrently");
            return Ok(client);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(config_name = %name, "provider client cache miss");

        let client = build().await?;
        self.cache.insert(name.to_string(), Arc::clone(&client)).await;
        Ok(client)
    }

    /// True if a client for `name` is cached
    pub async fn contains(&self, name: &str) -> bool {
        self.cache.get(name).await.is_some()
    }

    /// Drop the cached client for `name`; a no-op if none is cached
    pub async fn invalidate(&self, name: &str) {
        let _guard = self.locks.write(name).await;
        self.cache.invalidate(name).await;
        tracing::debug!(config_name = %name, "provider client invalidated");
    }

    /// Get cache performance statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.cache.entry_count(),
            max_capacity: self.max_capacity,
        }
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Cache performance statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,

    /// Lookups that built a client
    pub misses: u64,

    /// Current number of cached clients (eventually consistent)
    pub size: u64,

    /// Maximum cache capacity
    pub max_capacity: usize,
}

impl CacheStats {
    /// Hit rate in `0.0..=1.0`, `0.0` before any lookup
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
