//! Per-name reader/writer locks

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Table of reader/writer locks keyed by name
///
/// Operations on the same name serialize (readers share, a writer excludes
/// everyone); operations on different names never wait on each other. An
/// entry lives only while some caller holds or waits on its lock.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<RwLock<()>>>,
}

/// Guard returned by [`KeyedLocks::read`]
pub type KeyedReadGuard<'a> = KeyedGuard<'a, OwnedRwLockReadGuard<()>>;
/// Guard returned by [`KeyedLocks::write`]
pub type KeyedWriteGuard<'a> = KeyedGuard<'a, OwnedRwLockWriteGuard<()>>;

/// Holds the lock on one name until dropped
pub struct KeyedGuard<'a, G> {
    // Declared first so the lock is released before the slot prunes.
    _guard: G,
    slot: Slot<'a>,
}

impl<G> fmt::Debug for KeyedGuard<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedGuard")
            .field("name", &self.slot.name)
            .finish_non_exhaustive()
    }
}

/// Marks one caller's interest in a table entry, from lookup until the
/// guard drops or the acquire is abandoned
struct Slot<'a> {
    name: String,
    table: &'a KeyedLocks,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        // The caller's own reference is gone by now, so only the map holds
        // it when nobody else holds or awaits the lock. Clones are taken
        // under the shard lock, so the check cannot race a new caller.
        self.table
            .locks
            .remove_if(&self.name, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl KeyedLocks {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> (Slot<'_>, Arc<RwLock<()>>) {
        let existing = self.locks.get(name).map(|lock| Arc::clone(lock.value()));
        let lock = existing.unwrap_or_else(|| {
            Arc::clone(self.locks.entry(name.to_string()).or_default().value())
        });
        let slot = Slot {
            name: name.to_string(),
            table: self,
        };
        (slot, lock)
    }

    /// Shared access to `name`
    pub async fn read(&self, name: &str) -> KeyedReadGuard<'_> {
        let (slot, lock) = self.slot(name);
        let guard = lock.read_owned().await;
        KeyedGuard { _guard: guard, slot }
    }

    /// Exclusive access to `name`
    pub async fn write(&self, name: &str) -> KeyedWriteGuard<'_> {
        let (slot, lock) = self.slot(name);
        let guard = lock.write_owned().await;
        KeyedGuard { _guard: guard, slot }
    }

    /// Number of names currently held or awaited
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if no lock is held or awaited
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
