//! Shared engine state: the provider client cache and per-name locks.

mod cache;
mod lock;

pub use cache::{CacheStats, ClientCache};
pub use lock::{KeyedGuard, KeyedLocks, KeyedReadGuard, KeyedWriteGuard};
