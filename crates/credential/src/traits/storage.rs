//! Host key/value store

use async_trait::async_trait;

use crate::core::StorageError;

/// Durable key/value store provided by the host
///
/// Values are opaque bytes. There are no cross-key transactions; callers
/// serialize writes to the same key themselves.
///
/// # Example
///
/// ```rust,ignore
/// use gitlab_secrets_credential::traits::KvStore;
///
/// store.put("roles/ci", bytes).await?;
/// let names = store.list("roles/").await?;
/// ```
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value, `None` if absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Create or replace a value
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Remove a value; removing an absent key succeeds
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Keys under `prefix`, with the prefix stripped, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
