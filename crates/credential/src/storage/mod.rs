//! Storage helpers over the host [`KvStore`]
//!
//! Records are stored as JSON under `config/{name}` and `roles/{name}`.

mod memory;

pub use memory::MemoryKvStore;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::{EngineError, EngineResult, RequestContext};
use crate::traits::KvStore;

/// Key prefix of config records
pub const CONFIG_PREFIX: &str = "config/";

/// Key prefix of role records
pub const ROLE_PREFIX: &str = "roles/";

/// Record names become the last key segment and may not contain `/`
pub fn is_valid_record_name(name: &str) -> bool {
    !name.contains('/')
}

/// Read and decode a JSON record
pub(crate) async fn load_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    ctx: &RequestContext,
    key: &str,
) -> EngineResult<Option<T>> {
    let raw = ctx
        .run(async {
            store
                .get(key)
                .await
                .map_err(|e| EngineError::storage(key, e))
        })
        .await?;

    raw.map(|bytes| {
        serde_json::from_slice(&bytes).map_err(|source| EngineError::Serialization {
            key: key.to_string(),
            source,
        })
    })
    .transpose()
}

/// Encode and write a JSON record
pub(crate) async fn save_json<T: Serialize>(
    store: &dyn KvStore,
    ctx: &RequestContext,
    key: &str,
    value: &T,
) -> EngineResult<()> {
    let bytes = serde_json::to_vec(value).map_err(|source| EngineError::Serialization {
        key: key.to_string(),
        source,
    })?;

    ctx.run(async {
        store
            .put(key, bytes)
            .await
            .map_err(|e| EngineError::storage(key, e))
    })
    .await
}

/// Remove a record
pub(crate) async fn delete(store: &dyn KvStore, ctx: &RequestContext, key: &str) -> EngineResult<()> {
    ctx.run(async {
        store
            .delete(key)
            .await
            .map_err(|e| EngineError::storage(key, e))
    })
    .await
}

/// Names of records under `prefix`
pub(crate) async fn list(
    store: &dyn KvStore,
    ctx: &RequestContext,
    prefix: &str,
) -> EngineResult<Vec<String>> {
    ctx.run(async {
        store
            .list(prefix)
            .await
            .map_err(|e| EngineError::storage(prefix, e))
    })
    .await
}
