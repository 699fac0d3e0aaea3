//! GitLab Secrets Credential - short-lived GitLab token lifecycle engine
//!
//! Issues, tracks, rotates and revokes GitLab access tokens on behalf of many
//! tenant configs and many roles.
//!
//! # Features
//!
//! - **Type matrix** - scope, access level and path rules per token type,
//!   checked before any provider call
//! - **Day-aligned TTLs** - deterministic expiry computation within the
//!   provider's 365 day cap
//! - **Client cache** - one provider client per config, rebuilt after every
//!   credential change
//! - **Ownership tracking** - each token is expired either by the engine's
//!   lease or by the provider, and revocation follows suit
//! - **Self-rotation** - periodic rotation of each config's privileged token
//!
//! # Example
//!
//! ```
//! use gitlab_secrets_credential::prelude::*;
//! use gitlab_secrets_credential::storage::MemoryKvStore;
//! use gitlab_secrets_credential::testing::{InMemoryClientFactory, InMemoryGitlab};
//! use chrono::{TimeDelta, Utc};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), EngineError> {
//! let now = Utc::now();
//! let gitlab = InMemoryGitlab::new()
//!     .with_current_token(1, 1, now, Some(now + TimeDelta::days(30)))
//!     .with_project("group/app", 42);
//!
//! let engine = Engine::builder()
//!     .storage(Arc::new(MemoryKvStore::new()))
//!     .client_factory(Arc::new(InMemoryClientFactory::new(Arc::new(gitlab))))
//!     .build()?;
//! let ctx = RequestContext::new();
//!
//! engine
//!     .write_config(&ctx, "default", WriteConfigRequest {
//!         base_url: "https://gitlab.example.com".into(),
//!         token: SecretString::new("glpat-root"),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! engine
//!     .write_role(&ctx, RoleRequest {
//!         role_name: "ci".into(),
//!         path: "group/app".into(),
//!         name: "ci-{{ randHexString 4 }}".into(),
//!         token_type: "project".into(),
//!         access_level: "developer".into(),
//!         scopes: vec!["read_api".into()],
//!         ttl: Some(std::time::Duration::from_secs(3600)),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! let lease = engine.issue_token(&ctx, "ci").await?;
//! assert_eq!(lease.ttl, std::time::Duration::from_secs(3600));
//! engine.revoke_token(&ctx, &lease.internal_data).await?;
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

/// Tenant configs
pub mod config;
/// Core types, errors, and request context
pub mod core;
/// Engine façade and builder
pub mod engine;
/// Lifecycle events
pub mod events;
/// Token issuance
pub mod issuance;
/// Provider client cache and per-name locks
pub mod manager;
/// Token revocation
pub mod revocation;
/// Roles and role validation
pub mod role;
/// Self-rotation of config tokens
pub mod rotation;
/// Host store helpers and the in-memory store
pub mod storage;
/// Token name templates
pub mod template;
/// In-memory provider, client factory and event sink
pub mod testing;
/// Host and provider collaborator traits
pub mod traits;
/// Type matrix
pub mod types;
/// Secrets and TTL computation
pub mod utils;

// ── Root re-exports ─────────────────────────────────────────────────────────
// Commonly-used types available directly as `gitlab_secrets_credential::TypeName`.

pub use crate::config::{ConfigView, PatchConfigRequest, WriteConfigRequest};
pub use crate::core::{
    EngineError, EngineResult, FieldError, FieldErrorKind, ProviderError, RequestContext,
    SecretString, StorageError, ValidationErrors,
};
pub use crate::engine::{Engine, EngineBuilder, EngineConfig, IssuedLease};
pub use crate::revocation::RevokeOutcome;
pub use crate::role::{Role, RoleRequest, RoleWriteOutcome};
pub use crate::rotation::{PeriodicOutcome, PeriodicReport, RotationOutcome};
pub use crate::traits::{EventSink, KvStore, ProviderClient, ProviderClientFactory};
pub use crate::types::{AccessLevel, GitlabType, Scope, TokenType};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::config::{ConfigView, PatchConfigRequest, WriteConfigRequest};
    pub use crate::core::{EngineError, EngineResult, RequestContext, SecretString};
    pub use crate::engine::{Engine, EngineConfig, IssuedLease};
    pub use crate::revocation::RevokeOutcome;
    pub use crate::role::{Role, RoleRequest, RoleWriteOutcome};
    pub use crate::rotation::{PeriodicOutcome, PeriodicReport, RotationOutcome};
    pub use crate::traits::{EventSink, KvStore, ProviderClient, ProviderClientFactory};
    pub use crate::types::{AccessLevel, Scope, TokenType};
}
