//! Engine façade
//!
//! [`Engine`] is what the host plugs into its request router: config and
//! role CRUD, token issuance and revocation, rotation, the periodic hook and
//! storage invalidation. All state lives behind one `Arc`, so the engine is
//! cheap to clone into concurrently running request handlers.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::{ConfigEntry, ConfigStore, ConfigView, PatchConfigRequest, WriteConfigRequest};
use crate::core::{EngineError, EngineResult, RequestContext};
use crate::events::{EventEmitter, EventType};
use crate::issuance::{IssuedCredential, TokenIssuer};
use crate::manager::{CacheStats, ClientCache};
use crate::revocation::{RevocationDispatcher, RevocationRecord, RevokeOutcome};
use crate::role::{Role, RoleLimits, RoleRequest, RoleStore, RoleWriteOutcome, validate_role};
use crate::rotation::{PeriodicReport, RotationOutcome, RotationScheduler};
use crate::storage::CONFIG_PREFIX;
use crate::traits::{EventSink, KvStore, NoopEventSink, ProviderClient, ProviderClientFactory};
use crate::utils::{MAX_TTL, MIN_TTL};

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest TTL a role may request, never above the provider's cap
    #[serde(with = "humantime_serde")]
    pub max_ttl: Duration,

    /// Config used by roles that name none
    pub default_config_name: String,

    /// `revoke_auto_rotated_token` of configs written without one
    pub revoke_auto_rotated_token_default: bool,

    /// Maximum number of cached provider clients
    pub client_cache_capacity: usize,

    /// Deadline applied to requests whose context carries none
    #[serde(with = "humantime_serde::option")]
    pub request_timeout: Option<Duration>,

    /// Configs evaluated in parallel by the periodic hook
    pub periodic_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ttl: MAX_TTL,
            default_config_name: "default".to_string(),
            revoke_auto_rotated_token_default: false,
            client_cache_capacity: 1024,
            request_timeout: None,
            periodic_concurrency: 4,
        }
    }
}

impl EngineConfig {
    /// Check the settings are usable
    pub fn validate(&self) -> EngineResult<()> {
        if self.client_cache_capacity == 0 {
            return Err(EngineError::InvalidValue {
                field: "client_cache_capacity".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(MIN_TTL..=MAX_TTL).contains(&self.max_ttl) {
            return Err(EngineError::InvalidValue {
                field: "max_ttl".to_string(),
                reason: format!(
                    "{} is outside the allowed range of 24h to 365d",
                    humantime_serde::re::humantime::format_duration(self.max_ttl)
                ),
            });
        }
        if self.default_config_name.trim().is_empty() {
            return Err(EngineError::FieldRequired {
                field: "default_config_name".to_string(),
            });
        }
        Ok(())
    }

    fn role_limits(&self) -> RoleLimits {
        RoleLimits {
            max_ttl: self.max_ttl,
            default_config_name: self.default_config_name.clone(),
        }
    }
}

/// Lease handed back to the host after issuance
#[derive(Debug, Clone)]
pub struct IssuedLease {
    /// Returned to the caller, includes the token value
    pub public_data: Value,
    /// Kept by the host and passed back on revoke
    pub internal_data: Value,
    /// Lease TTL
    pub ttl: Duration,
    /// Lease max TTL, equal to `ttl`
    pub max_ttl: Duration,
}

/// Shared engine state
pub(crate) struct EngineState {
    pub(crate) settings: EngineConfig,
    pub(crate) configs: ConfigStore,
    pub(crate) roles: RoleStore,
    pub(crate) clients: ClientCache,
    pub(crate) factory: Arc<dyn ProviderClientFactory>,
    pub(crate) events: EventEmitter,
}

impl EngineState {
    /// Cached provider client of config `name`
    ///
    /// The miss path reads the config without taking its lock so callers
    /// already holding the config's write lock can use it.
    pub(crate) async fn client_for(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> EngineResult<Arc<dyn ProviderClient>> {
        self.clients
            .get_or_build(name, || async {
                let entry = self.configs.require(ctx, name).await?;
                self.factory
                    .build(&entry)
                    .map_err(|e| EngineError::provider("build_client", e))
            })
            .await
    }

    /// Build a throwaway client for `entry` and record what the provider
    /// reports about its token
    async fn discover(&self, ctx: &RequestContext, entry: &mut ConfigEntry) -> EngineResult<()> {
        let client = self
            .factory
            .build(entry)
            .map_err(|e| EngineError::provider("build_client", e))?;
        let info = ctx
            .call_provider("current_token_info", client.current_token_info())
            .await?;
        let metadata = ctx.call_provider("metadata", client.metadata()).await?;
        entry.apply_discovery(&info, &metadata);
        Ok(())
    }
}

/// Credential lifecycle engine
#[derive(Clone)]
pub struct Engine {
    state: Arc<EngineState>,
}

impl Engine {
    /// Start building an engine
    pub fn builder() -> EngineBuilder<No, No> {
        EngineBuilder::new()
    }

    /// Settings the engine runs with
    pub fn settings(&self) -> &EngineConfig {
        &self.state.settings
    }

    fn scoped(&self, ctx: &RequestContext) -> RequestContext {
        ctx.or_deadline(self.state.settings.request_timeout)
    }

    // ── Configs ────────────────────────────────────────────────────────────

    /// Create or replace config `name`
    ///
    /// The token is checked against the provider before anything is stored.
    pub async fn write_config(
        &self,
        ctx: &RequestContext,
        name: &str,
        request: WriteConfigRequest,
    ) -> EngineResult<ConfigView> {
        let ctx = &self.scoped(ctx);
        let mut entry = ConfigEntry::from_write(
            name,
            request,
            self.state.settings.revoke_auto_rotated_token_default,
        )?;

        let _guard = self.state.configs.write_lock(name).await;
        self.state.discover(ctx, &mut entry).await?;
        self.state.configs.save(ctx, &entry).await?;
        self.state.clients.invalidate(name).await;

        info!(config_name = name, token_id = entry.token_id, "wrote config");
        self.state
            .events
            .emit(
                EventType::ConfigWrite,
                [
                    ("config_name", name.to_string()),
                    ("token_id", entry.token_id.to_string()),
                ],
            )
            .await;
        Ok(entry.view())
    }

    /// Update some fields of config `name`
    pub async fn patch_config(
        &self,
        ctx: &RequestContext,
        name: &str,
        patch: PatchConfigRequest,
    ) -> EngineResult<ConfigView> {
        let ctx = &self.scoped(ctx);
        let _guard = self.state.configs.write_lock(name).await;

        let current = self.state.configs.require(ctx, name).await?;
        let (mut entry, credentials_changed) = current.patched(patch)?;
        if credentials_changed {
            self.state.discover(ctx, &mut entry).await?;
        }
        self.state.configs.save(ctx, &entry).await?;
        self.state.clients.invalidate(name).await;

        info!(config_name = name, credentials_changed, "patched config");
        self.state
            .events
            .emit(EventType::ConfigPatch, [("config_name", name)])
            .await;
        Ok(entry.view())
    }

    /// Redacted view of config `name`
    pub async fn read_config(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> EngineResult<Option<ConfigView>> {
        let ctx = &self.scoped(ctx);
        let _guard = self.state.configs.read_lock(name).await;
        Ok(self
            .state
            .configs
            .get(ctx, name)
            .await?
            .map(|entry| entry.view()))
    }

    /// Remove config `name`
    pub async fn delete_config(&self, ctx: &RequestContext, name: &str) -> EngineResult<()> {
        let ctx = &self.scoped(ctx);
        let _guard = self.state.configs.write_lock(name).await;
        self.state.configs.delete(ctx, name).await?;
        self.state.clients.invalidate(name).await;

        info!(config_name = name, "deleted config");
        self.state
            .events
            .emit(EventType::ConfigDelete, [("config_name", name)])
            .await;
        Ok(())
    }

    /// Names of all configs
    pub async fn list_configs(&self, ctx: &RequestContext) -> EngineResult<Vec<String>> {
        self.state.configs.list(&self.scoped(ctx)).await
    }

    /// Replace config `name`'s privileged token now
    pub async fn rotate_config_token(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> EngineResult<RotationOutcome> {
        self.scheduler()
            .rotate(&self.scoped(ctx), name, Utc::now())
            .await
    }

    // ── Roles ──────────────────────────────────────────────────────────────

    /// Validate and store a role
    ///
    /// Nothing is written unless every field is valid.
    pub async fn write_role(
        &self,
        ctx: &RequestContext,
        request: RoleRequest,
    ) -> EngineResult<RoleWriteOutcome> {
        let ctx = &self.scoped(ctx);
        let (role, warnings) = validate_role(&request, &self.state.settings.role_limits())?;

        let _guard = self.state.roles.write_lock(&role.role_name).await;
        self.state.roles.save(ctx, &role).await?;

        info!(
            role_name = %role.role_name,
            token_type = %role.token_type,
            warnings = warnings.len(),
            "wrote role"
        );
        self.state
            .events
            .emit(
                EventType::RoleWrite,
                [
                    ("role_name", role.role_name.clone()),
                    ("token_type", role.token_type.to_string()),
                ],
            )
            .await;
        Ok(RoleWriteOutcome { role, warnings })
    }

    /// Role `name`, `None` if absent
    pub async fn read_role(&self, ctx: &RequestContext, name: &str) -> EngineResult<Option<Role>> {
        let ctx = &self.scoped(ctx);
        let _guard = self.state.roles.read_lock(name).await;
        self.state.roles.get(ctx, name).await
    }

    /// Remove role `name`; absent roles are ignored
    pub async fn delete_role(&self, ctx: &RequestContext, name: &str) -> EngineResult<()> {
        let ctx = &self.scoped(ctx);
        let _guard = self.state.roles.write_lock(name).await;
        self.state.roles.delete(ctx, name).await?;

        info!(role_name = name, "deleted role");
        self.state
            .events
            .emit(EventType::RoleDelete, [("role_name", name)])
            .await;
        Ok(())
    }

    /// Names of all roles
    pub async fn list_roles(&self, ctx: &RequestContext) -> EngineResult<Vec<String>> {
        self.state.roles.list(&self.scoped(ctx)).await
    }

    // ── Tokens ─────────────────────────────────────────────────────────────

    /// Mint a token for role `role_name`
    pub async fn issue_token(
        &self,
        ctx: &RequestContext,
        role_name: &str,
    ) -> EngineResult<IssuedLease> {
        let ctx = &self.scoped(ctx);
        let role = {
            let _guard = self.state.roles.read_lock(role_name).await;
            self.state.roles.require(ctx, role_name).await?
        };

        let IssuedCredential {
            credential,
            lease_ttl,
        } = TokenIssuer::new(&self.state).issue(ctx, &role).await?;

        let internal_data = credential.revocation_record().to_internal_data()?;
        self.state
            .events
            .emit(
                EventType::TokenIssue,
                [
                    ("role_name", role.role_name.clone()),
                    ("config_name", role.config_name.clone()),
                    ("token_type", role.token_type.to_string()),
                    ("token_id", credential.token_id.to_string()),
                ],
            )
            .await;

        Ok(IssuedLease {
            public_data: credential.public_data(),
            internal_data,
            ttl: lease_ttl,
            max_ttl: lease_ttl,
        })
    }

    /// Revoke the token behind a lease's internal data
    ///
    /// Tokens the provider no longer knows count as revoked.
    pub async fn revoke_token(
        &self,
        ctx: &RequestContext,
        internal_data: &Value,
    ) -> EngineResult<RevokeOutcome> {
        let ctx = &self.scoped(ctx);
        let record = RevocationRecord::from_internal_data(internal_data)?;
        let outcome = RevocationDispatcher::new(&self.state)
            .revoke(ctx, &record)
            .await?;

        info!(
            token_id = record.token_id,
            token_type = %record.token_type,
            ?outcome,
            "revoked token"
        );
        self.state
            .events
            .emit(
                EventType::TokenRevoke,
                [
                    ("role_name", record.role_name.clone()),
                    ("config_name", record.config_name.clone()),
                    ("token_type", record.token_type.to_string()),
                    ("token_id", record.token_id.to_string()),
                ],
            )
            .await;
        Ok(outcome)
    }

    // ── Host hooks ─────────────────────────────────────────────────────────

    /// Periodic hook: rotate every config inside its rotation window
    ///
    /// Fails with [`EngineError::Rotation`] when at least one config failed;
    /// the others are still rotated and the error carries the full report.
    pub async fn periodic(&self, ctx: &RequestContext) -> EngineResult<PeriodicReport> {
        self.scheduler()
            .run_periodic(&self.scoped(ctx), Utc::now())
            .await?
            .into_result()
    }

    /// Storage invalidation hook
    ///
    /// Keys under `config/` drop that config's cached client; other keys are
    /// ignored.
    pub async fn invalidate(&self, storage_key: &str) {
        if let Some(name) = storage_key.strip_prefix(CONFIG_PREFIX)
            && !name.is_empty()
        {
            self.state.clients.invalidate(name).await;
        }
    }

    /// Provider client cache counters
    pub fn client_cache_stats(&self) -> CacheStats {
        self.state.clients.stats()
    }

    /// Rotation driver for callers that need an explicit clock
    pub fn scheduler(&self) -> RotationScheduler<'_> {
        RotationScheduler::new(&self.state)
    }

    /// Issuance driver for callers that need an explicit clock
    pub fn issuer(&self) -> TokenIssuer<'_> {
        TokenIssuer::new(&self.state)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.state.settings)
            .field("clients", &self.state.clients)
            .finish_non_exhaustive()
    }
}

/// Typestate marker: the component has been set
pub struct Yes;
/// Typestate marker: the component has not been set yet
pub struct No;

/// Builder for [`Engine`]
///
/// Storage and the client factory are required at compile time; `build` is
/// only available once both are set.
///
/// ```
/// use gitlab_secrets_credential::{Engine, EngineConfig};
/// use gitlab_secrets_credential::storage::MemoryKvStore;
/// use gitlab_secrets_credential::testing::InMemoryClientFactory;
/// use std::sync::Arc;
///
/// let engine = Engine::builder()
///     .storage(Arc::new(MemoryKvStore::new()))
///     .client_factory(Arc::new(InMemoryClientFactory::default()))
///     .config(EngineConfig::default())
///     .build()
///     .unwrap();
/// assert_eq!(engine.settings().default_config_name, "default");
/// ```
pub struct EngineBuilder<HasStorage, HasFactory> {
    storage: Option<Arc<dyn KvStore>>,
    factory: Option<Arc<dyn ProviderClientFactory>>,
    events: Option<Arc<dyn EventSink>>,
    config: EngineConfig,
    _marker: PhantomData<(HasStorage, HasFactory)>,
}

impl EngineBuilder<No, No> {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            storage: None,
            factory: None,
            events: None,
            config: EngineConfig::default(),
            _marker: PhantomData,
        }
    }
}

impl Default for EngineBuilder<No, No> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> EngineBuilder<No, F> {
    /// Set the host store (required)
    pub fn storage(self, storage: Arc<dyn KvStore>) -> EngineBuilder<Yes, F> {
        EngineBuilder {
            storage: Some(storage),
            factory: self.factory,
            events: self.events,
            config: self.config,
            _marker: PhantomData,
        }
    }
}

impl<S> EngineBuilder<S, No> {
    /// Set the provider client factory (required)
    pub fn client_factory(self, factory: Arc<dyn ProviderClientFactory>) -> EngineBuilder<S, Yes> {
        EngineBuilder {
            storage: self.storage,
            factory: Some(factory),
            events: self.events,
            config: self.config,
            _marker: PhantomData,
        }
    }
}

impl<S, F> EngineBuilder<S, F> {
    /// Set the event sink (optional, defaults to dropping events)
    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Set engine settings (optional)
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}

impl EngineBuilder<Yes, Yes> {
    /// Validate the settings and build the engine
    pub fn build(self) -> EngineResult<Engine> {
        self.config.validate()?;

        let storage = self.storage.ok_or_else(|| EngineError::NilValue {
            what: "storage".to_string(),
        })?;
        let factory = self.factory.ok_or_else(|| EngineError::NilValue {
            what: "client factory".to_string(),
        })?;
        let sink = self
            .events
            .unwrap_or_else(|| Arc::new(NoopEventSink) as Arc<dyn EventSink>);

        let state = EngineState {
            configs: ConfigStore::new(Arc::clone(&storage)),
            roles: RoleStore::new(storage),
            clients: ClientCache::new(self.config.client_cache_capacity),
            factory,
            events: EventEmitter::new(sink),
            settings: self.config,
        };
        Ok(Engine {
            state: Arc::new(state),
        })
    }
}
