//! Rotation scheduler
//!
//! Runs once per known config on every periodic host invocation. A config
//! that is not yet inside its rotation window costs one storage read and no
//! provider calls. A due config is rotated under its exclusive lock so a
//! concurrent config write or manual rotation cannot interleave with it.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use regex::Regex;
use tracing::{debug, error, info, warn};

use super::{PeriodicOutcome, PeriodicReport, RotationDecision, RotationOutcome, evaluate};
use crate::core::{EngineError, EngineResult, ProviderError, RequestContext};
use crate::engine::EngineState;
use crate::events::EventType;
use crate::traits::RotateTokenRequest;
use crate::utils::{MAX_TTL, compute_ttl};

static ROTATED_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-rotated-\d{14}$").expect("rotated suffix pattern compiles"));

/// Name of the replacement token: `base` with a fresh `-rotated-<timestamp>` suffix
pub fn rotated_name(base: &str, now: DateTime<Utc>) -> String {
    let stem = ROTATED_SUFFIX.replace(base, "");
    format!("{stem}-rotated-{}", now.format("%Y%m%d%H%M%S"))
}

/// Drives self-rotation of config tokens
pub struct RotationScheduler<'a> {
    state: &'a EngineState,
}

impl<'a> RotationScheduler<'a> {
    pub(crate) fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Rotate config `name` if it is inside its rotation window
    ///
    /// Returns `None` when nothing was done.
    pub async fn maybe_rotate(
        &self,
        ctx: &RequestContext,
        name: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<RotationOutcome>> {
        let entry = self.state.configs.require(ctx, name).await?;

        match evaluate(&entry, now) {
            RotationDecision::Due => self.rotate_locked(ctx, name, now, true).await,
            decision => {
                debug!(config_name = name, ?decision, "rotation not due");
                Ok(None)
            }
        }
    }

    /// Rotate config `name` regardless of its window
    pub async fn rotate(
        &self,
        ctx: &RequestContext,
        name: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<RotationOutcome> {
        self.rotate_locked(ctx, name, now, false)
            .await?
            .ok_or_else(|| EngineError::NotConfigured {
                name: name.to_string(),
            })
    }

    async fn rotate_locked(
        &self,
        ctx: &RequestContext,
        name: &str,
        now: DateTime<Utc>,
        only_if_due: bool,
    ) -> EngineResult<Option<RotationOutcome>> {
        let _guard = self.state.configs.write_lock(name).await;

        // Someone may have rotated while we waited for the lock
        let mut entry = self.state.configs.require(ctx, name).await?;
        if only_if_due && evaluate(&entry, now) != RotationDecision::Due {
            debug!(config_name = name, "rotated concurrently, skipping");
            return Ok(None);
        }

        let client = self.state.client_for(ctx, name).await?;
        let current = ctx
            .call_provider("current_token_info", client.current_token_info())
            .await?;

        let lifetime = current
            .expires_at
            .and_then(|expires_at| (expires_at - current.created_at).to_std().ok())
            .filter(|lifetime| !lifetime.is_zero())
            .unwrap_or(MAX_TTL);
        let (_, expires_at) = compute_ttl(lifetime, now);

        let request = RotateTokenRequest {
            name: rotated_name(&current.name, now),
            scopes: current.scopes.clone(),
            expires_at,
        };
        let rotated = ctx
            .call_provider("rotate_current_token", client.rotate_current_token(&request))
            .await?;

        if ctx.is_cancelled() {
            warn!(
                config_name = name,
                token_id = rotated.token_id,
                "rotation cancelled after the provider issued a replacement, token is orphaned"
            );
            return Err(EngineError::Cancelled);
        }

        let old_token_id = entry.token_id;
        entry.token = rotated.token;
        entry.token_id = rotated.token_id;
        entry.token_created_at = Some(rotated.created_at);
        entry.token_expires_at = Some(rotated.expires_at.unwrap_or(expires_at));
        entry.scopes = if rotated.scopes.is_empty() {
            current.scopes
        } else {
            rotated.scopes
        };
        self.state.configs.save(ctx, &entry).await?;
        self.state.clients.invalidate(name).await;

        let old_token_revoked = if entry.revoke_auto_rotated_token {
            self.revoke_previous(ctx, name, old_token_id).await
        } else {
            false
        };

        let outcome = RotationOutcome {
            config_name: name.to_string(),
            old_token_id,
            new_token_id: entry.token_id,
            expires_at: entry.token_expires_at.unwrap_or(expires_at),
            old_token_revoked,
        };

        info!(
            config_name = name,
            old_token_id,
            new_token_id = outcome.new_token_id,
            expires_at = %outcome.expires_at,
            old_token_revoked,
            "rotated config token"
        );
        self.state
            .events
            .emit(
                EventType::ConfigTokenRotate,
                [
                    ("config_name", name.to_string()),
                    ("old_token_id", old_token_id.to_string()),
                    ("new_token_id", outcome.new_token_id.to_string()),
                    ("expires_at", outcome.expires_at.to_rfc3339()),
                ],
            )
            .await;

        Ok(Some(outcome))
    }

    /// Best-effort revoke of the replaced token through a client built
    /// with the new one
    async fn revoke_previous(&self, ctx: &RequestContext, name: &str, token_id: i64) -> bool {
        let result = match self.state.client_for(ctx, name).await {
            Ok(client) => {
                ctx.call_provider(
                    "revoke_personal_access_token",
                    client.revoke_personal_access_token(token_id),
                )
                .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(EngineError::Provider {
                source: ProviderError::NotFound(_),
                ..
            }) => {
                debug!(config_name = name, token_id, "replaced token already gone");
                true
            }
            Err(e) => {
                warn!(config_name = name, token_id, error = %e, "failed to revoke replaced token");
                false
            }
        }
    }

    /// Evaluate every config, rotating those that are due
    ///
    /// Configs are handled independently: one failure never stops the others.
    pub async fn run_periodic(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> EngineResult<PeriodicReport> {
        let names = self.state.configs.list(ctx).await?;
        let concurrency = self.state.settings.periodic_concurrency.max(1);

        let outcomes: BTreeMap<String, PeriodicOutcome> = stream::iter(names)
            .map(|name| async move {
                let outcome = match self.maybe_rotate(ctx, &name, now).await {
                    Ok(Some(rotated)) => PeriodicOutcome::Rotated {
                        new_token_id: rotated.new_token_id,
                    },
                    Ok(None) => PeriodicOutcome::Skipped,
                    Err(e) => {
                        error!(config_name = %name, error = %e, "periodic rotation failed");
                        PeriodicOutcome::Failed(e.to_string())
                    }
                };
                (name, outcome)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        Ok(PeriodicReport { outcomes })
    }
}
