//! Self-rotation of each config's privileged token
//!
//! [`evaluate`] decides whether a config is due; [`RotationScheduler`] drives
//! the provider's self-rotation call and persists the replacement token.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::ConfigEntry;
use crate::core::{EngineError, EngineResult};

pub mod scheduler;

pub use scheduler::RotationScheduler;

/// Whether a config's privileged token should be rotated now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDecision {
    /// Auto-rotation is switched off for the config
    Disabled,
    /// Still outside the rotation window
    NotDue {
        /// Time until the token expires
        remaining: Duration,
    },
    /// Inside the window, or the expiry is unknown
    Due,
}

/// Decide whether `entry` needs rotating at `now`
pub fn evaluate(entry: &ConfigEntry, now: DateTime<Utc>) -> RotationDecision {
    if !entry.auto_rotate {
        return RotationDecision::Disabled;
    }
    let Some(expires_at) = entry.token_expires_at else {
        return RotationDecision::Due;
    };

    // Already expired tokens have no remaining time and are always due
    let remaining = (expires_at - now).to_std().unwrap_or_default();
    if remaining > entry.auto_rotate_before {
        RotationDecision::NotDue { remaining }
    } else {
        RotationDecision::Due
    }
}

/// A completed self-rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    /// Rotated config
    pub config_name: String,
    /// Provider id of the replaced token
    pub old_token_id: i64,
    /// Provider id of the replacement
    pub new_token_id: i64,
    /// Expiry of the replacement
    pub expires_at: DateTime<Utc>,
    /// The replaced token was revoked, or was already gone
    pub old_token_revoked: bool,
}

/// Per-config result of a periodic pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodicOutcome {
    /// Token replaced
    Rotated {
        /// Provider id of the replacement
        new_token_id: i64,
    },
    /// Not due, or auto-rotation disabled
    Skipped,
    /// Rotation attempted and failed
    Failed(String),
}

/// Aggregated result of a periodic pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodicReport {
    /// Outcome per config name
    pub outcomes: BTreeMap<String, PeriodicOutcome>,
}

impl PeriodicReport {
    /// Names of rotated configs
    pub fn rotated(&self) -> Vec<&str> {
        self.names_where(|o| matches!(o, PeriodicOutcome::Rotated { .. }))
    }

    /// Names of skipped configs
    pub fn skipped(&self) -> Vec<&str> {
        self.names_where(|o| matches!(o, PeriodicOutcome::Skipped))
    }

    /// `name: message` for each failed config
    pub fn failed(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                PeriodicOutcome::Failed(message) => Some(format!("{name}: {message}")),
                _ => None,
            })
            .collect()
    }

    /// `Err(Rotation)` carrying this report when at least one config failed
    pub fn into_result(self) -> EngineResult<Self> {
        let failures = self.failed();
        if failures.is_empty() {
            Ok(self)
        } else {
            Err(EngineError::Rotation {
                failures,
                report: Box::new(self),
            })
        }
    }

    fn names_where(&self, pred: impl Fn(&PeriodicOutcome) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| pred(outcome))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
