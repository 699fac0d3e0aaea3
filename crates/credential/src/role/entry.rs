//! Role records

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{AccessLevel, Scope, TokenType};

/// Validated credential template, stored under `roles/{role_name}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role name
    pub role_name: String,
    /// Config the role issues against
    pub config_name: String,
    /// Username, group path or project path the token hangs off
    pub path: String,
    /// Name template for issued tokens
    pub name: String,
    /// Scopes of issued tokens
    #[serde(default)]
    pub scopes: Vec<Scope>,
    /// Access level of issued tokens
    #[serde(default)]
    pub access_level: AccessLevel,
    /// Kind of token issued
    pub token_type: TokenType,
    /// Lifetime of issued tokens
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// The provider, not the engine, ends the token's validity
    #[serde(default)]
    pub gitlab_revokes_token: bool,
}

/// Raw role write as received from the host
///
/// Enum-valued fields are plain strings so that unparseable values can be
/// reported alongside every other field error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoleRequest {
    /// Role name
    #[serde(default)]
    pub role_name: String,
    /// Config name, defaults to the engine's default config
    #[serde(default)]
    pub config_name: Option<String>,
    /// Token path
    #[serde(default)]
    pub path: String,
    /// Name template
    #[serde(default)]
    pub name: String,
    /// Scope names
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Access level name
    #[serde(default)]
    pub access_level: String,
    /// Token type name
    #[serde(default)]
    pub token_type: String,
    /// Requested lifetime, `None` or zero for the maximum
    #[serde(default, with = "humantime_serde::option")]
    pub ttl: Option<Duration>,
    /// Provider-owned expiry
    #[serde(default)]
    pub gitlab_revokes_token: bool,
}

/// Result of a successful role write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleWriteOutcome {
    /// Role as persisted
    pub role: Role,
    /// Non-fatal adjustments made while validating
    pub warnings: Vec<String>,
}
