//! Identity provider boundary
//!
//! [`ProviderClient`] is the engine's only view of the provider's REST API.
//! The HTTP transport lives behind it; the engine never builds requests
//! itself.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConfigEntry;
use crate::core::{ProviderError, SecretString};
use crate::types::{AccessLevel, Scope};

/// Parameters of a token create call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTokenRequest {
    /// Display name of the token
    pub name: String,
    /// Requested scopes
    pub scopes: Vec<Scope>,
    /// Membership level, `Unknown` where not applicable
    #[serde(default)]
    pub access_level: AccessLevel,
    /// Day-aligned expiry
    pub expires_at: DateTime<Utc>,
}

/// Parameters of a self-rotation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotateTokenRequest {
    /// Display name of the replacement token
    pub name: String,
    /// Scopes carried over from the current token
    pub scopes: Vec<String>,
    /// Day-aligned expiry of the replacement
    pub expires_at: DateTime<Utc>,
}

/// A token minted by the provider
#[derive(Debug, Clone)]
pub struct ProviderToken {
    /// Secret token value
    pub token: SecretString,
    /// Provider id of the token
    pub token_id: i64,
    /// Display name
    pub name: String,
    /// Scopes echoed by the provider
    pub scopes: Vec<String>,
    /// Creation time reported by the provider
    pub created_at: DateTime<Utc>,
    /// Expiry reported by the provider, `None` for non-expiring tokens
    pub expires_at: Option<DateTime<Utc>>,
}

/// The privileged token a client is authenticated with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTokenInfo {
    /// Provider id of the token
    pub token_id: i64,
    /// Display name
    pub name: String,
    /// Owning user
    pub user_id: i64,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry, `None` if the token never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// False once revoked
    pub active: bool,
}

/// Provider instance metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Version string, e.g. `17.4.0`
    pub version: String,
    /// Source revision
    pub revision: String,
    /// Enterprise edition
    pub is_enterprise: bool,
}

/// Client for the identity provider's token API
///
/// One client is bound to one config's base URL and privileged token.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Describe the token this client authenticates with
    async fn current_token_info(&self) -> Result<CurrentTokenInfo, ProviderError>;

    /// Replace the token this client authenticates with
    ///
    /// The previous token stays valid until revoked.
    async fn rotate_current_token(
        &self,
        request: &RotateTokenRequest,
    ) -> Result<ProviderToken, ProviderError>;

    /// Instance version information
    async fn metadata(&self) -> Result<ProviderMetadata, ProviderError>;

    /// Resolve a username to a user id
    async fn get_user_id_by_username(&self, username: &str) -> Result<i64, ProviderError>;

    /// Resolve a full group path to a group id
    async fn get_group_id_by_path(&self, path: &str) -> Result<i64, ProviderError>;

    /// Resolve a full project path to a project id
    async fn get_project_id_by_path(&self, path: &str) -> Result<i64, ProviderError>;

    /// Personal access token for `user_id`
    async fn create_personal_access_token(
        &self,
        user_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError>;

    /// Group access token
    async fn create_group_access_token(
        &self,
        group_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError>;

    /// Project access token
    async fn create_project_access_token(
        &self,
        project_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError>;

    /// Token for a service account owned by a group
    async fn create_group_service_account_token(
        &self,
        group_id: i64,
        user_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError>;

    /// Token for an instance-level service account
    async fn create_user_service_account_token(
        &self,
        user_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError>;

    /// Pipeline trigger token; these never expire on the provider side
    async fn create_pipeline_project_trigger_token(
        &self,
        project_id: i64,
        description: &str,
    ) -> Result<ProviderToken, ProviderError>;

    /// Project deploy token
    async fn create_project_deploy_token(
        &self,
        project_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError>;

    /// Group deploy token
    async fn create_group_deploy_token(
        &self,
        group_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError>;

    /// Revoke a personal access token
    async fn revoke_personal_access_token(&self, token_id: i64) -> Result<(), ProviderError>;

    /// Revoke a group access token
    async fn revoke_group_access_token(
        &self,
        group_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError>;

    /// Revoke a project access token
    async fn revoke_project_access_token(
        &self,
        project_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError>;

    /// Revoke a group service account token
    async fn revoke_group_service_account_token(
        &self,
        group_id: i64,
        user_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError>;

    /// Revoke a user service account token
    async fn revoke_user_service_account_token(
        &self,
        user_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError>;

    /// Delete a pipeline trigger token
    async fn revoke_pipeline_project_trigger_token(
        &self,
        project_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError>;

    /// Revoke a project deploy token
    async fn revoke_project_deploy_token(
        &self,
        project_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError>;

    /// Revoke a group deploy token
    async fn revoke_group_deploy_token(
        &self,
        group_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError>;
}

/// Builds a [`ProviderClient`] from a config record
///
/// Construction is local (no network); the first request is made by the
/// caller.
pub trait ProviderClientFactory: Send + Sync {
    /// Build a client authenticated with `config`'s token
    fn build(&self, config: &ConfigEntry) -> Result<Arc<dyn ProviderClient>, ProviderError>;
}
