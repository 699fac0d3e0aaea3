//! Token issuance
//!
//! Turns a stored [`Role`] into a live downstream token:
//!
//! 1. acquire the cached provider client of the role's config
//! 2. render the token name from the role's template
//! 3. compute the day-aligned provider expiry
//! 4. resolve the role path to a provider id and call the create operation
//!    selected by the token type
//! 5. stamp ownership data and work out the lease TTL
//!
//! When the engine owns the expiry the lease TTL is exactly `role.ttl` and
//! the credential's expiry is moved to `start + role.ttl`; the provider-side
//! expiry stays rounded up to the next day so it never fires first. When the
//! provider owns the expiry the lease TTL is the provider's own lifetime.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::core::{EngineError, EngineResult, RequestContext, SecretString};
use crate::engine::EngineState;
use crate::revocation::RevocationRecord;
use crate::role::Role;
use crate::template::{DEFAULT_NAME_TEMPLATE, NameTemplate, TemplateData};
use crate::traits::{CreateTokenRequest, ProviderClient, ProviderToken};
use crate::types::{AccessLevel, Scope, TokenType};
use crate::utils::compute_ttl;

/// A freshly issued downstream token
#[derive(Debug, Clone)]
pub struct Credential {
    /// Secret token value
    pub token: SecretString,
    /// Provider id of the token
    pub token_id: i64,
    /// Provider id of the user, group or project the token belongs to
    pub parent_id: i64,
    /// Service account user, for group service account tokens
    pub user_id: Option<i64>,
    /// Rendered display name
    pub name: String,
    /// Kind of token
    pub token_type: TokenType,
    /// Granted scopes
    pub scopes: Vec<Scope>,
    /// Granted access level
    pub access_level: AccessLevel,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry the lease is built around, `None` if the token never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// Issuing role
    pub role_name: String,
    /// Config the token was issued against
    pub config_name: String,
    /// Role path
    pub path: String,
    /// The provider owns the expiry
    pub gitlab_revokes_token: bool,
}

impl Credential {
    /// Data handed back to the caller through the lease
    pub fn public_data(&self) -> Value {
        let token = self.token.expose_secret(str::to_string);
        json!({
            "token": token,
            "token_id": self.token_id,
            "parent_id": self.parent_id,
            "name": self.name,
            "token_type": self.token_type,
            "scopes": self.scopes,
            "access_level": self.access_level,
            "created_at": self.created_at,
            "expires_at": self.expires_at,
            "role_name": self.role_name,
            "config_name": self.config_name,
            "gitlab_revokes_token": self.gitlab_revokes_token,
        })
    }

    /// Exactly what revocation needs to find the token again
    pub fn revocation_record(&self) -> RevocationRecord {
        RevocationRecord {
            token_id: self.token_id,
            parent_id: self.parent_id,
            user_id: self.user_id,
            token_type: self.token_type,
            gitlab_revokes_token: self.gitlab_revokes_token,
            config_name: self.config_name.clone(),
            role_name: self.role_name.clone(),
            path: self.path.clone(),
        }
    }
}

/// Issued token with its lease TTL
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// The token
    pub credential: Credential,
    /// TTL of the host lease
    pub lease_ttl: Duration,
}

/// Provider ids a role path resolves to
#[derive(Debug, Clone, Copy)]
struct Parent {
    id: i64,
    user_id: Option<i64>,
}

/// Issues tokens for roles
pub struct TokenIssuer<'a> {
    state: &'a EngineState,
}

impl<'a> TokenIssuer<'a> {
    pub(crate) fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Issue a token for `role` starting now
    pub async fn issue(&self, ctx: &RequestContext, role: &Role) -> EngineResult<IssuedCredential> {
        self.issue_at(ctx, role, Utc::now()).await
    }

    /// Issue a token for `role` with `start` as the issuance time
    pub async fn issue_at(
        &self,
        ctx: &RequestContext,
        role: &Role,
        start: DateTime<Utc>,
    ) -> EngineResult<IssuedCredential> {
        let client = self.state.client_for(ctx, &role.config_name).await?;

        let name = render_name(role, start)?;
        let (_, provider_expires_at) = compute_ttl(role.ttl, start);

        let request = CreateTokenRequest {
            name,
            scopes: role.scopes.clone(),
            access_level: role.access_level,
            expires_at: provider_expires_at,
        };

        let parent = resolve_parent(ctx, client.as_ref(), role).await?;
        let token = create(ctx, client.as_ref(), role.token_type, parent, &request).await?;

        if ctx.is_cancelled() {
            warn!(
                role_name = %role.role_name,
                config_name = %role.config_name,
                token_id = token.token_id,
                "issuance cancelled after the provider created the token, token is orphaned"
            );
            return Err(EngineError::Cancelled);
        }

        let (expires_at, lease_ttl) = if role.gitlab_revokes_token {
            let expires_at = token.expires_at.unwrap_or(provider_expires_at);
            let lease_ttl = (expires_at - token.created_at).to_std().unwrap_or_default();
            (Some(expires_at), lease_ttl)
        } else {
            let exact = TimeDelta::from_std(role.ttl).ok().map(|ttl| start + ttl);
            (exact, role.ttl)
        };

        info!(
            role_name = %role.role_name,
            config_name = %role.config_name,
            token_type = %role.token_type,
            token_id = token.token_id,
            lease_ttl = ?lease_ttl,
            gitlab_revokes_token = role.gitlab_revokes_token,
            "issued token"
        );

        Ok(IssuedCredential {
            credential: Credential {
                token: token.token,
                token_id: token.token_id,
                parent_id: parent.id,
                user_id: parent.user_id,
                name: token.name,
                token_type: role.token_type,
                scopes: role.scopes.clone(),
                access_level: role.access_level,
                created_at: token.created_at,
                expires_at,
                role_name: role.role_name.clone(),
                config_name: role.config_name.clone(),
                path: role.path.clone(),
                gitlab_revokes_token: role.gitlab_revokes_token,
            },
            lease_ttl,
        })
    }
}

fn render_name(role: &Role, start: DateTime<Utc>) -> EngineResult<String> {
    let source = if role.name.trim().is_empty() {
        DEFAULT_NAME_TEMPLATE
    } else {
        role.name.as_str()
    };
    let template = NameTemplate::parse(source)?;

    let data = TemplateData {
        role_name: role.role_name.clone(),
        config_name: role.config_name.clone(),
        token_type: role.token_type.to_string(),
        scopes: role.scopes.iter().map(ToString::to_string).collect(),
        access_level: role.access_level.to_string(),
        gitlab_revokes_token: role.gitlab_revokes_token,
        unix_timestamp_utc: start.timestamp(),
        path: role.path.clone(),
    };
    Ok(template.render_at(&data, start)?)
}

async fn resolve_parent(
    ctx: &RequestContext,
    client: &dyn ProviderClient,
    role: &Role,
) -> EngineResult<Parent> {
    use crate::types::ParentKind;

    let path = role.path.as_str();
    match role.token_type.spec().parent {
        ParentKind::User => {
            let id = ctx
                .call_provider("get_user_id_by_username", client.get_user_id_by_username(path))
                .await?;
            Ok(Parent {
                id,
                user_id: Some(id),
            })
        }
        ParentKind::Group => {
            let id = ctx
                .call_provider("get_group_id_by_path", client.get_group_id_by_path(path))
                .await?;
            Ok(Parent { id, user_id: None })
        }
        ParentKind::Project => {
            let id = ctx
                .call_provider("get_project_id_by_path", client.get_project_id_by_path(path))
                .await?;
            Ok(Parent { id, user_id: None })
        }
        ParentKind::GroupServiceAccount => {
            let (group, username) = path.split_once('/').ok_or_else(|| {
                EngineError::FieldInvalidValue {
                    field: "path".to_string(),
                    reason: format!("'{path}' is not of the form group/username"),
                }
            })?;
            let id = ctx
                .call_provider("get_group_id_by_path", client.get_group_id_by_path(group))
                .await?;
            let user_id = ctx
                .call_provider(
                    "get_user_id_by_username",
                    client.get_user_id_by_username(username),
                )
                .await?;
            Ok(Parent {
                id,
                user_id: Some(user_id),
            })
        }
    }
}

async fn create(
    ctx: &RequestContext,
    client: &dyn ProviderClient,
    token_type: TokenType,
    parent: Parent,
    request: &CreateTokenRequest,
) -> EngineResult<ProviderToken> {
    let operation = token_type.spec().create_operation;
    let id = parent.id;

    match token_type {
        TokenType::Personal => {
            ctx.call_provider(operation, client.create_personal_access_token(id, request))
                .await
        }
        TokenType::Project => {
            ctx.call_provider(operation, client.create_project_access_token(id, request))
                .await
        }
        TokenType::Group => {
            ctx.call_provider(operation, client.create_group_access_token(id, request))
                .await
        }
        TokenType::UserServiceAccount => {
            ctx.call_provider(operation, client.create_user_service_account_token(id, request))
                .await
        }
        TokenType::GroupServiceAccount => {
            let user_id = parent.user_id.ok_or_else(|| EngineError::NilValue {
                what: "service account user id".to_string(),
            })?;
            ctx.call_provider(
                operation,
                client.create_group_service_account_token(id, user_id, request),
            )
            .await
        }
        TokenType::PipelineProjectTrigger => {
            ctx.call_provider(
                operation,
                client.create_pipeline_project_trigger_token(id, &request.name),
            )
            .await
        }
        TokenType::ProjectDeploy => {
            ctx.call_provider(operation, client.create_project_deploy_token(id, request))
                .await
        }
        TokenType::GroupDeploy => {
            ctx.call_provider(operation, client.create_group_deploy_token(id, request))
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn role(name: &str) -> Role {
        Role {
            role_name: "ci".into(),
            config_name: "default".into(),
            path: "group/app".into(),
            name: name.into(),
            scopes: vec![Scope::ReadApi, Scope::ReadRepository],
            access_level: AccessLevel::Developer,
            token_type: TokenType::Project,
            ttl: Duration::from_secs(3600),
            gitlab_revokes_token: false,
        }
    }

    #[test]
    fn test_render_name_supplies_every_field() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let name = render_name(
            &role(
                "{{ .role_name }}:{{ .config_name }}:{{ .token_type }}:{{ stringsJoin .scopes \"+\" }}:{{ .access_level }}:{{ yesNoBool .gitlab_revokes_token }}:{{ .unix_timestamp_utc }}:{{ .path }}",
            ),
            start,
        )
        .unwrap();

        assert_eq!(
            name,
            "ci:default:project:read_api+read_repository:developer:no:1704067200:group/app"
        );
    }

    #[test]
    fn test_render_name_falls_back_to_default() {
        let start = Utc::now();
        let name = render_name(&role(""), start).unwrap();
        assert!(name.starts_with("vault-generated-project-access-token-"));
    }
}
