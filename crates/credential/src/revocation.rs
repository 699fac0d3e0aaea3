//! Token revocation
//!
//! Revocation works only from the [`RevocationRecord`] stored with the lease
//! at issuance. The role may have changed or been deleted since, so nothing
//! is re-read from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::core::{EngineError, EngineResult, ProviderError, RequestContext};
use crate::engine::EngineState;
use crate::traits::ProviderClient;
use crate::types::TokenType;

/// Lease internal data sufficient to revoke a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationRecord {
    /// Provider id of the issued token
    pub token_id: i64,
    /// Project, group or user id the token belongs to
    pub parent_id: i64,
    /// Owning user id, set for personal and service account tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Selects the revoke call
    pub token_type: TokenType,
    /// GitLab expires the token itself; revocation is a no-op
    pub gitlab_revokes_token: bool,
    /// Config whose client performs the revoke
    pub config_name: String,
    /// Role the token was issued for
    #[serde(default)]
    pub role_name: String,
    /// Role path at issuance
    #[serde(default)]
    pub path: String,
}

impl RevocationRecord {
    /// Parse the record from lease internal data
    pub fn from_internal_data(data: &Value) -> EngineResult<Self> {
        if data.is_null() {
            return Err(EngineError::NilValue {
                what: "lease internal data".to_string(),
            });
        }
        serde_json::from_value(data.clone()).map_err(|source| EngineError::Serialization {
            key: "lease internal data".to_string(),
            source,
        })
    }

    /// Lease internal data for this record
    pub fn to_internal_data(&self) -> EngineResult<Value> {
        serde_json::to_value(self).map_err(|source| EngineError::Serialization {
            key: "lease internal data".to_string(),
            source,
        })
    }
}

/// What revocation ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// The provider owns the expiry, nothing to call
    ProviderOwned,
    /// The provider revoked the token
    Revoked,
    /// The provider no longer knew the token
    AlreadyGone,
}

/// Dispatches revoke calls by token type
pub struct RevocationDispatcher<'a> {
    state: &'a EngineState,
}

impl<'a> RevocationDispatcher<'a> {
    pub(crate) fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Revoke the token described by `record`
    pub async fn revoke(
        &self,
        ctx: &RequestContext,
        record: &RevocationRecord,
    ) -> EngineResult<RevokeOutcome> {
        if record.gitlab_revokes_token {
            debug!(
                token_id = record.token_id,
                token_type = %record.token_type,
                "provider owns token expiry, skipping revoke"
            );
            return Ok(RevokeOutcome::ProviderOwned);
        }

        let client = self.state.client_for(ctx, &record.config_name).await?;

        match dispatch(ctx, client.as_ref(), record).await {
            Ok(()) => Ok(RevokeOutcome::Revoked),
            Err(EngineError::AccessTokenNotFound { token_id }) => {
                warn!(
                    token_id,
                    token_type = %record.token_type,
                    config_name = %record.config_name,
                    "token already gone from provider"
                );
                Ok(RevokeOutcome::AlreadyGone)
            }
            Err(e) => {
                error!(
                    token_id = record.token_id,
                    token_type = %record.token_type,
                    config_name = %record.config_name,
                    error = %e,
                    "failed to revoke token"
                );
                Err(e)
            }
        }
    }
}

async fn dispatch(
    ctx: &RequestContext,
    client: &dyn ProviderClient,
    record: &RevocationRecord,
) -> EngineResult<()> {
    let operation = record.token_type.spec().revoke_operation;
    let token_id = record.token_id;
    let parent_id = record.parent_id;

    let result = match record.token_type {
        TokenType::Personal => {
            ctx.call_provider(operation, client.revoke_personal_access_token(token_id))
                .await
        }
        TokenType::Project => {
            ctx.call_provider(
                operation,
                client.revoke_project_access_token(parent_id, token_id),
            )
            .await
        }
        TokenType::Group => {
            ctx.call_provider(
                operation,
                client.revoke_group_access_token(parent_id, token_id),
            )
            .await
        }
        TokenType::UserServiceAccount => {
            ctx.call_provider(
                operation,
                client.revoke_user_service_account_token(parent_id, token_id),
            )
            .await
        }
        TokenType::GroupServiceAccount => {
            let user_id = record.user_id.ok_or_else(|| EngineError::NilValue {
                what: "service account user id".to_string(),
            })?;
            ctx.call_provider(
                operation,
                client.revoke_group_service_account_token(parent_id, user_id, token_id),
            )
            .await
        }
        TokenType::PipelineProjectTrigger => {
            ctx.call_provider(
                operation,
                client.revoke_pipeline_project_trigger_token(parent_id, token_id),
            )
            .await
        }
        TokenType::ProjectDeploy => {
            ctx.call_provider(
                operation,
                client.revoke_project_deploy_token(parent_id, token_id),
            )
            .await
        }
        TokenType::GroupDeploy => {
            ctx.call_provider(
                operation,
                client.revoke_group_deploy_token(parent_id, token_id),
            )
            .await
        }
    };

    result.map_err(|e| match e {
        EngineError::Provider {
            source: ProviderError::NotFound(_),
            ..
        } => EngineError::AccessTokenNotFound { token_id },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record() -> RevocationRecord {
        RevocationRecord {
            token_id: 42,
            parent_id: 7,
            user_id: None,
            token_type: TokenType::Project,
            gitlab_revokes_token: false,
            config_name: "default".into(),
            role_name: "ci".into(),
            path: "group/app".into(),
        }
    }

    #[test]
    fn test_internal_data_round_trip() {
        let data = record().to_internal_data().unwrap();
        assert_eq!(data["token_type"], json!("project"));
        assert!(data.get("user_id").is_none());

        let back = RevocationRecord::from_internal_data(&data).unwrap();
        assert_eq!(back, record());
    }

    #[test]
    fn test_null_internal_data_is_nil_value() {
        let err = RevocationRecord::from_internal_data(&Value::Null).unwrap_err();
        assert!(matches!(err, EngineError::NilValue { .. }));
    }

    #[test]
    fn test_malformed_internal_data() {
        let err = RevocationRecord::from_internal_data(&json!({"token_id": "x"})).unwrap_err();
        assert!(matches!(err, EngineError::Serialization { .. }));
    }
}
