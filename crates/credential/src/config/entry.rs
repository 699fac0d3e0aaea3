//! Config records
//!
//! A config is one tenant: a provider base URL plus the privileged token the
//! engine uses against it, and the rotation policy for that token.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::{FieldErrorKind, SecretString, ValidationErrors};
use crate::storage::is_valid_record_name;
use crate::traits::{CurrentTokenInfo, ProviderMetadata};
use crate::types::GitlabType;
use crate::utils::secret_string::plaintext;

/// Shortest allowed rotation window
pub const MIN_AUTO_ROTATE_BEFORE: Duration = Duration::from_secs(24 * 3600);

/// Longest allowed rotation window
pub const MAX_AUTO_ROTATE_BEFORE: Duration = Duration::from_secs(730 * 3600);

/// Rotation window used when none is given
pub const DEFAULT_AUTO_ROTATE_BEFORE: Duration = Duration::from_secs(168 * 3600);

/// Persisted tenant record, stored under `config/{name}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique config name
    pub name: String,
    /// Provider base URL
    pub base_url: String,
    /// Privileged token used by the engine
    #[serde(with = "plaintext")]
    pub token: SecretString,
    /// Provider id of `token`
    #[serde(default)]
    pub token_id: i64,
    /// Creation time of `token`
    #[serde(default)]
    pub token_created_at: Option<DateTime<Utc>>,
    /// Expiry of `token`, `None` if it never expires
    #[serde(default)]
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Scopes of `token`
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Rotate `token` automatically from the periodic hook
    #[serde(default)]
    pub auto_rotate: bool,
    /// Rotate once the remaining lifetime drops to this window
    #[serde(with = "humantime_serde")]
    pub auto_rotate_before: Duration,
    /// Revoke the previous token after a rotation
    #[serde(default)]
    pub revoke_auto_rotated_token: bool,
    /// Deployment flavour
    #[serde(default)]
    pub gitlab_type: GitlabType,
    /// Provider version from discovery
    #[serde(default)]
    pub provider_version: String,
    /// Provider revision from discovery
    #[serde(default)]
    pub provider_revision: String,
    /// Provider is an enterprise edition
    #[serde(default)]
    pub provider_is_enterprise: bool,
}

/// Full config write, creating or replacing the record
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WriteConfigRequest {
    /// Provider base URL
    pub base_url: String,
    /// Privileged token
    pub token: SecretString,
    /// Enable automatic rotation
    #[serde(default)]
    pub auto_rotate: bool,
    /// Rotation window, defaults to 168h
    #[serde(default, with = "humantime_serde::option")]
    pub auto_rotate_before: Option<Duration>,
    /// Revoke the previous token after rotation, defaults to the engine setting
    #[serde(default)]
    pub revoke_auto_rotated_token: Option<bool>,
    /// Deployment flavour, defaults to `self-managed`
    #[serde(default)]
    pub gitlab_type: Option<String>,
}

/// Partial config update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatchConfigRequest {
    /// New base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// New privileged token
    #[serde(default)]
    pub token: Option<SecretString>,
    /// New auto-rotate flag
    #[serde(default)]
    pub auto_rotate: Option<bool>,
    /// New rotation window
    #[serde(default, with = "humantime_serde::option")]
    pub auto_rotate_before: Option<Duration>,
    /// New revoke-after-rotation flag
    #[serde(default)]
    pub revoke_auto_rotated_token: Option<bool>,
    /// New deployment flavour
    #[serde(default)]
    pub gitlab_type: Option<String>,
}

/// Config as returned to callers; the token is never included
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigView {
    /// Config name
    pub name: String,
    /// Provider base URL
    pub base_url: String,
    /// Provider id of the privileged token
    pub token_id: i64,
    /// Creation time of the privileged token
    pub token_created_at: Option<DateTime<Utc>>,
    /// Expiry of the privileged token
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Scopes of the privileged token
    pub scopes: Vec<String>,
    /// Automatic rotation enabled
    pub auto_rotate: bool,
    /// Rotation window
    #[serde(with = "humantime_serde")]
    pub auto_rotate_before: Duration,
    /// Revoke previous token after rotation
    pub revoke_auto_rotated_token: bool,
    /// Deployment flavour
    pub gitlab_type: GitlabType,
    /// Provider version
    pub provider_version: String,
    /// Provider revision
    pub provider_revision: String,
    /// Enterprise edition
    pub provider_is_enterprise: bool,
}

impl ConfigEntry {
    /// Build and validate a record from a full write
    pub(crate) fn from_write(
        name: &str,
        request: WriteConfigRequest,
        revoke_default: bool,
    ) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let gitlab_type = parse_gitlab_type(request.gitlab_type.as_deref(), &mut errors);

        let entry = Self {
            name: name.to_string(),
            base_url: request.base_url.trim().to_string(),
            token: request.token,
            token_id: 0,
            token_created_at: None,
            token_expires_at: None,
            scopes: Vec::new(),
            auto_rotate: request.auto_rotate,
            auto_rotate_before: request
                .auto_rotate_before
                .unwrap_or(DEFAULT_AUTO_ROTATE_BEFORE),
            revoke_auto_rotated_token: request.revoke_auto_rotated_token.unwrap_or(revoke_default),
            gitlab_type: gitlab_type.unwrap_or_default(),
            provider_version: String::new(),
            provider_revision: String::new(),
            provider_is_enterprise: false,
        };

        entry.validate_into(&mut errors);
        errors.into_result().map(|()| entry)
    }

    /// Merge `patch` over this record.
    ///
    /// Returns the merged record and whether the credentials (token or base
    /// URL) changed, in which case discovery must run again.
    pub(crate) fn patched(&self, patch: PatchConfigRequest) -> Result<(Self, bool), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut entry = self.clone();
        let mut credentials_changed = false;

        if let Some(base_url) = patch.base_url {
            let base_url = base_url.trim().to_string();
            credentials_changed |= base_url != entry.base_url;
            entry.base_url = base_url;
        }
        if let Some(token) = patch.token {
            credentials_changed |= token != entry.token;
            entry.token = token;
        }
        if let Some(auto_rotate) = patch.auto_rotate {
            entry.auto_rotate = auto_rotate;
        }
        if let Some(window) = patch.auto_rotate_before {
            entry.auto_rotate_before = window;
        }
        if let Some(revoke) = patch.revoke_auto_rotated_token {
            entry.revoke_auto_rotated_token = revoke;
        }
        if let Some(raw) = patch.gitlab_type.as_deref()
            && let Some(gitlab_type) = parse_gitlab_type(Some(raw), &mut errors)
        {
            entry.gitlab_type = gitlab_type;
        }

        entry.validate_into(&mut errors);
        errors.into_result().map(|()| (entry, credentials_changed))
    }

    fn validate_into(&self, errors: &mut ValidationErrors) {
        if self.name.trim().is_empty() {
            errors.required("name");
        } else if !is_valid_record_name(&self.name) {
            errors.push(
                "name",
                FieldErrorKind::InvalidValue,
                format!("config name '{}' may not contain '/'", self.name),
            );
        }

        if self.base_url.is_empty() {
            errors.push("base_url", FieldErrorKind::InvalidValue, "base url is empty");
        } else {
            match Url::parse(&self.base_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
                Ok(url) => errors.push(
                    "base_url",
                    FieldErrorKind::InvalidValue,
                    format!("unsupported url '{url}', expected http or https"),
                ),
                Err(e) => errors.push("base_url", FieldErrorKind::InvalidValue, e.to_string()),
            }
        }

        if self.token.is_blank() {
            errors.push("token", FieldErrorKind::InvalidValue, "token is empty");
        }

        if !(MIN_AUTO_ROTATE_BEFORE..=MAX_AUTO_ROTATE_BEFORE).contains(&self.auto_rotate_before) {
            errors.push(
                "auto_rotate_before",
                FieldErrorKind::InvalidValue,
                format!(
                    "{:?} is outside the allowed range of 24h to 730h",
                    self.auto_rotate_before
                ),
            );
        }
    }

    /// Record what the provider reports about the privileged token
    pub(crate) fn apply_discovery(&mut self, info: &CurrentTokenInfo, metadata: &ProviderMetadata) {
        self.token_id = info.token_id;
        self.token_created_at = Some(info.created_at);
        self.token_expires_at = info.expires_at;
        self.scopes.clone_from(&info.scopes);
        self.provider_version.clone_from(&metadata.version);
        self.provider_revision.clone_from(&metadata.revision);
        self.provider_is_enterprise = metadata.is_enterprise;
    }

    /// Redacted view for callers
    pub fn view(&self) -> ConfigView {
        ConfigView {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            token_id: self.token_id,
            token_created_at: self.token_created_at,
            token_expires_at: self.token_expires_at,
            scopes: self.scopes.clone(),
            auto_rotate: self.auto_rotate,
            auto_rotate_before: self.auto_rotate_before,
            revoke_auto_rotated_token: self.revoke_auto_rotated_token,
            gitlab_type: self.gitlab_type,
            provider_version: self.provider_version.clone(),
            provider_revision: self.provider_revision.clone(),
            provider_is_enterprise: self.provider_is_enterprise,
        }
    }
}

fn parse_gitlab_type(raw: Option<&str>, errors: &mut ValidationErrors) -> Option<GitlabType> {
    match raw.map(str::trim) {
        None | Some("") => Some(GitlabType::default()),
        Some(value) => match GitlabType::parse(value) {
            Ok(gitlab_type) => Some(gitlab_type),
            Err(_) => {
                let allowed: Vec<&str> = GitlabType::ALL.iter().map(|t| t.as_str()).collect();
                errors.push(
                    "gitlab_type",
                    FieldErrorKind::FieldInvalidValue,
                    format!("'{value}' should be one of {allowed:?}"),
                );
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn request() -> WriteConfigRequest {
        WriteConfigRequest {
            base_url: "https://gitlab.example.com".into(),
            token: SecretString::new("glpat-root"),
            ..WriteConfigRequest::default()
        }
    }

    #[test]
    fn test_defaults() {
        let entry = ConfigEntry::from_write("default", request(), false).unwrap();
        assert_eq!(entry.auto_rotate_before, DEFAULT_AUTO_ROTATE_BEFORE);
        assert_eq!(entry.gitlab_type, GitlabType::SelfManaged);
        assert!(!entry.revoke_auto_rotated_token);
    }

    #[rstest]
    #[case(Duration::from_secs(23 * 3600), false)]
    #[case(Duration::from_secs(24 * 3600), true)]
    #[case(Duration::from_secs(48 * 3600), true)]
    #[case(Duration::from_secs(730 * 3600), true)]
    #[case(Duration::from_secs(731 * 3600), false)]
    fn test_auto_rotate_before_range(#[case] window: Duration, #[case] ok: bool) {
        let result = ConfigEntry::from_write(
            "default",
            WriteConfigRequest {
                auto_rotate_before: Some(window),
                ..request()
            },
            false,
        );
        assert_eq!(result.is_ok(), ok);
        if let Ok(entry) = result {
            assert_eq!(entry.view().auto_rotate_before, window);
        }
    }

    #[test]
    fn test_errors_accumulate() {
        let errors = ConfigEntry::from_write(
            "default",
            WriteConfigRequest {
                base_url: "ftp://example.com".into(),
                token: SecretString::new(""),
                auto_rotate_before: Some(Duration::from_secs(1)),
                gitlab_type: Some("cloud".into()),
                ..WriteConfigRequest::default()
            },
            false,
        )
        .unwrap_err();

        assert_eq!(errors.len(), 4);
        assert_eq!(errors.of_kind(FieldErrorKind::FieldInvalidValue).count(), 1);
        assert_eq!(errors.of_kind(FieldErrorKind::InvalidValue).count(), 3);
    }

    #[test]
    fn test_name_with_separator_is_rejected() {
        let errors = ConfigEntry::from_write("tenant/a", request(), false).unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.for_field("name").next().unwrap().kind,
            FieldErrorKind::InvalidValue
        );
    }

    #[test]
    fn test_patch_tracks_credential_change() {
        let entry = ConfigEntry::from_write("default", request(), false).unwrap();

        let (patched, changed) = entry
            .patched(PatchConfigRequest {
                auto_rotate: Some(true),
                ..PatchConfigRequest::default()
            })
            .unwrap();
        assert!(patched.auto_rotate);
        assert!(!changed);

        let (patched, changed) = entry
            .patched(PatchConfigRequest {
                token: Some(SecretString::new("glpat-new")),
                ..PatchConfigRequest::default()
            })
            .unwrap();
        assert!(changed);
        assert_eq!(patched.token, SecretString::new("glpat-new"));
    }

    #[test]
    fn test_persisted_form_keeps_token_but_view_drops_it() {
        let entry = ConfigEntry::from_write("default", request(), false).unwrap();

        let stored = serde_json::to_string(&entry).unwrap();
        assert!(stored.contains("glpat-root"));
        let back: ConfigEntry = serde_json::from_str(&stored).unwrap();
        assert_eq!(back, entry);

        let view = serde_json::to_string(&entry.view()).unwrap();
        assert!(!view.contains("glpat-root"));
    }
}
