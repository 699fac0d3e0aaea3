//! Role validation against the token type matrix
//!
//! Every check runs even after an earlier one failed, so a single write
//! reports all of its problems. Checks that depend on the token type are
//! skipped when the type itself is missing or unknown.

use std::time::Duration;

use humantime_serde::re::humantime::format_duration;

use super::{Role, RoleRequest};
use crate::core::{FieldErrorKind, ValidationErrors};
use crate::storage::is_valid_record_name;
use crate::template::NameTemplate;
use crate::types::{AccessLevel, Scope, TokenType, validate_path};
use crate::utils::MIN_TTL;

/// Shortest lifetime of an engine-owned token
pub const MIN_ENGINE_OWNED_TTL: Duration = Duration::from_secs(3600);

/// Settings role validation depends on
#[derive(Debug, Clone)]
pub struct RoleLimits {
    /// Longest lifetime a role may request
    pub max_ttl: Duration,
    /// Config used when a role names none
    pub default_config_name: String,
}

/// Validate a raw role write.
///
/// On success returns the role to persist and any warnings about values
/// that were defaulted or clamped.
pub fn validate_role(
    request: &RoleRequest,
    limits: &RoleLimits,
) -> Result<(Role, Vec<String>), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut warnings = Vec::new();

    let role_name = request.role_name.trim();
    if role_name.is_empty() {
        errors.required("role_name");
    } else if !is_valid_record_name(role_name) {
        errors.push(
            "role_name",
            FieldErrorKind::InvalidValue,
            format!("role name '{role_name}' may not contain '/'"),
        );
    }

    let path = request.path.trim();
    if path.is_empty() {
        errors.required("path");
    }

    if request.name.trim().is_empty() {
        errors.required("name");
    } else if let Err(e) = NameTemplate::parse(&request.name) {
        errors.push("name", FieldErrorKind::FieldInvalidValue, e.to_string());
    }

    let token_type = parse_token_type(&request.token_type, &mut errors);
    let access_level = parse_access_level(&request.access_level, &mut errors);
    let scopes = parse_scopes(&request.scopes, &mut errors);

    if let Some(token_type) = token_type {
        check_matrix(
            token_type,
            path,
            access_level,
            scopes.as_deref(),
            &request.scopes,
            &mut errors,
        );

        if token_type == TokenType::PipelineProjectTrigger && request.gitlab_revokes_token {
            errors.push(
                "gitlab_revokes_token",
                FieldErrorKind::FieldInvalidValue,
                "pipeline trigger tokens never expire on the provider and must be revoked by the engine",
            );
        }
    }

    let ttl = resolve_ttl(request, limits, &mut errors, &mut warnings);

    let config_name = request
        .config_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(&limits.default_config_name)
        .to_string();
    if !is_valid_record_name(&config_name) {
        errors.push(
            "config_name",
            FieldErrorKind::InvalidValue,
            format!("config name '{config_name}' may not contain '/'"),
        );
    }

    errors.into_result()?;

    // Every Option below is Some once no error was recorded
    let (Some(token_type), Some(access_level), Some(scopes)) = (token_type, access_level, scopes)
    else {
        return Err(ValidationErrors::new());
    };

    let role = Role {
        role_name: role_name.to_string(),
        config_name,
        path: path.to_string(),
        name: request.name.clone(),
        scopes,
        access_level,
        token_type,
        ttl,
        gitlab_revokes_token: request.gitlab_revokes_token,
    };
    Ok((role, warnings))
}

fn parse_token_type(raw: &str, errors: &mut ValidationErrors) -> Option<TokenType> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.required("token_type");
        return None;
    }
    match TokenType::parse(raw) {
        Ok(token_type) => Some(token_type),
        Err(e) => {
            errors.push("token_type", FieldErrorKind::UnknownTokenType, e.to_string());
            None
        }
    }
}

fn parse_access_level(raw: &str, errors: &mut ValidationErrors) -> Option<AccessLevel> {
    match AccessLevel::parse(raw.trim()) {
        Ok(level) => Some(level),
        Err(e) => {
            errors.push("access_level", FieldErrorKind::UnknownAccessLevel, e.to_string());
            None
        }
    }
}

fn parse_scopes(raw: &[String], errors: &mut ValidationErrors) -> Option<Vec<Scope>> {
    let mut scopes = Vec::with_capacity(raw.len());
    let mut unknown = Vec::new();

    for value in raw {
        match Scope::parse(value.trim()) {
            Ok(scope) if !scopes.contains(&scope) => scopes.push(scope),
            Ok(_) => {}
            Err(_) => unknown.push(value.as_str()),
        }
    }

    if unknown.is_empty() {
        Some(scopes)
    } else {
        errors.push(
            "scopes",
            FieldErrorKind::UnknownTokenScope,
            format!("unknown scopes: {}", unknown.join(", ")),
        );
        None
    }
}

fn check_matrix(
    token_type: TokenType,
    path: &str,
    access_level: Option<AccessLevel>,
    scopes: Option<&[Scope]>,
    raw_scopes: &[String],
    errors: &mut ValidationErrors,
) {
    let spec = token_type.spec();

    if !path.is_empty() && !validate_path(path, token_type) {
        errors.push(
            "path",
            FieldErrorKind::FieldInvalidValue,
            format!("'{path}' is not a valid path for {token_type} tokens"),
        );
    }

    if let Some(level) = access_level {
        if spec.requires_access_level && level.is_unknown() {
            errors.required("access_level");
        } else if !spec.allows_access_level(level) {
            let allowed: Vec<&str> = spec.access_levels.iter().map(|l| l.as_str()).collect();
            errors.push(
                "access_level",
                FieldErrorKind::FieldInvalidValue,
                format!("'{level}' is not allowed for {token_type} tokens, should be one of {allowed:?}"),
            );
        }
    }

    if spec.requires_scopes && raw_scopes.is_empty() {
        errors.required("scopes");
    } else if let Some(scopes) = scopes {
        let disallowed = spec.disallowed_scopes(scopes);
        if !disallowed.is_empty() {
            let names: Vec<&str> = disallowed.iter().map(|s| s.as_str()).collect();
            errors.push(
                "scopes",
                FieldErrorKind::FieldInvalidValue,
                format!("{names:?} not allowed for {token_type} tokens"),
            );
        }
    }
}

fn resolve_ttl(
    request: &RoleRequest,
    limits: &RoleLimits,
    errors: &mut ValidationErrors,
    warnings: &mut Vec<String>,
) -> Duration {
    let max = limits.max_ttl;
    let ttl = match request.ttl {
        None | Some(Duration::ZERO) => {
            warnings.push(format!(
                "ttl not set, defaulting to the maximum of {}",
                format_duration(max)
            ));
            max
        }
        Some(ttl) if ttl > max => {
            warnings.push(format!(
                "ttl {} exceeds the maximum, clamped to {}",
                format_duration(ttl),
                format_duration(max)
            ));
            max
        }
        Some(ttl) => ttl,
    };

    let min = if request.gitlab_revokes_token {
        MIN_TTL
    } else {
        MIN_ENGINE_OWNED_TTL
    };
    if ttl < min {
        let owner = if request.gitlab_revokes_token {
            "provider-revoked"
        } else {
            "engine-revoked"
        };
        errors.push(
            "ttl",
            FieldErrorKind::InvalidValue,
            format!(
                "{} is below the minimum of {} for {owner} tokens",
                format_duration(ttl),
                format_duration(min),
            ),
        );
    }

    ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const HOUR: u64 = 3600;

    fn limits() -> RoleLimits {
        RoleLimits {
            max_ttl: crate::utils::MAX_TTL,
            default_config_name: "default".into(),
        }
    }

    fn personal() -> RoleRequest {
        RoleRequest {
            role_name: "admin".into(),
            path: "admin-user".into(),
            name: "{{ .role_name }}".into(),
            scopes: vec!["read_api".into()],
            token_type: "personal".into(),
            ttl: Some(Duration::from_secs(24 * HOUR)),
            ..RoleRequest::default()
        }
    }

    fn project() -> RoleRequest {
        RoleRequest {
            role_name: "deployer".into(),
            path: "group/app".into(),
            name: "{{ .role_name }}".into(),
            scopes: vec!["api".into(), "read_repository".into()],
            access_level: "owner".into(),
            token_type: "project".into(),
            ttl: Some(Duration::from_secs(24 * HOUR)),
            ..RoleRequest::default()
        }
    }

    #[test]
    fn test_missing_fields_and_bad_type_report_every_error() {
        let request = RoleRequest {
            token_type: "bogus".into(),
            ttl: Some(Duration::from_secs(24 * HOUR)),
            ..RoleRequest::default()
        };

        let errors = validate_role(&request, &limits()).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert_eq!(errors.of_kind(FieldErrorKind::FieldRequired).count(), 3);
        assert_eq!(errors.of_kind(FieldErrorKind::UnknownTokenType).count(), 1);
    }

    #[test]
    fn test_personal_with_access_level_is_rejected() {
        let errors = validate_role(
            &RoleRequest {
                access_level: "guest".into(),
                ..personal()
            },
            &limits(),
        )
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors()[0].kind, FieldErrorKind::FieldInvalidValue);
        assert_eq!(errors.errors()[0].field, "access_level");
    }

    #[test]
    fn test_personal_without_access_level_is_accepted() {
        let (role, warnings) = validate_role(&personal(), &limits()).unwrap();
        assert_eq!(role.token_type, TokenType::Personal);
        assert_eq!(role.access_level, AccessLevel::Unknown);
        assert_eq!(role.config_name, "default");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_project_owner_with_project_scopes_is_accepted() {
        let (role, _) = validate_role(&project(), &limits()).unwrap();
        assert_eq!(role.access_level, AccessLevel::Owner);
        assert_eq!(role.scopes, vec![Scope::Api, Scope::ReadRepository]);
    }

    #[test]
    fn test_project_with_personal_scopes_fails_once() {
        let errors = validate_role(
            &RoleRequest {
                scopes: vec!["read_user".into(), "sudo".into(), "admin_mode".into()],
                ..project()
            },
            &limits(),
        )
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.of_kind(FieldErrorKind::FieldInvalidValue).count(), 1);
        assert!(errors.errors()[0].message.contains("sudo"));
    }

    #[test]
    fn test_project_requires_access_level() {
        let errors = validate_role(
            &RoleRequest {
                access_level: String::new(),
                ..project()
            },
            &limits(),
        )
        .unwrap_err();
        assert_eq!(errors.for_field("access_level").count(), 1);
        assert_eq!(errors.errors()[0].kind, FieldErrorKind::FieldRequired);
    }

    #[test]
    fn test_unknown_values_are_reported_by_kind() {
        let errors = validate_role(
            &RoleRequest {
                access_level: "superuser".into(),
                scopes: vec!["api".into(), "everything".into(), "nothing".into()],
                ..project()
            },
            &limits(),
        )
        .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.of_kind(FieldErrorKind::UnknownAccessLevel).count(), 1);
        assert_eq!(errors.of_kind(FieldErrorKind::UnknownTokenScope).count(), 1);
    }

    #[rstest]
    #[case(true, 24 * HOUR - 1, false)]
    #[case(true, 24 * HOUR, true)]
    #[case(false, HOUR - 1, false)]
    #[case(false, HOUR, true)]
    fn test_ttl_minimum_depends_on_owner(
        #[case] gitlab_revokes_token: bool,
        #[case] ttl_secs: u64,
        #[case] ok: bool,
    ) {
        let result = validate_role(
            &RoleRequest {
                gitlab_revokes_token,
                ttl: Some(Duration::from_secs(ttl_secs)),
                ..personal()
            },
            &limits(),
        );
        assert_eq!(result.is_ok(), ok, "{result:?}");
        if let Err(errors) = result {
            assert_eq!(errors.errors()[0].kind, FieldErrorKind::InvalidValue);
        }
    }

    #[test]
    fn test_zero_ttl_defaults_to_max_with_warning() {
        let (role, warnings) = validate_role(
            &RoleRequest {
                ttl: None,
                ..personal()
            },
            &limits(),
        )
        .unwrap();
        assert_eq!(role.ttl, crate::utils::MAX_TTL);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_ttl_above_max_is_clamped_with_warning() {
        let (role, warnings) = validate_role(
            &RoleRequest {
                ttl: Some(Duration::from_secs(500 * 24 * HOUR)),
                ..personal()
            },
            &limits(),
        )
        .unwrap();
        assert_eq!(role.ttl, crate::utils::MAX_TTL);
        assert!(warnings[0].contains("clamped"));
    }

    #[test]
    fn test_pipeline_trigger_rules() {
        let trigger = RoleRequest {
            role_name: "trigger".into(),
            path: "group/app".into(),
            name: "{{ .role_name }}".into(),
            token_type: "pipeline-project-trigger".into(),
            ttl: Some(Duration::from_secs(HOUR)),
            ..RoleRequest::default()
        };
        assert!(validate_role(&trigger, &limits()).is_ok());

        let errors = validate_role(
            &RoleRequest {
                scopes: vec!["api".into()],
                gitlab_revokes_token: true,
                ttl: Some(Duration::from_secs(24 * HOUR)),
                ..trigger
            },
            &limits(),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.for_field("scopes").count(), 1);
        assert_eq!(errors.for_field("gitlab_revokes_token").count(), 1);
    }

    #[test]
    fn test_bad_path_and_template() {
        let errors = validate_role(
            &RoleRequest {
                path: "group1".into(),
                name: "{{ .nope }}".into(),
                token_type: "group-service-account".into(),
                ..personal()
            },
            &limits(),
        )
        .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.for_field("path").count(), 1);
        assert_eq!(errors.for_field("name").count(), 1);
    }

    #[test]
    fn test_names_with_separator_are_rejected() {
        let errors = validate_role(
            &RoleRequest {
                role_name: "team/admin".into(),
                config_name: Some("tenant/a".into()),
                ..personal()
            },
            &limits(),
        )
        .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.for_field("role_name").next().unwrap().kind,
            FieldErrorKind::InvalidValue
        );
        assert_eq!(errors.for_field("config_name").count(), 1);
    }
}
