//! Integration tests for config write, patch, read, delete and invalidation
//!
//! Configs hold the engine's privileged provider token. Every write checks
//! the token against the provider before anything is persisted.

use chrono::{TimeDelta, Utc};
use gitlab_secrets_credential::prelude::*;
use gitlab_secrets_credential::storage::MemoryKvStore;
use gitlab_secrets_credential::testing::{InMemoryClientFactory, InMemoryGitlab, RecordingEventSink};
use gitlab_secrets_credential::{FieldErrorKind, GitlabType, ProviderError};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

struct Harness {
    engine: Engine,
    factory: Arc<InMemoryClientFactory>,
    events: Arc<RecordingEventSink>,
}

impl Harness {
    fn gitlab(&self) -> &InMemoryGitlab {
        self.factory.gitlab()
    }
}

/// Helper to create an engine over a provider whose current token expires in 30 days
fn create_harness() -> Harness {
    gitlab_secrets_log::init_test();
    let now = Utc::now();
    let gitlab = InMemoryGitlab::new()
        .with_current_token(7, 1, now - TimeDelta::days(1), Some(now + TimeDelta::days(30)))
        .with_enterprise(true)
        .with_project("group/app", 42);
    let factory = Arc::new(InMemoryClientFactory::new(Arc::new(gitlab)));
    let events = Arc::new(RecordingEventSink::new());

    let engine = Engine::builder()
        .storage(Arc::new(MemoryKvStore::new()))
        .client_factory(factory.clone())
        .events(events.clone())
        .build()
        .unwrap();

    Harness {
        engine,
        factory,
        events,
    }
}

/// Helper to create a valid config write
fn write_request(token: &str) -> WriteConfigRequest {
    WriteConfigRequest {
        base_url: "https://gitlab.example.com".into(),
        token: SecretString::new(token),
        auto_rotate: true,
        auto_rotate_before: Some(48 * HOUR),
        ..Default::default()
    }
}

/// Helper to create a valid project role
fn project_role() -> RoleRequest {
    RoleRequest {
        role_name: "ci".into(),
        path: "group/app".into(),
        name: "ci-{{ randHexString 4 }}".into(),
        token_type: "project".into(),
        access_level: "developer".into(),
        scopes: vec!["read_api".into()],
        ttl: Some(HOUR),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_write_config_discovers_token_and_echoes_window() {
    // GIVEN: An engine and a provider reporting token 7
    let h = create_harness();
    let ctx = RequestContext::new();

    // WHEN: We write the config with a 48h rotation window
    let view = h
        .engine
        .write_config(&ctx, "default", write_request("glpat-root"))
        .await
        .unwrap();

    // THEN: The discovered token data is stored and the window echoed verbatim
    assert_eq!(view.token_id, 7);
    assert_eq!(view.auto_rotate_before, 48 * HOUR);
    assert_eq!(view.scopes, vec!["api".to_string(), "self_rotate".to_string()]);
    assert_eq!(view.provider_version, "17.4.0");
    assert!(view.provider_is_enterprise);
    assert_eq!(view.gitlab_type, GitlabType::SelfManaged);
    assert!(view.token_expires_at.is_some());

    let stored = h.engine.read_config(&ctx, "default").await.unwrap().unwrap();
    assert_eq!(stored, view);
    assert_eq!(h.events.event_types(), vec!["config-write"]);
}

#[tokio::test]
async fn test_config_view_never_contains_token() {
    // GIVEN: A written config
    let h = create_harness();
    let ctx = RequestContext::new();
    h.engine
        .write_config(&ctx, "default", write_request("glpat-root"))
        .await
        .unwrap();

    // WHEN: We serialize the view handed back to callers
    let view = h.engine.read_config(&ctx, "default").await.unwrap().unwrap();
    let json = serde_json::to_string(&view).unwrap();

    // THEN: The token is nowhere in it
    assert!(!json.contains("glpat-root"));
    assert!(!json.contains("\"token\""));
}

#[rstest]
#[case::window_too_short(Some(23 * HOUR))]
#[case::window_too_long(Some(731 * HOUR))]
#[tokio::test]
async fn test_rotation_window_outside_bounds_is_rejected(#[case] window: Option<Duration>) {
    // GIVEN: An engine
    let h = create_harness();
    let ctx = RequestContext::new();

    // WHEN: We write a config with an out-of-range rotation window
    let err = h
        .engine
        .write_config(
            &ctx,
            "default",
            WriteConfigRequest {
                auto_rotate_before: window,
                ..write_request("glpat-root")
            },
        )
        .await
        .unwrap_err();

    // THEN: The write fails before the provider is called and nothing is stored
    let errors = err.validation_errors().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.errors()[0].kind, FieldErrorKind::InvalidValue);
    assert_eq!(h.gitlab().total_calls(), 0);
    assert!(h.engine.list_configs(&ctx).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_write_reports_every_field() {
    // GIVEN: An engine
    let h = create_harness();
    let ctx = RequestContext::new();

    // WHEN: We write a config with an empty url, empty token and unknown type
    let err = h
        .engine
        .write_config(
            &ctx,
            "default",
            WriteConfigRequest {
                base_url: String::new(),
                token: SecretString::new(""),
                gitlab_type: Some("cloud".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    // THEN: Every problem is reported at once
    let errors = err.validation_errors().unwrap();
    assert_eq!(errors.len(), 3);
    assert_eq!(errors.for_field("base_url").count(), 1);
    assert_eq!(errors.for_field("token").count(), 1);
    assert_eq!(
        errors.for_field("gitlab_type").next().unwrap().kind,
        FieldErrorKind::FieldInvalidValue
    );
}

#[tokio::test]
async fn test_non_http_base_url_is_rejected() {
    let h = create_harness();
    let ctx = RequestContext::new();

    let err = h
        .engine
        .write_config(
            &ctx,
            "default",
            WriteConfigRequest {
                base_url: "ftp://gitlab.example.com".into(),
                ..write_request("glpat-root")
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.validation_errors().unwrap().for_field("base_url").count(), 1);
}

#[tokio::test]
async fn test_provider_failure_aborts_write() {
    // GIVEN: A provider that rejects the token
    let h = create_harness();
    let ctx = RequestContext::new();
    h.gitlab()
        .fail_next("current_token_info", ProviderError::Unauthorized);

    // WHEN: We write the config
    let err = h
        .engine
        .write_config(&ctx, "default", write_request("glpat-bad"))
        .await
        .unwrap_err();

    // THEN: The provider error names the operation and nothing is stored
    match err {
        EngineError::Provider { operation, source } => {
            assert_eq!(operation, "current_token_info");
            assert_eq!(source, ProviderError::Unauthorized);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.engine.read_config(&ctx, "default").await.unwrap().is_none());
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn test_patch_of_absent_config_is_not_configured() {
    let h = create_harness();
    let ctx = RequestContext::new();

    let err = h
        .engine
        .patch_config(&ctx, "missing", PatchConfigRequest::default())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NotConfigured { name } if name == "missing"));
}

#[tokio::test]
async fn test_patch_without_credential_change_skips_discovery() {
    // GIVEN: A written config
    let h = create_harness();
    let ctx = RequestContext::new();
    h.engine
        .write_config(&ctx, "default", write_request("glpat-root"))
        .await
        .unwrap();
    h.gitlab().reset_calls();

    // WHEN: We patch only the rotation settings
    let view = h
        .engine
        .patch_config(
            &ctx,
            "default",
            PatchConfigRequest {
                auto_rotate: Some(false),
                auto_rotate_before: Some(72 * HOUR),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // THEN: The fields change and the provider is not asked again
    assert!(!view.auto_rotate);
    assert_eq!(view.auto_rotate_before, 72 * HOUR);
    assert_eq!(h.gitlab().total_calls(), 0);
    assert_eq!(h.events.event_types(), vec!["config-write", "config-patch"]);
}

#[tokio::test]
async fn test_patch_token_rediscovers_and_rebuilds_client() {
    // GIVEN: A config whose client is already cached
    let h = create_harness();
    let ctx = RequestContext::new();
    h.engine
        .write_config(&ctx, "default", write_request("glpat-old"))
        .await
        .unwrap();
    h.engine.write_role(&ctx, project_role()).await.unwrap();
    h.engine.issue_token(&ctx, "ci").await.unwrap();
    let builds = h.factory.builds();

    // WHEN: We patch the token
    h.engine
        .patch_config(
            &ctx,
            "default",
            PatchConfigRequest {
                token: Some(SecretString::new("glpat-new")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.engine.issue_token(&ctx, "ci").await.unwrap();

    // THEN: Discovery ran with the new token and the cached client was replaced
    assert_eq!(h.gitlab().calls("current_token_info"), 2);
    assert_eq!(h.factory.builds(), builds + 2);
    assert_eq!(h.factory.last_token(), Some(SecretString::new("glpat-new")));
}

#[tokio::test]
async fn test_patch_with_invalid_value_keeps_stored_record() {
    let h = create_harness();
    let ctx = RequestContext::new();
    let before = h
        .engine
        .write_config(&ctx, "default", write_request("glpat-root"))
        .await
        .unwrap();

    let err = h
        .engine
        .patch_config(
            &ctx,
            "default",
            PatchConfigRequest {
                auto_rotate_before: Some(HOUR),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(err.validation_errors().is_some());
    let after = h.engine.read_config(&ctx, "default").await.unwrap().unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_delete_config_then_issue_is_not_configured() {
    // GIVEN: A config and a role using it
    let h = create_harness();
    let ctx = RequestContext::new();
    h.engine
        .write_config(&ctx, "default", write_request("glpat-root"))
        .await
        .unwrap();
    h.engine.write_role(&ctx, project_role()).await.unwrap();

    // WHEN: We delete the config
    h.engine.delete_config(&ctx, "default").await.unwrap();

    // THEN: It is gone and issuance reports the missing config
    assert!(h.engine.read_config(&ctx, "default").await.unwrap().is_none());
    assert!(h.engine.list_configs(&ctx).await.unwrap().is_empty());
    let err = h.engine.issue_token(&ctx, "ci").await.unwrap_err();
    assert!(matches!(err, EngineError::NotConfigured { .. }));
    assert!(h.events.event_types().contains(&"config-delete".to_string()));
}

#[tokio::test]
async fn test_list_configs_is_sorted() {
    let h = create_harness();
    let ctx = RequestContext::new();
    for name in ["zeta", "alpha", "mid"] {
        h.engine
            .write_config(&ctx, name, write_request("glpat-root"))
            .await
            .unwrap();
    }

    assert_eq!(
        h.engine.list_configs(&ctx).await.unwrap(),
        vec!["alpha", "mid", "zeta"]
    );
}

#[tokio::test]
async fn test_invalidate_hook_only_reacts_to_config_keys() {
    // GIVEN: A config whose client is cached
    let h = create_harness();
    let ctx = RequestContext::new();
    h.engine
        .write_config(&ctx, "default", write_request("glpat-root"))
        .await
        .unwrap();
    h.engine.write_role(&ctx, project_role()).await.unwrap();
    h.engine.issue_token(&ctx, "ci").await.unwrap();
    let builds = h.factory.builds();

    // WHEN: The host reports a role change, then a config change
    h.engine.invalidate("roles/ci").await;
    h.engine.issue_token(&ctx, "ci").await.unwrap();
    let after_role_key = h.factory.builds();

    h.engine.invalidate("config/default").await;
    h.engine.issue_token(&ctx, "ci").await.unwrap();

    // THEN: Only the config key forced a rebuild
    assert_eq!(after_role_key, builds);
    assert_eq!(h.factory.builds(), builds + 1);
}

#[tokio::test]
async fn test_failing_event_sink_does_not_fail_writes() {
    // GIVEN: An engine whose event sink rejects everything
    let factory = Arc::new(InMemoryClientFactory::new(Arc::new(
        InMemoryGitlab::new().with_current_token(7, 1, Utc::now(), None),
    )));
    let engine = Engine::builder()
        .storage(Arc::new(MemoryKvStore::new()))
        .client_factory(factory)
        .events(Arc::new(RecordingEventSink::failing()))
        .build()
        .unwrap();

    // WHEN: We write a config
    let result = engine
        .write_config(&RequestContext::new(), "default", write_request("glpat-root"))
        .await;

    // THEN: The write still succeeds
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_storage_failure_surfaces_as_storage_error() {
    // GIVEN: A store that rejects writes
    let store = Arc::new(MemoryKvStore::new());
    store.set_fail_writes(true);
    let factory = Arc::new(InMemoryClientFactory::new(Arc::new(
        InMemoryGitlab::new().with_current_token(7, 1, Utc::now(), None),
    )));
    let engine = Engine::builder()
        .storage(store)
        .client_factory(factory)
        .build()
        .unwrap();

    // WHEN: We write a config
    let err = engine
        .write_config(&RequestContext::new(), "default", write_request("glpat-root"))
        .await
        .unwrap_err();

    // THEN: The storage key is reported
    assert!(matches!(err, EngineError::Storage { key, .. } if key == "config/default"));
}
