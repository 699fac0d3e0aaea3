//! Integration tests for self-rotation of config tokens
//!
//! A config's privileged token is rotated once it is inside its rotation
//! window. Rotation persists the replacement, drops the cached client and
//! optionally revokes the replaced token.

use chrono::{TimeDelta, Utc};
use gitlab_secrets_credential::prelude::*;
use gitlab_secrets_credential::storage::MemoryKvStore;
use gitlab_secrets_credential::testing::{InMemoryClientFactory, InMemoryGitlab, RecordingEventSink};
use gitlab_secrets_credential::ProviderError;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 3600);

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

/// Helper to create an engine over a provider whose current token (id 7)
/// expires after `expires_in`
fn create_harness(expires_in: TimeDelta) -> Harness {
    gitlab_secrets_log::init_test();
    let now = Utc::now();
    let gitlab = InMemoryGitlab::new()
        .with_current_token(7, 1, now - TimeDelta::days(90), Some(now + expires_in))
        .with_project("group/app", 31);
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

/// Helper to write config `name` with a 24h window
async fn write_config(h: &Harness, name: &str, revoke_old: bool) {
    h.engine
        .write_config(
            &RequestContext::new(),
            name,
            WriteConfigRequest {
                base_url: "https://gitlab.example.com".into(),
                token: SecretString::new("glpat-root"),
                auto_rotate: true,
                auto_rotate_before: Some(DAY),
                revoke_auto_rotated_token: Some(revoke_old),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_token_far_from_expiry_is_left_alone() {
    // GIVEN: A config whose token expires in 100 days with a 24h window
    let h = create_harness(TimeDelta::days(100));
    write_config(&h, "default", false).await;
    h.gitlab().reset_calls();
    let builds = h.factory.builds();

    // WHEN: The scheduler evaluates it
    let outcome = h
        .engine
        .scheduler()
        .maybe_rotate(&RequestContext::new(), "default", Utc::now())
        .await
        .unwrap();

    // THEN: Nothing happens and the provider is never contacted
    assert_eq!(outcome, None);
    assert_eq!(h.gitlab().total_calls(), 0);
    assert_eq!(h.factory.builds(), builds);
}

#[tokio::test]
async fn test_token_inside_window_is_rotated_once() {
    // GIVEN: A config whose token expires in one hour
    let h = create_harness(TimeDelta::hours(1));
    write_config(&h, "default", false).await;
    let ctx = RequestContext::new();

    // WHEN: The scheduler evaluates it
    let outcome = h
        .engine
        .scheduler()
        .maybe_rotate(&ctx, "default", Utc::now())
        .await
        .unwrap()
        .unwrap();

    // THEN: Exactly one rotation call replaced the token
    assert_eq!(h.gitlab().calls("rotate_current_token"), 1);
    assert_eq!(outcome.old_token_id, 7);
    assert_ne!(outcome.new_token_id, 7);
    assert!(!outcome.old_token_revoked);

    // AND: The replacement is persisted and used for the next client
    let view = h.engine.read_config(&ctx, "default").await.unwrap().unwrap();
    assert_eq!(view.token_id, outcome.new_token_id);
    assert_eq!(view.token_expires_at, Some(outcome.expires_at));

    let replacement = h.gitlab().token(outcome.new_token_id).unwrap();
    assert!(replacement.name.starts_with("vault-root-rotated-"));
    assert_eq!(replacement.scopes, vec!["api", "self_rotate"]);
    assert!(h.gitlab().is_active(7));

    // AND: The event carries both token ids
    let events = h.events.events();
    let rotate = events
        .iter()
        .find(|e| e.event_type == "config-token-rotate")
        .unwrap();
    assert_eq!(rotate.metadata["old_token_id"], "7");
    assert_eq!(
        rotate.metadata["new_token_id"],
        outcome.new_token_id.to_string()
    );
}

#[tokio::test]
async fn test_rotated_token_keeps_previous_lifetime() {
    // GIVEN: A token created 90 days ago that expires in an hour
    let h = create_harness(TimeDelta::hours(1));
    write_config(&h, "default", false).await;
    let now = Utc::now();

    // WHEN: It is rotated
    let outcome = h
        .engine
        .scheduler()
        .maybe_rotate(&RequestContext::new(), "default", now)
        .await
        .unwrap()
        .unwrap();

    // THEN: The replacement lives about as long, rounded up to a midnight
    let lifetime = outcome.expires_at - now;
    assert!(lifetime >= TimeDelta::days(90));
    assert!(lifetime <= TimeDelta::days(92));
    assert_eq!(outcome.expires_at.timestamp() % 86_400, 0);
}

#[tokio::test]
async fn test_rotation_revokes_old_token_when_configured() {
    // GIVEN: A due config that asks for the old token to be revoked
    let h = create_harness(TimeDelta::hours(1));
    write_config(&h, "default", true).await;

    // WHEN: It is rotated
    let outcome = h
        .engine
        .scheduler()
        .maybe_rotate(&RequestContext::new(), "default", Utc::now())
        .await
        .unwrap()
        .unwrap();

    // THEN: The old token is gone and the new one active
    assert!(outcome.old_token_revoked);
    assert!(!h.gitlab().is_active(7));
    assert!(h.gitlab().is_active(outcome.new_token_id));
}

#[tokio::test]
async fn test_failed_revoke_of_old_token_does_not_fail_rotation() {
    let h = create_harness(TimeDelta::hours(1));
    write_config(&h, "default", true).await;
    h.gitlab().fail_next(
        "revoke_personal_access_token",
        ProviderError::Transport("connection reset".into()),
    );

    let outcome = h
        .engine
        .scheduler()
        .maybe_rotate(&RequestContext::new(), "default", Utc::now())
        .await
        .unwrap()
        .unwrap();

    assert!(!outcome.old_token_revoked);
    assert!(h.gitlab().is_active(7));
}

#[tokio::test]
async fn test_disabled_auto_rotate_is_skipped() {
    // GIVEN: A due config with auto-rotation switched off
    let h = create_harness(TimeDelta::hours(1));
    write_config(&h, "default", false).await;
    let ctx = RequestContext::new();
    h.engine
        .patch_config(
            &ctx,
            "default",
            PatchConfigRequest {
                auto_rotate: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.gitlab().reset_calls();

    // WHEN: The periodic hook runs
    let report = h.engine.periodic(&ctx).await.unwrap();

    // THEN: It is skipped
    assert_eq!(
        report.outcomes.get("default"),
        Some(&PeriodicOutcome::Skipped)
    );
    assert_eq!(h.gitlab().total_calls(), 0);
}

#[tokio::test]
async fn test_manual_rotation_ignores_window() {
    // GIVEN: A config far from expiry
    let h = create_harness(TimeDelta::days(100));
    write_config(&h, "default", false).await;
    let ctx = RequestContext::new();

    // WHEN: The operator rotates it explicitly
    let outcome = h.engine.rotate_config_token(&ctx, "default").await.unwrap();

    // THEN: It is rotated anyway
    assert_eq!(h.gitlab().calls("rotate_current_token"), 1);
    let view = h.engine.read_config(&ctx, "default").await.unwrap().unwrap();
    assert_eq!(view.token_id, outcome.new_token_id);
}

#[tokio::test]
async fn test_manual_rotation_of_missing_config() {
    let h = create_harness(TimeDelta::days(100));

    let err = h
        .engine
        .rotate_config_token(&RequestContext::new(), "missing")
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NotConfigured { .. }));
}

#[tokio::test]
async fn test_rotation_rebuilds_cached_client_with_new_token() {
    // GIVEN: A due config whose client is cached by a previous issuance
    let h = create_harness(TimeDelta::hours(1));
    write_config(&h, "default", false).await;
    let ctx = RequestContext::new();
    h.engine
        .write_role(
            &ctx,
            RoleRequest {
                role_name: "ci".into(),
                path: "group/app".into(),
                name: "ci".into(),
                token_type: "project".into(),
                access_level: "guest".into(),
                scopes: vec!["read_api".into()],
                ttl: Some(Duration::from_secs(3600)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.engine.issue_token(&ctx, "ci").await.unwrap();

    // WHEN: The token is rotated and another token issued
    let outcome = h
        .engine
        .scheduler()
        .maybe_rotate(&ctx, "default", Utc::now())
        .await
        .unwrap()
        .unwrap();
    h.engine.issue_token(&ctx, "ci").await.unwrap();

    // THEN: The client used afterwards was built with the replacement token
    let expected = SecretString::new(format!("glpat-{:020}", outcome.new_token_id));
    assert_eq!(h.factory.last_token(), Some(expected));
}

#[tokio::test]
async fn test_periodic_outcomes_are_independent() {
    // GIVEN: Two due configs and one that is not due
    let h = create_harness(TimeDelta::hours(1));
    write_config(&h, "a", false).await;
    write_config(&h, "b", false).await;
    h.gitlab()
        .set_current_token_expiry(Some(Utc::now() + TimeDelta::days(100)));
    write_config(&h, "c", false).await;

    // AND: A provider that fails the first rotation it sees
    h.gitlab().fail_next(
        "rotate_current_token",
        ProviderError::Api {
            status: 500,
            message: "internal error".into(),
        },
    );

    // WHEN: The periodic pass runs
    let report = h
        .engine
        .scheduler()
        .run_periodic(&RequestContext::new(), Utc::now())
        .await
        .unwrap();

    // THEN: One due config failed, the other rotated and the third was skipped
    assert_eq!(report.rotated().len(), 1);
    assert_eq!(report.failed().len(), 1);
    assert_eq!(report.skipped(), vec!["c"]);
    assert_eq!(h.gitlab().calls("rotate_current_token"), 2);

    // AND: The aggregated result is an error listing only the failure
    match report.into_result() {
        Err(EngineError::Rotation { failures, .. }) => assert_eq!(failures.len(), 1),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_periodic_error_keeps_every_outcome() {
    // GIVEN: Two due configs and one that is not due, with the first rotation failing
    let h = create_harness(TimeDelta::hours(1));
    write_config(&h, "a", false).await;
    write_config(&h, "b", false).await;
    h.gitlab()
        .set_current_token_expiry(Some(Utc::now() + TimeDelta::days(100)));
    write_config(&h, "c", false).await;
    h.gitlab().fail_next(
        "rotate_current_token",
        ProviderError::Transport("connection reset".into()),
    );

    // WHEN: The host's periodic hook runs
    let err = h.engine.periodic(&RequestContext::new()).await.unwrap_err();

    // THEN: The error still carries the configs that rotated or were skipped
    let (failures, report) = match err {
        EngineError::Rotation { failures, report } => (failures, report),
        other => panic!("unexpected error: {other:?}"),
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(report.rotated().len(), 1);
    assert_eq!(report.skipped(), vec!["c"]);
    assert_eq!(report.outcomes.len(), 3);
}

#[tokio::test]
async fn test_periodic_with_nothing_due_succeeds() {
    let h = create_harness(TimeDelta::days(100));
    write_config(&h, "a", false).await;
    write_config(&h, "b", false).await;

    let report = h.engine.periodic(&RequestContext::new()).await.unwrap();

    assert!(report.rotated().is_empty());
    assert_eq!(report.skipped(), vec!["a", "b"]);
}
