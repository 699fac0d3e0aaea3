//! In-memory collaborators
//!
//! [`InMemoryGitlab`] is a stateful stand-in for the provider: it resolves
//! seeded users, groups and projects, mints and revokes tokens, counts calls
//! per operation and can be told to fail the next call of an operation.
//! [`InMemoryClientFactory`] hands it out for every config, and
//! [`RecordingEventSink`] keeps every event the engine sends.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::ConfigEntry;
use crate::core::{ProviderError, SecretString};
use crate::traits::{
    CreateTokenRequest, CurrentTokenInfo, EventSink, ProviderClient, ProviderClientFactory,
    ProviderMetadata, ProviderToken, RotateTokenRequest,
};

/// A token held by [`InMemoryGitlab`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeToken {
    pub token_id: i64,
    /// Create operation that minted it
    pub kind: &'static str,
    /// User, group or project the token belongs to
    pub parent_id: i64,
    pub user_id: Option<i64>,
    pub name: String,
    pub scopes: Vec<String>,
    pub access_level: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Debug, Default)]
struct GitlabState {
    next_id: i64,
    users: HashMap<String, i64>,
    groups: HashMap<String, i64>,
    projects: HashMap<String, i64>,
    current: Option<i64>,
    current_user: i64,
    tokens: HashMap<i64, FakeToken>,
    calls: HashMap<&'static str, u64>,
    failures: HashMap<&'static str, ProviderError>,
    latency: Option<Duration>,
    metadata: ProviderMetadata,
}

/// Stateful fake provider
#[derive(Debug)]
pub struct InMemoryGitlab {
    state: Mutex<GitlabState>,
}

impl InMemoryGitlab {
    /// Empty provider with no users, groups, projects or current token
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GitlabState {
                next_id: 1000,
                metadata: ProviderMetadata {
                    version: "17.4.0".to_string(),
                    revision: "a1b2c3d4".to_string(),
                    is_enterprise: false,
                },
                ..GitlabState::default()
            }),
        }
    }

    /// Seed a user
    pub fn with_user(self, username: &str, id: i64) -> Self {
        self.state.lock().users.insert(username.to_string(), id);
        self
    }

    /// Seed a group
    pub fn with_group(self, path: &str, id: i64) -> Self {
        self.state.lock().groups.insert(path.to_string(), id);
        self
    }

    /// Seed a project
    pub fn with_project(self, path: &str, id: i64) -> Self {
        self.state.lock().projects.insert(path.to_string(), id);
        self
    }

    /// Seed the privileged token clients authenticate with
    pub fn with_current_token(
        self,
        token_id: i64,
        user_id: i64,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        {
            let mut state = self.state.lock();
            state.current = Some(token_id);
            state.current_user = user_id;
            state.tokens.insert(
                token_id,
                FakeToken {
                    token_id,
                    kind: "personal",
                    parent_id: user_id,
                    user_id: Some(user_id),
                    name: "vault-root".to_string(),
                    scopes: vec!["api".to_string(), "self_rotate".to_string()],
                    access_level: String::new(),
                    created_at,
                    expires_at,
                    active: true,
                },
            );
        }
        self
    }

    /// Report an enterprise instance
    pub fn with_enterprise(self, is_enterprise: bool) -> Self {
        self.state.lock().metadata.is_enterprise = is_enterprise;
        self
    }

    /// Make every call wait `latency` before answering
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Fail the next call of `operation` with `error`
    pub fn fail_next(&self, operation: &'static str, error: ProviderError) {
        self.state.lock().failures.insert(operation, error);
    }

    /// Number of calls made to `operation`
    pub fn calls(&self, operation: &str) -> u64 {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Number of calls made to any operation
    pub fn total_calls(&self) -> u64 {
        self.state.lock().calls.values().sum()
    }

    /// Forget all call counts
    pub fn reset_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Token `token_id`, active or not
    pub fn token(&self, token_id: i64) -> Option<FakeToken> {
        self.state.lock().tokens.get(&token_id).cloned()
    }

    /// True while token `token_id` exists and has not been revoked
    pub fn is_active(&self, token_id: i64) -> bool {
        self.token(token_id).is_some_and(|t| t.active)
    }

    /// Number of active tokens, the current one included
    pub fn active_tokens(&self) -> usize {
        self.state.lock().tokens.values().filter(|t| t.active).count()
    }

    /// Id of the privileged token
    pub fn current_token_id(&self) -> Option<i64> {
        self.state.lock().current
    }

    /// Move the privileged token's expiry
    pub fn set_current_token_expiry(&self, expires_at: Option<DateTime<Utc>>) {
        let mut state = self.state.lock();
        if let Some(id) = state.current
            && let Some(token) = state.tokens.get_mut(&id)
        {
            token.expires_at = expires_at;
        }
    }

    async fn enter(&self, operation: &'static str) -> Result<(), ProviderError> {
        let (latency, failure) = {
            let mut state = self.state.lock();
            *state.calls.entry(operation).or_default() += 1;
            (state.latency, state.failures.remove(operation))
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        failure.map_or(Ok(()), Err)
    }

    fn lookup(
        map: &HashMap<String, i64>,
        what: &str,
        key: &str,
    ) -> Result<i64, ProviderError> {
        map.get(key)
            .copied()
            .ok_or_else(|| ProviderError::NotFound(format!("{what} '{key}'")))
    }

    fn mint(
        &self,
        kind: &'static str,
        parent_id: i64,
        user_id: Option<i64>,
        request: &CreateTokenRequest,
    ) -> ProviderToken {
        let scopes: Vec<String> = request.scopes.iter().map(ToString::to_string).collect();
        self.insert(FakeToken {
            token_id: 0,
            kind,
            parent_id,
            user_id,
            name: request.name.clone(),
            scopes,
            access_level: request.access_level.to_string(),
            created_at: Utc::now(),
            expires_at: Some(request.expires_at),
            active: true,
        })
    }

    fn insert(&self, mut token: FakeToken) -> ProviderToken {
        let mut state = self.state.lock();
        state.next_id += 1;
        token.token_id = state.next_id;

        let minted = ProviderToken {
            token: SecretString::new(format!("glpat-{:020}", token.token_id)),
            token_id: token.token_id,
            name: token.name.clone(),
            scopes: token.scopes.clone(),
            created_at: token.created_at,
            expires_at: token.expires_at,
        };
        state.tokens.insert(token.token_id, token);
        minted
    }

    fn revoke(
        &self,
        kind: &'static str,
        parent_id: Option<i64>,
        token_id: i64,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        match state.tokens.get_mut(&token_id) {
            Some(token)
                if token.active
                    && token.kind == kind
                    && parent_id.is_none_or(|id| id == token.parent_id) =>
            {
                token.active = false;
                Ok(())
            }
            _ => Err(ProviderError::NotFound(format!("token {token_id}"))),
        }
    }
}

impl Default for InMemoryGitlab {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for InMemoryGitlab {
    async fn current_token_info(&self) -> Result<CurrentTokenInfo, ProviderError> {
        self.enter("current_token_info").await?;
        let state = self.state.lock();
        let token = state
            .current
            .and_then(|id| state.tokens.get(&id))
            .ok_or(ProviderError::Unauthorized)?;
        Ok(CurrentTokenInfo {
            token_id: token.token_id,
            name: token.name.clone(),
            user_id: state.current_user,
            scopes: token.scopes.clone(),
            created_at: token.created_at,
            expires_at: token.expires_at,
            active: token.active,
        })
    }

    async fn rotate_current_token(
        &self,
        request: &RotateTokenRequest,
    ) -> Result<ProviderToken, ProviderError> {
        self.enter("rotate_current_token").await?;
        let user_id = {
            let state = self.state.lock();
            if state.current.is_none() {
                return Err(ProviderError::Unauthorized);
            }
            state.current_user
        };

        let rotated = self.insert(FakeToken {
            token_id: 0,
            kind: "personal",
            parent_id: user_id,
            user_id: Some(user_id),
            name: request.name.clone(),
            scopes: request.scopes.clone(),
            access_level: String::new(),
            created_at: Utc::now(),
            expires_at: Some(request.expires_at),
            active: true,
        });
        self.state.lock().current = Some(rotated.token_id);
        Ok(rotated)
    }

    async fn metadata(&self) -> Result<ProviderMetadata, ProviderError> {
        self.enter("metadata").await?;
        Ok(self.state.lock().metadata.clone())
    }

    async fn get_user_id_by_username(&self, username: &str) -> Result<i64, ProviderError> {
        self.enter("get_user_id_by_username").await?;
        Self::lookup(&self.state.lock().users, "user", username)
    }

    async fn get_group_id_by_path(&self, path: &str) -> Result<i64, ProviderError> {
        self.enter("get_group_id_by_path").await?;
        Self::lookup(&self.state.lock().groups, "group", path)
    }

    async fn get_project_id_by_path(&self, path: &str) -> Result<i64, ProviderError> {
        self.enter("get_project_id_by_path").await?;
        Self::lookup(&self.state.lock().projects, "project", path)
    }

    async fn create_personal_access_token(
        &self,
        user_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError> {
        self.enter("create_personal_access_token").await?;
        Ok(self.mint("personal", user_id, Some(user_id), request))
    }

    async fn create_group_access_token(
        &self,
        group_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError> {
        self.enter("create_group_access_token").await?;
        Ok(self.mint("group", group_id, None, request))
    }

    async fn create_project_access_token(
        &self,
        project_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError> {
        self.enter("create_project_access_token").await?;
        Ok(self.mint("project", project_id, None, request))
    }

    async fn create_group_service_account_token(
        &self,
        group_id: i64,
        user_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError> {
        self.enter("create_group_service_account_token").await?;
        Ok(self.mint("group-service-account", group_id, Some(user_id), request))
    }

    async fn create_user_service_account_token(
        &self,
        user_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError> {
        self.enter("create_user_service_account_token").await?;
        Ok(self.mint("user-service-account", user_id, Some(user_id), request))
    }

    async fn create_pipeline_project_trigger_token(
        &self,
        project_id: i64,
        description: &str,
    ) -> Result<ProviderToken, ProviderError> {
        self.enter("create_pipeline_project_trigger_token").await?;
        Ok(self.insert(FakeToken {
            token_id: 0,
            kind: "pipeline-project-trigger",
            parent_id: project_id,
            user_id: None,
            name: description.to_string(),
            scopes: Vec::new(),
            access_level: String::new(),
            created_at: Utc::now(),
            expires_at: None,
            active: true,
        }))
    }

    async fn create_project_deploy_token(
        &self,
        project_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError> {
        self.enter("create_project_deploy_token").await?;
        Ok(self.mint("project-deploy", project_id, None, request))
    }

    async fn create_group_deploy_token(
        &self,
        group_id: i64,
        request: &CreateTokenRequest,
    ) -> Result<ProviderToken, ProviderError> {
        self.enter("create_group_deploy_token").await?;
        Ok(self.mint("group-deploy", group_id, None, request))
    }

    async fn revoke_personal_access_token(&self, token_id: i64) -> Result<(), ProviderError> {
        self.enter("revoke_personal_access_token").await?;
        self.revoke("personal", None, token_id)
    }

    async fn revoke_group_access_token(
        &self,
        group_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError> {
        self.enter("revoke_group_access_token").await?;
        self.revoke("group", Some(group_id), token_id)
    }

    async fn revoke_project_access_token(
        &self,
        project_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError> {
        self.enter("revoke_project_access_token").await?;
        self.revoke("project", Some(project_id), token_id)
    }

    async fn revoke_group_service_account_token(
        &self,
        group_id: i64,
        _user_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError> {
        self.enter("revoke_group_service_account_token").await?;
        self.revoke("group-service-account", Some(group_id), token_id)
    }

    async fn revoke_user_service_account_token(
        &self,
        user_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError> {
        self.enter("revoke_user_service_account_token").await?;
        self.revoke("user-service-account", Some(user_id), token_id)
    }

    async fn revoke_pipeline_project_trigger_token(
        &self,
        project_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError> {
        self.enter("revoke_pipeline_project_trigger_token").await?;
        self.revoke("pipeline-project-trigger", Some(project_id), token_id)
    }

    async fn revoke_project_deploy_token(
        &self,
        project_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError> {
        self.enter("revoke_project_deploy_token").await?;
        self.revoke("project-deploy", Some(project_id), token_id)
    }

    async fn revoke_group_deploy_token(
        &self,
        group_id: i64,
        token_id: i64,
    ) -> Result<(), ProviderError> {
        self.enter("revoke_group_deploy_token").await?;
        self.revoke("group-deploy", Some(group_id), token_id)
    }
}

/// Factory handing out one shared [`InMemoryGitlab`] for every config
#[derive(Debug)]
pub struct InMemoryClientFactory {
    gitlab: Arc<InMemoryGitlab>,
    builds: AtomicU64,
    tokens: Mutex<Vec<SecretString>>,
    failure: Mutex<Option<ProviderError>>,
}

impl InMemoryClientFactory {
    /// Hand out `gitlab`
    pub fn new(gitlab: Arc<InMemoryGitlab>) -> Self {
        Self {
            gitlab,
            builds: AtomicU64::new(0),
            tokens: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// The shared provider
    pub fn gitlab(&self) -> &Arc<InMemoryGitlab> {
        &self.gitlab
    }

    /// Number of clients built
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::SeqCst)
    }

    /// Token of the most recently built client
    pub fn last_token(&self) -> Option<SecretString> {
        self.tokens.lock().last().cloned()
    }

    /// Fail the next build with `error`
    pub fn fail_next_build(&self, error: ProviderError) {
        *self.failure.lock() = Some(error);
    }
}

impl Default for InMemoryClientFactory {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryGitlab::new()))
    }
}

impl ProviderClientFactory for InMemoryClientFactory {
    fn build(&self, entry: &ConfigEntry) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        if let Some(error) = self.failure.lock().take() {
            return Err(error);
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().push(entry.token.clone());
        Ok(Arc::clone(&self.gitlab) as Arc<dyn ProviderClient>)
    }
}

/// One event captured by [`RecordingEventSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub event_type: String,
    pub metadata: HashMap<String, String>,
}

/// Event sink that keeps every event, or rejects every event
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
    failing: bool,
}

impl RecordingEventSink {
    /// Sink that records
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that rejects every event
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    /// Events received so far
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Event types received so far, in order
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn send_event(
        &self,
        event_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), String> {
        if self.failing {
            return Err("event sink unavailable".to_string());
        }
        self.events.lock().push(RecordedEvent {
            event_type: event_type.to_string(),
            metadata,
        });
        Ok(())
    }
}
