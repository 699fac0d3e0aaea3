//! Token type matrix
//!
//! Each [`TokenType`] maps to a static [`TokenTypeSpec`] row describing which
//! scopes and access levels it accepts, how its path is shaped, which
//! provider resource owns it and which provider operations create and revoke
//! it.

use super::{AccessLevel, Scope};

string_enum! {
    /// Kind of downstream credential a role mints
    pub enum TokenType rejects UnknownTokenType {
        Personal => "personal",
        Project => "project",
        Group => "group",
        UserServiceAccount => "user-service-account",
        GroupServiceAccount => "group-service-account",
        PipelineProjectTrigger => "pipeline-project-trigger",
        ProjectDeploy => "project-deploy",
        GroupDeploy => "group-deploy",
    }
}

/// Allowed number of `/`-separated path segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRule {
    /// Exactly `n` segments
    Exactly(usize),
    /// At least `n` segments
    AtLeast(usize),
}

impl SegmentRule {
    /// True if `count` satisfies the rule
    #[must_use]
    pub const fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exactly(n) => count == n,
            Self::AtLeast(n) => count >= n,
        }
    }
}

/// Provider resource a token hangs off, resolved from the role path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentKind {
    /// Path is a username
    User,
    /// Path is a full group path
    Group,
    /// Path is a full project path
    Project,
    /// Path is `group/username`
    GroupServiceAccount,
}

/// One row of the token type matrix
#[derive(Debug, Clone, Copy)]
pub struct TokenTypeSpec {
    /// Token type this row describes
    pub token_type: TokenType,
    /// Scopes a role of this type may request
    pub scopes: &'static [Scope],
    /// Access levels a role of this type may request
    pub access_levels: &'static [AccessLevel],
    /// Path segment count rule
    pub segments: SegmentRule,
    /// At least one scope must be given
    pub requires_scopes: bool,
    /// A non-unknown access level must be given
    pub requires_access_level: bool,
    /// The provider can enforce an expiry for this type
    pub provider_expiry: bool,
    /// How the role path resolves to a provider id
    pub parent: ParentKind,
    /// Provider operation used at issuance
    pub create_operation: &'static str,
    /// Provider operation used at revocation
    pub revoke_operation: &'static str,
}

const USER_SCOPES: &[Scope] = &[
    Scope::Api,
    Scope::ReadApi,
    Scope::ReadUser,
    Scope::ReadRepository,
    Scope::WriteRepository,
    Scope::ReadRegistry,
    Scope::WriteRegistry,
    Scope::Sudo,
    Scope::AdminMode,
    Scope::CreateRunner,
    Scope::ManageRunner,
    Scope::AiFeatures,
    Scope::K8sProxy,
    Scope::ReadServicePing,
    Scope::SelfRotate,
    Scope::ReadVirtualRegistry,
    Scope::WriteVirtualRegistry,
];

const RESOURCE_SCOPES: &[Scope] = &[
    Scope::Api,
    Scope::ReadApi,
    Scope::ReadRepository,
    Scope::WriteRepository,
    Scope::ReadRegistry,
    Scope::WriteRegistry,
    Scope::CreateRunner,
    Scope::ManageRunner,
    Scope::AiFeatures,
    Scope::K8sProxy,
    Scope::SelfRotate,
    Scope::ReadObservability,
    Scope::WriteObservability,
];

const DEPLOY_SCOPES: &[Scope] = &[
    Scope::ReadRepository,
    Scope::ReadRegistry,
    Scope::WriteRegistry,
    Scope::ReadPackageRegistry,
    Scope::WritePackageRegistry,
    Scope::ReadVirtualRegistry,
    Scope::WriteVirtualRegistry,
];

const MEMBER_LEVELS: &[AccessLevel] = &[
    AccessLevel::Guest,
    AccessLevel::Planner,
    AccessLevel::Reporter,
    AccessLevel::Developer,
    AccessLevel::Maintainer,
    AccessLevel::Owner,
];

const NO_LEVEL: &[AccessLevel] = &[AccessLevel::Unknown];

static MATRIX: [TokenTypeSpec; 8] = [
    TokenTypeSpec {
        token_type: TokenType::Personal,
        scopes: USER_SCOPES,
        access_levels: NO_LEVEL,
        segments: SegmentRule::Exactly(1),
        requires_scopes: true,
        requires_access_level: false,
        provider_expiry: true,
        parent: ParentKind::User,
        create_operation: "create_personal_access_token",
        revoke_operation: "revoke_personal_access_token",
    },
    TokenTypeSpec {
        token_type: TokenType::Project,
        scopes: RESOURCE_SCOPES,
        access_levels: MEMBER_LEVELS,
        segments: SegmentRule::AtLeast(1),
        requires_scopes: true,
        requires_access_level: true,
        provider_expiry: true,
        parent: ParentKind::Project,
        create_operation: "create_project_access_token",
        revoke_operation: "revoke_project_access_token",
    },
    TokenTypeSpec {
        token_type: TokenType::Group,
        scopes: RESOURCE_SCOPES,
        access_levels: MEMBER_LEVELS,
        segments: SegmentRule::AtLeast(1),
        requires_scopes: true,
        requires_access_level: true,
        provider_expiry: true,
        parent: ParentKind::Group,
        create_operation: "create_group_access_token",
        revoke_operation: "revoke_group_access_token",
    },
    TokenTypeSpec {
        token_type: TokenType::UserServiceAccount,
        scopes: USER_SCOPES,
        access_levels: NO_LEVEL,
        segments: SegmentRule::Exactly(1),
        requires_scopes: true,
        requires_access_level: false,
        provider_expiry: true,
        parent: ParentKind::User,
        create_operation: "create_user_service_account_token",
        revoke_operation: "revoke_user_service_account_token",
    },
    TokenTypeSpec {
        token_type: TokenType::GroupServiceAccount,
        scopes: USER_SCOPES,
        access_levels: NO_LEVEL,
        segments: SegmentRule::Exactly(2),
        requires_scopes: true,
        requires_access_level: false,
        provider_expiry: true,
        parent: ParentKind::GroupServiceAccount,
        create_operation: "create_group_service_account_token",
        revoke_operation: "revoke_group_service_account_token",
    },
    TokenTypeSpec {
        token_type: TokenType::PipelineProjectTrigger,
        scopes: &[],
        access_levels: NO_LEVEL,
        segments: SegmentRule::AtLeast(1),
        requires_scopes: false,
        requires_access_level: false,
        provider_expiry: false,
        parent: ParentKind::Project,
        create_operation: "create_pipeline_project_trigger_token",
        revoke_operation: "revoke_pipeline_project_trigger_token",
    },
    TokenTypeSpec {
        token_type: TokenType::ProjectDeploy,
        scopes: DEPLOY_SCOPES,
        access_levels: NO_LEVEL,
        segments: SegmentRule::AtLeast(1),
        requires_scopes: true,
        requires_access_level: false,
        provider_expiry: true,
        parent: ParentKind::Project,
        create_operation: "create_project_deploy_token",
        revoke_operation: "revoke_project_deploy_token",
    },
    TokenTypeSpec {
        token_type: TokenType::GroupDeploy,
        scopes: DEPLOY_SCOPES,
        access_levels: NO_LEVEL,
        segments: SegmentRule::AtLeast(1),
        requires_scopes: true,
        requires_access_level: false,
        provider_expiry: true,
        parent: ParentKind::Group,
        create_operation: "create_group_deploy_token",
        revoke_operation: "revoke_group_deploy_token",
    },
];

impl TokenType {
    /// Matrix row for this type
    #[must_use]
    pub fn spec(self) -> &'static TokenTypeSpec {
        // Rows are declared in variant order
        &MATRIX[self as usize]
    }
}

impl TokenTypeSpec {
    /// True if `scope` may be requested for this type
    #[must_use]
    pub fn allows_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    /// True if `level` may be requested for this type
    #[must_use]
    pub fn allows_access_level(&self, level: AccessLevel) -> bool {
        self.access_levels.contains(&level)
    }

    /// Scopes from `requested` this type does not accept, in request order
    #[must_use]
    pub fn disallowed_scopes(&self, requested: &[Scope]) -> Vec<Scope> {
        requested
            .iter()
            .copied()
            .filter(|s| !self.allows_scope(*s))
            .collect()
    }
}
