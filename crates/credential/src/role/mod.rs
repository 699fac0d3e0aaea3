//! Roles: named templates for minting downstream tokens.

mod entry;
mod store;
pub mod validation;

pub use entry::{Role, RoleRequest, RoleWriteOutcome};
pub use store::RoleStore;
pub use validation::{MIN_ENGINE_OWNED_TTL, RoleLimits, validate_role};
