//! Tenant configs: the engine's privileged credential per provider instance.

mod entry;
mod store;

pub use entry::{
    ConfigEntry, ConfigView, DEFAULT_AUTO_ROTATE_BEFORE, MAX_AUTO_ROTATE_BEFORE,
    MIN_AUTO_ROTATE_BEFORE, PatchConfigRequest, WriteConfigRequest,
};
pub use store::ConfigStore;
