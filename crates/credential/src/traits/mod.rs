//! Collaborator traits
//!
//! The engine talks to its host through [`KvStore`] and [`EventSink`] and to
//! the identity provider through [`ProviderClient`]. All three are object
//! safe and shared as `Arc<dyn _>`.

mod events;
mod provider;
mod storage;

pub use events::{EventSink, NoopEventSink};
pub use provider::{
    CreateTokenRequest, CurrentTokenInfo, ProviderClient, ProviderClientFactory, ProviderMetadata,
    ProviderToken, RotateTokenRequest,
};
pub use storage::KvStore;
