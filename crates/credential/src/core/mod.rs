//! Core types for engine operations

mod context;
mod error;

pub use context::RequestContext;
pub use error::{
    EngineError, EngineResult, FieldError, FieldErrorKind, ProviderError, StorageError,
    ValidationErrors,
};

// Re-exports from utils
pub use crate::utils::SecretString;
