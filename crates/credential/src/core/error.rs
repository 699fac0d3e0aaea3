//! Error types for engine operations
//!
//! This module defines the error hierarchy used across the engine:
//! - [`EngineError`]: top-level error returned by every public operation
//! - [`ValidationErrors`]: accumulated field errors of a single write attempt
//! - [`ProviderError`]: failures reported by a [`ProviderClient`](crate::traits::ProviderClient)
//! - [`StorageError`]: failures reported by the host [`KvStore`](crate::traits::KvStore)
//!
//! Validation never short-circuits: every failing field of one write attempt
//! is reported as its own entry.
//!
//! ```
//! use gitlab_secrets_credential::core::{FieldErrorKind, ValidationErrors};
//!
//! let mut errors = ValidationErrors::new();
//! errors.required("path");
//! errors.required("name");
//! errors.push("token_type", FieldErrorKind::UnknownTokenType, "unknown token type 'bogus'");
//! assert_eq!(errors.len(), 3);
//! assert!(errors.into_result().is_err());
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::rotation::PeriodicReport;
use crate::template::TemplateError;

/// Top-level engine error
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required collaborator or argument is missing
    #[error("required value is missing: {what}")]
    NilValue {
        /// What was missing
        what: String,
    },

    /// A value failed a range or format check
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// A mandatory field is absent
    #[error("{field}: field is required")]
    FieldRequired {
        /// Missing field
        field: String,
    },

    /// A value is present but not allowed in its context
    #[error("{field}: invalid value: {reason}")]
    FieldInvalidValue {
        /// Offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Unrecognized enum value for a generic type field
    #[error("unknown type '{value}'")]
    UnknownType {
        /// Raw value
        value: String,
    },

    /// Unrecognized token type
    #[error("unknown token type '{value}'")]
    UnknownTokenType {
        /// Raw value
        value: String,
    },

    /// Unrecognized token scope
    #[error("unknown token scope '{value}'")]
    UnknownTokenScope {
        /// Raw value
        value: String,
    },

    /// Unrecognized access level
    #[error("unknown access level '{value}'")]
    UnknownAccessLevel {
        /// Raw value
        value: String,
    },

    /// The operation requires a config that does not exist
    #[error("backend not configured: config '{name}' does not exist")]
    NotConfigured {
        /// Config name that was looked up
        name: String,
    },

    /// Role does not exist
    #[error("role '{name}' not found")]
    RoleNotFound {
        /// Role name that was looked up
        name: String,
    },

    /// The provider no longer knows the token
    #[error("access token {token_id} not found")]
    AccessTokenNotFound {
        /// Provider token id
        token_id: i64,
    },

    /// One or more field validations failed
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// A provider call failed
    #[error("provider operation '{operation}' failed: {source}")]
    Provider {
        /// Name of the provider operation that was attempted
        operation: &'static str,
        /// Underlying provider error
        #[source]
        source: ProviderError,
    },

    /// A host storage call failed
    #[error("storage operation on '{key}' failed: {source}")]
    Storage {
        /// Storage key
        key: String,
        /// Underlying storage error
        #[source]
        source: StorageError,
    },

    /// Stored or handed-back data could not be (de)serialized
    #[error("failed to decode '{key}': {source}")]
    Serialization {
        /// Storage key or payload name
        key: String,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// Name template could not be parsed or rendered
    #[error("name template error: {0}")]
    Template(#[from] TemplateError),

    /// The caller cancelled the request
    #[error("operation cancelled")]
    Cancelled,

    /// The request deadline elapsed
    #[error("deadline of {timeout:?} exceeded")]
    DeadlineExceeded {
        /// Budget that was exceeded
        timeout: Duration,
    },

    /// Periodic rotation failed for at least one config
    #[error("token rotation failed for {} config(s): {}", .failures.len(), .failures.join("; "))]
    Rotation {
        /// One message per failed config
        failures: Vec<String>,
        /// Every config's outcome, including those that rotated or were skipped
        report: Box<PeriodicReport>,
    },
}

impl EngineError {
    /// Wrap a provider error with the operation that produced it
    pub fn provider(operation: &'static str, source: ProviderError) -> Self {
        Self::Provider { operation, source }
    }

    /// Wrap a storage error with the key that was accessed
    pub fn storage(key: impl Into<String>, source: StorageError) -> Self {
        Self::Storage {
            key: key.into(),
            source,
        }
    }

    /// Returns the accumulated validation errors, if this is a validation failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// True if the provider reported the target as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::AccessTokenNotFound { .. } => true,
            Self::Provider { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Classification of a single field error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldErrorKind {
    /// Mandatory field absent
    FieldRequired,
    /// Present but not allowed in this context
    FieldInvalidValue,
    /// Failed a range or format check
    InvalidValue,
    /// Token type did not parse
    UnknownTokenType,
    /// One or more scopes did not parse
    UnknownTokenScope,
    /// Access level did not parse
    UnknownAccessLevel,
    /// Generic enum value did not parse
    UnknownType,
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FieldRequired => "field is required",
            Self::FieldInvalidValue => "invalid value",
            Self::InvalidValue => "invalid value",
            Self::UnknownTokenType => "unknown token type",
            Self::UnknownTokenScope => "unknown token scope",
            Self::UnknownAccessLevel => "unknown access level",
            Self::UnknownType => "unknown type",
        };
        f.write_str(label)
    }
}

/// A single field validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Field path, e.g. `access_level`
    pub field: String,
    /// Error classification
    pub kind: FieldErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.field, self.kind, self.message)
    }
}

/// Collection of field errors from one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Creates an empty collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error
    pub fn push(
        &mut self,
        field: impl Into<String>,
        kind: FieldErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Adds a `FieldRequired` error
    pub fn required(&mut self, field: impl Into<String>) {
        self.push(field, FieldErrorKind::FieldRequired, "missing");
    }

    /// Number of distinct errors
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True if nothing failed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// All errors in insertion order
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Errors of a given kind
    pub fn of_kind(&self, kind: FieldErrorKind) -> impl Iterator<Item = &FieldError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    /// Errors reported for a given field
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> {
        self.errors.iter().filter(move |e| e.field == field)
    }

    /// `Ok(())` if empty, otherwise `Err(self)`
    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s) occurred:", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n\t* {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Errors reported by the identity provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Target resource does not exist (HTTP 404)
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials were rejected (HTTP 401/403)
    #[error("unauthorized")]
    Unauthorized,

    /// Any other API failure
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response message
        message: String,
    },

    /// The request never reached the provider
    #[error("transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    /// True for a 404-equivalent response
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors reported by the host key/value store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Backend failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_accumulate() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());

        errors.required("path");
        errors.required("name");
        errors.push(
            "access_level",
            FieldErrorKind::FieldInvalidValue,
            "should be one of [guest]",
        );

        assert_eq!(errors.len(), 3);
        assert_eq!(errors.of_kind(FieldErrorKind::FieldRequired).count(), 2);
        assert_eq!(errors.for_field("access_level").count(), 1);
    }

    #[test]
    fn test_validation_errors_display_lists_every_entry() {
        let mut errors = ValidationErrors::new();
        errors.required("path");
        errors.push("ttl", FieldErrorKind::InvalidValue, "below 1h");

        let rendered = errors.to_string();
        assert!(rendered.starts_with("2 validation error(s) occurred:"));
        assert!(rendered.contains("path: field is required"));
        assert!(rendered.contains("ttl: invalid value: below 1h"));
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let mut errors = ValidationErrors::new();
        errors.required("token_type");
        let err = errors.into_result().unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn test_provider_error_not_found() {
        let err = EngineError::provider(
            "revoke_personal_access_token",
            ProviderError::NotFound("token 7".into()),
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("revoke_personal_access_token"));

        let err = EngineError::provider("metadata", ProviderError::Unauthorized);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_engine_error_exposes_validation_errors() {
        let mut errors = ValidationErrors::new();
        errors.required("path");
        let err = EngineError::from(errors);
        assert_eq!(err.validation_errors().map(ValidationErrors::len), Some(1));
        assert!(EngineError::Cancelled.validation_errors().is_none());
    }
}
