//! Type matrix: access levels, scopes, token types and path rules
//!
//! Every downstream token kind is described by one row of
//! [`TokenTypeSpec`]; validation and issuance both read from that table.

/// Define a closed string enum with parse/display/serde support.
///
/// Unrecognised strings are rejected with the given [`EngineError`] variant.
///
/// [`EngineError`]: crate::core::EngineError
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident rejects $err:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $text:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Every variant in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical wire string
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Parse the canonical wire string
            pub fn parse(value: &str) -> $crate::core::EngineResult<Self> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::core::EngineError::$err {
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::core::EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::core::EngineError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }
    };
}

pub mod access_level;
pub mod gitlab_type;
pub mod path;
pub mod scope;
pub mod token_type;

pub use access_level::AccessLevel;
pub use gitlab_type::GitlabType;
pub use path::validate_path;
pub use scope::Scope;
pub use token_type::{ParentKind, SegmentRule, TokenType, TokenTypeSpec};
