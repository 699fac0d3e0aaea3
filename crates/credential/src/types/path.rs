//! Path shape rules for role paths

use std::sync::LazyLock;

use regex::Regex;

use super::TokenType;

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("segment pattern compiles"));

const FORBIDDEN_EDGES: [char; 3] = ['-', '_', '.'];
const FORBIDDEN_SUFFIXES: [&str; 2] = [".git", ".atom"];

/// Check that `path` names a valid provider resource for `token_type`.
///
/// Pure predicate: whitespace-only paths, empty segments, segments starting
/// or ending with `-`, `_` or `.`, and paths ending in `.git` or `.atom` are
/// rejected. The number of `/`-separated segments must satisfy the type's
/// [`SegmentRule`](super::SegmentRule).
///
/// ```
/// use gitlab_secrets_credential::types::{TokenType, validate_path};
///
/// assert!(validate_path("admin-user", TokenType::Personal));
/// assert!(!validate_path("-user", TokenType::Personal));
/// assert!(validate_path("group1/account2", TokenType::GroupServiceAccount));
/// assert!(!validate_path("group1", TokenType::GroupServiceAccount));
/// ```
#[must_use]
pub fn validate_path(path: &str, token_type: TokenType) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.ends_with(FORBIDDEN_EDGES) || FORBIDDEN_SUFFIXES.iter().any(|s| path.ends_with(s)) {
        return false;
    }

    let segments: Vec<&str> = path.split('/').collect();
    if !token_type.spec().segments.accepts(segments.len()) {
        return false;
    }

    segments.iter().all(|segment| valid_segment(segment))
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.starts_with(FORBIDDEN_EDGES)
        && !segment.ends_with(FORBIDDEN_EDGES)
        && SEGMENT.is_match(segment)
}
