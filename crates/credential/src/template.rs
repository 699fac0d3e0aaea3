//! Token name templates
//!
//! A minimal template language for rendering the display name of issued
//! tokens. Actions are delimited by `{{` and `}}` and are either a field
//! reference (`{{ .role_name }}`) or a helper call with literal or field
//! arguments (`{{ stringsJoin .scopes "-" }}`). Only the helpers below are
//! available; nothing else of the host is reachable from a template.
//!
//! | Helper | Arguments | Result |
//! |---|---|---|
//! | `randHexString` | byte count (1..=64) | random lowercase hex, two chars per byte |
//! | `stringsJoin` | list, separator | joined list |
//! | `timeNowFormat` | strftime layout | current UTC time |
//! | `yesNoBool` | bool | `yes` or `no` |
//!
//! ```
//! use gitlab_secrets_credential::template::{NameTemplate, TemplateData};
//!
//! let template = NameTemplate::parse("{{ .role_name }}-{{ yesNoBool .gitlab_revokes_token }}").unwrap();
//! let data = TemplateData {
//!     role_name: "ci".into(),
//!     gitlab_revokes_token: true,
//!     ..TemplateData::default()
//! };
//! assert_eq!(template.render(&data).unwrap(), "ci-yes");
//! ```

use std::fmt::{self, Write as _};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use rand::RngCore;
use thiserror::Error;

/// Name template used when a role does not set one
pub const DEFAULT_NAME_TEMPLATE: &str =
    "vault-generated-{{ .token_type }}-access-token-{{ randHexString 4 }}";

const MAX_RANDOM_BYTES: i64 = 64;

/// Template parse or render failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// `{{` without a matching `}}`
    #[error("unclosed action starting at byte {offset}")]
    Unclosed {
        /// Byte offset of the opening delimiter
        offset: usize,
    },

    /// `{{ }}` with nothing inside
    #[error("empty action at byte {offset}")]
    EmptyAction {
        /// Byte offset of the opening delimiter
        offset: usize,
    },

    /// String literal without closing quote
    #[error("unterminated string literal in action '{action}'")]
    UnterminatedString {
        /// Action source
        action: String,
    },

    /// Reference to a field that does not exist
    #[error("unknown field '.{name}'")]
    UnknownField {
        /// Field name without the leading dot
        name: String,
    },

    /// Call of a helper that does not exist
    #[error("unknown function '{name}'")]
    UnknownHelper {
        /// Helper name
        name: String,
    },

    /// Wrong number of helper arguments
    #[error("{helper} expects {expected} argument(s), got {got}")]
    Arity {
        /// Helper name
        helper: &'static str,
        /// Expected count
        expected: usize,
        /// Given count
        got: usize,
    },

    /// Argument of the wrong kind
    #[error("{helper}: argument {position} must be {expected}")]
    ArgumentType {
        /// Helper name
        helper: &'static str,
        /// 1-based argument index
        position: usize,
        /// Expected kind
        expected: &'static str,
    },

    /// `randHexString` length out of range
    #[error("randHexString length {value} is outside 1..={max}")]
    RandomLength {
        /// Requested length
        value: i64,
        /// Upper bound
        max: i64,
    },

    /// Malformed argument token
    #[error("cannot parse argument '{token}'")]
    BadArgument {
        /// Offending token
        token: String,
    },

    /// `timeNowFormat` layout is not a valid strftime layout
    #[error("invalid time layout '{layout}'")]
    InvalidLayout {
        /// Layout string
        layout: String,
    },

    /// Rendering produced an empty name
    #[error("template rendered an empty name")]
    EmptyOutput,
}

/// Fields available to templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    RoleName,
    ConfigName,
    TokenType,
    Scopes,
    AccessLevel,
    GitlabRevokesToken,
    UnixTimestampUtc,
    Path,
}

impl Field {
    fn parse(name: &str) -> Result<Self, TemplateError> {
        Ok(match name {
            "role_name" => Self::RoleName,
            "config_name" => Self::ConfigName,
            "token_type" => Self::TokenType,
            "scopes" => Self::Scopes,
            "access_level" => Self::AccessLevel,
            "gitlab_revokes_token" => Self::GitlabRevokesToken,
            "unix_timestamp_utc" => Self::UnixTimestampUtc,
            "path" => Self::Path,
            other => {
                return Err(TemplateError::UnknownField {
                    name: other.to_string(),
                });
            }
        })
    }

    const fn kind(self) -> Kind {
        match self {
            Self::Scopes => Kind::List,
            Self::GitlabRevokesToken => Kind::Bool,
            Self::UnixTimestampUtc => Kind::Int,
            _ => Kind::Str,
        }
    }

    fn value(self, data: &TemplateData) -> TemplateValue<'_> {
        match self {
            Self::RoleName => TemplateValue::Str(&data.role_name),
            Self::ConfigName => TemplateValue::Str(&data.config_name),
            Self::TokenType => TemplateValue::Str(&data.token_type),
            Self::Scopes => TemplateValue::List(&data.scopes),
            Self::AccessLevel => TemplateValue::Str(&data.access_level),
            Self::GitlabRevokesToken => TemplateValue::Bool(data.gitlab_revokes_token),
            Self::UnixTimestampUtc => TemplateValue::Int(data.unix_timestamp_utc),
            Self::Path => TemplateValue::Str(&data.path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    List,
    Bool,
    Int,
}

impl Kind {
    const fn describe(self) -> &'static str {
        match self {
            Self::Str => "a string",
            Self::List => "a list",
            Self::Bool => "a bool",
            Self::Int => "an integer",
        }
    }
}

/// Value of a field at render time
#[derive(Debug, Clone, Copy)]
enum TemplateValue<'a> {
    Str(&'a str),
    List(&'a [String]),
    Bool(bool),
    Int(i64),
}

impl fmt::Display for TemplateValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::List(items) => f.write_str(&items.join(",")),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Str(String),
    Int(i64),
    Field(Field),
}

impl Arg {
    const fn kind(&self) -> Kind {
        match self {
            Self::Str(_) => Kind::Str,
            Self::Int(_) => Kind::Int,
            Self::Field(field) => field.kind(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Helper {
    RandHexString,
    StringsJoin,
    TimeNowFormat,
    YesNoBool,
}

impl Helper {
    fn parse(name: &str) -> Result<Self, TemplateError> {
        Ok(match name {
            "randHexString" => Self::RandHexString,
            "stringsJoin" => Self::StringsJoin,
            "timeNowFormat" => Self::TimeNowFormat,
            "yesNoBool" => Self::YesNoBool,
            other => {
                return Err(TemplateError::UnknownHelper {
                    name: other.to_string(),
                });
            }
        })
    }

    const fn name(self) -> &'static str {
        match self {
            Self::RandHexString => "randHexString",
            Self::StringsJoin => "stringsJoin",
            Self::TimeNowFormat => "timeNowFormat",
            Self::YesNoBool => "yesNoBool",
        }
    }

    const fn signature(self) -> &'static [Kind] {
        match self {
            Self::RandHexString => &[Kind::Int],
            Self::StringsJoin => &[Kind::List, Kind::Str],
            Self::TimeNowFormat => &[Kind::Str],
            Self::YesNoBool => &[Kind::Bool],
        }
    }

    /// Arity, kind and literal checks, all done before any render
    fn check(self, args: &[Arg]) -> Result<(), TemplateError> {
        let signature = self.signature();
        if args.len() != signature.len() {
            return Err(TemplateError::Arity {
                helper: self.name(),
                expected: signature.len(),
                got: args.len(),
            });
        }

        for (position, (arg, expected)) in args.iter().zip(signature).enumerate() {
            if arg.kind() != *expected {
                return Err(TemplateError::ArgumentType {
                    helper: self.name(),
                    position: position + 1,
                    expected: expected.describe(),
                });
            }
        }

        match (self, &args[0]) {
            (Self::RandHexString, Arg::Int(n)) => check_random_length(*n),
            (Self::TimeNowFormat, Arg::Str(layout)) => check_layout(layout),
            _ => Ok(()),
        }
    }
}

fn check_random_length(n: i64) -> Result<(), TemplateError> {
    if (1..=MAX_RANDOM_BYTES).contains(&n) {
        Ok(())
    } else {
        Err(TemplateError::RandomLength {
            value: n,
            max: MAX_RANDOM_BYTES,
        })
    }
}

fn check_layout(layout: &str) -> Result<(), TemplateError> {
    if StrftimeItems::new(layout).any(|item| matches!(item, Item::Error)) {
        return Err(TemplateError::InvalidLayout {
            layout: layout.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Field(Field),
    Call { helper: Helper, args: Vec<Arg> },
}

/// Substitution data supplied by the issuance path
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    /// Role being issued
    pub role_name: String,
    /// Config the role belongs to
    pub config_name: String,
    /// Token type wire string
    pub token_type: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Access level wire string, empty when not applicable
    pub access_level: String,
    /// True when the provider owns the token's expiry
    pub gitlab_revokes_token: bool,
    /// Issuance time as unix seconds
    pub unix_timestamp_utc: i64,
    /// Role path
    pub path: String,
}

/// A parsed, validated name template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    source: String,
    nodes: Vec<Node>,
}

impl NameTemplate {
    /// Parse and statically check `source`
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut nodes = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                nodes.push(Node::Text(rest[..start].to_string()));
            }
            let body = &rest[start + 2..];
            let end = body.find("}}").ok_or(TemplateError::Unclosed {
                offset: offset + start,
            })?;

            nodes.push(parse_action(body[..end].trim(), offset + start)?);

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            nodes.push(Node::Text(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            nodes,
        })
    }

    /// Render against `data` using the current time
    pub fn render(&self, data: &TemplateData) -> Result<String, TemplateError> {
        self.render_at(data, Utc::now())
    }

    /// Render against `data` with `now` as the value of `timeNowFormat`
    pub fn render_at(&self, data: &TemplateData, now: DateTime<Utc>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Field(field) => {
                    let _ = write!(out, "{}", field.value(data));
                }
                Node::Call { helper, args } => call(*helper, args, data, now, &mut out)?,
            }
        }

        if out.trim().is_empty() {
            return Err(TemplateError::EmptyOutput);
        }
        Ok(out)
    }
}

impl Default for NameTemplate {
    fn default() -> Self {
        Self::parse(DEFAULT_NAME_TEMPLATE).unwrap_or(Self {
            source: String::new(),
            nodes: Vec::new(),
        })
    }
}

impl fmt::Display for NameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for NameTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_action(action: &str, offset: usize) -> Result<Node, TemplateError> {
    let tokens = tokenize(action)?;
    let Some((head, tail)) = tokens.split_first() else {
        return Err(TemplateError::EmptyAction { offset });
    };

    if let Some(name) = head.strip_prefix('.') {
        if !tail.is_empty() {
            return Err(TemplateError::BadArgument {
                token: tail[0].clone(),
            });
        }
        return Field::parse(name).map(Node::Field);
    }

    let helper = Helper::parse(head)?;
    let args = tail
        .iter()
        .map(|token| parse_arg(token))
        .collect::<Result<Vec<_>, _>>()?;
    helper.check(&args)?;

    Ok(Node::Call { helper, args })
}

/// Split an action on whitespace, keeping quoted strings whole.
///
/// Quoted tokens keep their leading `"` as a marker and have escapes
/// resolved.
fn tokenize(action: &str) -> Result<Vec<String>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = action.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut literal = String::from('"');
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some('n') => literal.push('\n'),
                        Some('t') => literal.push('\t'),
                        Some(other) => literal.push(other),
                        None => break,
                    },
                    other => literal.push(other),
                }
            }
            if !closed {
                return Err(TemplateError::UnterminatedString {
                    action: action.to_string(),
                });
            }
            tokens.push(literal);
            continue;
        }

        let mut bare = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            bare.push(c);
            chars.next();
        }
        tokens.push(bare);
    }

    Ok(tokens)
}

fn parse_arg(token: &str) -> Result<Arg, TemplateError> {
    if let Some(literal) = token.strip_prefix('"') {
        return Ok(Arg::Str(literal.to_string()));
    }
    if let Some(name) = token.strip_prefix('.') {
        return Field::parse(name).map(Arg::Field);
    }
    token.parse::<i64>().map(Arg::Int).map_err(|_| TemplateError::BadArgument {
        token: token.to_string(),
    })
}

fn resolve<'a>(arg: &'a Arg, data: &'a TemplateData) -> TemplateValue<'a> {
    match arg {
        Arg::Str(s) => TemplateValue::Str(s),
        Arg::Int(i) => TemplateValue::Int(*i),
        Arg::Field(field) => field.value(data),
    }
}

fn call(
    helper: Helper,
    args: &[Arg],
    data: &TemplateData,
    now: DateTime<Utc>,
    out: &mut String,
) -> Result<(), TemplateError> {
    let values: Vec<TemplateValue<'_>> = args.iter().map(|arg| resolve(arg, data)).collect();

    match (helper, values.as_slice()) {
        (Helper::RandHexString, [TemplateValue::Int(n)]) => {
            check_random_length(*n)?;
            let mut bytes = vec![0u8; *n as usize];
            rand::rng().fill_bytes(&mut bytes);
            out.push_str(&hex::encode(bytes));
        }
        (Helper::StringsJoin, [TemplateValue::List(items), TemplateValue::Str(sep)]) => {
            out.push_str(&items.join(*sep));
        }
        (Helper::TimeNowFormat, [TemplateValue::Str(layout)]) => {
            check_layout(layout)?;
            write!(out, "{}", now.format(layout)).map_err(|_| TemplateError::InvalidLayout {
                layout: (*layout).to_string(),
            })?;
        }
        (Helper::YesNoBool, [TemplateValue::Bool(b)]) => {
            out.push_str(if *b { "yes" } else { "no" });
        }
        _ => {
            // Kinds were checked at parse time
            return Err(TemplateError::Arity {
                helper: helper.name(),
                expected: helper.signature().len(),
                got: values.len(),
            });
        }
    }
    Ok(())
}
