//! Logger configuration

mod presets;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::LogError;

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filter directive in `EnvFilter` syntax, e.g. `info,gitlab_secrets_credential=debug`
    pub level: String,
    /// Output format
    pub format: Format,
    /// What each line shows
    pub display: DisplayConfig,
    /// Global fields attached to a root span
    pub fields: Fields,
    /// Whether the filter can be changed after initialisation
    pub reloadable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            display: DisplayConfig::default(),
            fields: Fields::default(),
            reloadable: false,
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human oriented
    Pretty,
    /// Single line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl Format {
    /// Wire name of the format
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LogError::Config(format!("unknown log format `{other}`"))),
        }
    }
}

/// Display options for the fmt layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub colors: bool,
    pub time: bool,
    pub target: bool,
    /// File and line of the call site
    pub source: bool,
    pub thread_ids: bool,
    /// JSON only: put event fields at the top level
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            time: true,
            target: true,
            source: false,
            thread_ids: false,
            flatten: false,
        }
    }
}

impl DisplayConfig {
    /// Apply `NO_COLOR`
    pub(crate) fn parse_env(&mut self) {
        if std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            self.colors = false;
        }
    }
}

/// Global fields recorded once on the root span
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fields {
    pub service: Option<String>,
    pub env: Option<String>,
    pub version: Option<String>,
}

impl Fields {
    /// Read `GITLAB_SECRETS_SERVICE` and `GITLAB_SECRETS_ENV`
    pub fn from_env() -> Self {
        Self {
            service: non_empty_var("GITLAB_SECRETS_SERVICE"),
            env: non_empty_var("GITLAB_SECRETS_ENV"),
            version: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.service.is_none() && self.env.is_none() && self.version.is_none()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
