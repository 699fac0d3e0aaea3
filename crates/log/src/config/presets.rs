//! Configuration presets

use super::{Config, DisplayConfig, Fields, Format};

impl Config {
    /// Create configuration from environment variables
    ///
    /// The filter comes from `GITLAB_SECRETS_LOG`, then `RUST_LOG`. The format
    /// comes from `GITLAB_SECRETS_LOG_FORMAT`; unknown values keep compact.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("GITLAB_SECRETS_LOG") {
            config.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            config.level = level;
        }

        if let Ok(format) = std::env::var("GITLAB_SECRETS_LOG_FORMAT") {
            config.format = format.parse().unwrap_or_default();
        }

        config.display.parse_env();
        config.fields = Fields::from_env();

        config
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Test configuration (compact, no colors or timestamps)
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: "trace".to_string(),
            format: Format::Compact,
            display: DisplayConfig {
                colors: false,
                time: false,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_is_flattened_json() {
        let config = Config::production();
        assert_eq!(config.format, Format::Json);
        assert!(config.display.flatten);
        assert!(!config.display.colors);
    }

    #[test]
    fn development_shows_source() {
        let config = Config::development();
        assert_eq!(config.level, "debug");
        assert!(config.display.source);
    }
}
