//! Logging setup for the GitLab secrets engine
//!
//! Installs a `tracing` subscriber with an `EnvFilter` and a pretty, compact
//! or JSON formatter.
//!
//! ```no_run
//! let _guard = gitlab_secrets_log::auto_init().expect("logger");
//! tracing::info!(config_name = "default", "engine ready");
//! ```
#![forbid(unsafe_code)]

mod builder;
mod config;
mod core;

pub use builder::{LoggerBuilder, LoggerGuard, ReloadHandle};
pub use config::{Config, DisplayConfig, Fields, Format};
pub use crate::core::{LogError, LogResult};

/// Initialize with the default configuration (compact, `info`)
///
/// # Errors
/// [`LogError::AlreadyInitialized`] if a global subscriber exists.
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::default())
}

/// Initialize with an explicit configuration
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Initialize from the environment
///
/// Uses [`Config::from_env`] when `GITLAB_SECRETS_LOG`, `RUST_LOG` or
/// `GITLAB_SECRETS_LOG_FORMAT` is set. Otherwise picks the development preset
/// in debug builds and the production preset in release builds.
pub fn auto_init() -> LogResult<LoggerGuard> {
    let configured = ["GITLAB_SECRETS_LOG", "RUST_LOG", "GITLAB_SECRETS_LOG_FORMAT"]
        .iter()
        .any(|key| std::env::var_os(key).is_some());

    let config = if configured {
        Config::from_env()
    } else if cfg!(debug_assertions) {
        Config::development()
    } else {
        Config::production()
    };
    init_with(config)
}

/// Initialize test logging; safe to call from every test
///
/// Output goes through the test harness writer so it is captured per test.
pub fn init_test() -> LoggerGuard {
    let mut config = Config::test();
    if let Ok(level) = std::env::var("GITLAB_SECRETS_LOG").or_else(|_| std::env::var("RUST_LOG")) {
        config.level = level;
    }
    let Ok(filter) = builder::parse_filter(&config.level) else {
        return LoggerGuard::noop();
    };

    // Err means another test already installed one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .without_time()
        .with_test_writer()
        .try_init();
    LoggerGuard::noop()
}
