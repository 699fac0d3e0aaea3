//! Utility modules

pub mod secret_string;
pub mod time;

// Re-export commonly used types and functions
pub use secret_string::SecretString;
pub use time::{MAX_TTL, MIN_TTL, compute_ttl, truncate_to_day};
