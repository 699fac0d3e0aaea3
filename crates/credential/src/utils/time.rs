//! Time utilities for token lifetimes
//!
//! The provider accepts day-granularity expiries only and always expires a
//! token at the start of a UTC day. [`compute_ttl`] maps a requested lifetime
//! onto that grid.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Timelike, Utc};

/// Longest lifetime the provider accepts for any token
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Shortest lifetime of a provider-owned token
pub const MIN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Midnight UTC of the day containing `instant`
#[must_use]
pub fn truncate_to_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Compute `(ttl, expires_at)` for a token requested at `start`.
///
/// The request is capped at [`MAX_TTL`], then rounded up to the next UTC
/// midnight strictly after `start + requested`. If rounding pushes the
/// lifetime past the cap, the expiry falls back to the midnight at or before
/// `start + MAX_TTL`.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use gitlab_secrets_credential::utils::compute_ttl;
/// use std::time::Duration;
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
/// let (ttl, expires_at) = compute_ttl(Duration::from_secs(2 * 3600), start);
///
/// assert_eq!(expires_at, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
/// assert_eq!(ttl, Duration::from_secs(14 * 3600));
/// ```
#[must_use]
pub fn compute_ttl(requested: Duration, start: DateTime<Utc>) -> (Duration, DateTime<Utc>) {
    let max = TimeDelta::days(365);
    let requested = TimeDelta::from_std(requested.min(MAX_TTL)).unwrap_or(max);

    let candidate = start + requested;
    let candidate = candidate.with_nanosecond(0).unwrap_or(candidate);

    let mut expires_at = truncate_to_day(candidate + TimeDelta::days(1));
    let mut ttl = expires_at - start;

    if ttl > max {
        expires_at = truncate_to_day(start + max);
        ttl = expires_at - start;
    }

    (ttl.to_std().unwrap_or_default(), expires_at)
}
