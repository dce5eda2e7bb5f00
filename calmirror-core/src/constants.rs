//! Shared constants.

/// Days of past events included in a sync window by default.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Days of future events included in a sync window by default.
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 90;

/// Default duration of a timed event with no explicit end (minutes).
pub const DEFAULT_TIMED_DURATION_MINS: i64 = 30;

/// Timeout applied to every network request (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Application marker written into destination event metadata so that
/// app-managed objects can be told apart from user-authored ones.
pub const APP_MARKER: &str = "calmirror";
