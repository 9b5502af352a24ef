//! Shared timestamp/event helpers for deterministic envelopes.
//!
//! All engine timestamps are unix-epoch seconds. Decay and staleness math
//! work on whole days and weeks derived from those seconds, so passes run
//! on the same day see the same derived values.

use ulid::Ulid;

pub const SECS_PER_DAY: i64 = 86_400;
pub const SECS_PER_WEEK: i64 = 7 * SECS_PER_DAY;

/// Current unix-epoch seconds.
pub fn epoch_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    format!("{}Z", epoch_secs())
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Whole days elapsed between two epoch-second instants (0 when `later`
/// precedes `earlier`).
pub fn days_between(earlier: i64, later: i64) -> i64 {
    if later <= earlier {
        0
    } else {
        (later - earlier) / SECS_PER_DAY
    }
}

/// Whole weeks elapsed between two epoch-second instants.
pub fn weeks_between(earlier: i64, later: i64) -> i64 {
    days_between(earlier, later) / 7
}
