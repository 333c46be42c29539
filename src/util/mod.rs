//! Utility module
//!
//! This module provides logging setup and duration helpers used
//! throughout the library.

use std::time::Duration;

use rand::Rng;
use tracing::Level;

/// Installs a fmt subscriber logging at `level` and above.
///
/// Only the first call installs anything; later calls, or a subscriber set
/// elsewhere, leave the existing one in place. Returns whether this call
/// installed it.
pub fn init_logging(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Picks a duration uniformly from `min..=max`, at microsecond resolution
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    let (lo, hi) = (duration_to_micros(min), duration_to_micros(max));
    if lo >= hi {
        return min;
    }
    Duration::from_micros(rng.gen_range(lo..=hi))
}

/// Converts a duration to whole microseconds, saturating at `u64::MAX`
pub fn duration_to_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
