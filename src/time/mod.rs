//! Time keeping for the link scheduler
//!
//! The scheduler never reads a clock on its own: every entry point takes the
//! current [`Timestamp`], so the same code runs against the monotonic system
//! clock on a device and against a [`ManualClock`] in simulation.

use std::fmt;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Microseconds since the node booted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Boot time
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from microseconds since boot
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Returns microseconds since boot
    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(micros))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}s", self.0 as f64 / 1e6)
    }
}

/// Source of the current time
pub trait Clock {
    /// Returns the current time
    fn now(&self) -> Timestamp;
}

/// Monotonic clock counting from its creation
#[derive(Debug, Clone)]
pub struct SystemClock {
    boot: Instant,
}

impl SystemClock {
    /// Creates a clock whose zero is now
    pub fn new() -> Self {
        SystemClock { boot: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::ZERO + self.boot.elapsed()
    }
}

/// Shared, manually advanced clock
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock stopped at boot time
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.micros.store(next.as_micros(), Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time
    pub fn set(&self, to: Timestamp) {
        self.micros.store(to.as_micros(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.micros.load(Ordering::SeqCst))
    }
}
