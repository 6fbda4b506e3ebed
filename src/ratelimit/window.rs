//! Fixed-window time bucketing.
//!
//! Everything here is pure: given an observation instant and a window size,
//! derive the bucket identifier of the window containing that instant and
//! the moment the window rolls over. Windows are laid out from midnight UTC
//! on 0001-01-01, a Monday, so hour and day windows start at the top of the
//! hour and at midnight, and week windows start on Monday.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;

use crate::error::ConfigurationError;

/// `strftime` pattern of a bucket identifier: `MMDD_HHMMSS` of the window start.
pub const BUCKET_FORMAT: &str = "%m%d_%H%M%S";

/// Extra seconds a counter should outlive its window, so a store that
/// evicts a little early never drops a key the window still needs.
pub const TTL_SAFETY_MARGIN_SECS: u64 = 5;

/// Seconds from 0001-01-01T00:00:00Z to the Unix epoch.
const ZERO_TIME_OFFSET: i64 = 62_135_596_800;

/// Largest accepted window; keeps all bucket arithmetic inside `TimeDelta`.
const MAX_WINDOW_SECS: u64 = (i64::MAX / 1_000) as u64;

/// Length of a rate limiting window, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Window {
    secs: u64,
}

impl Window {
    /// Per-second rate limiting
    pub const SECOND: Window = Window { secs: 1 };
    /// Per-minute rate limiting
    pub const MINUTE: Window = Window { secs: 60 };
    /// Per-hour rate limiting
    pub const HOUR: Window = Window { secs: 3_600 };
    /// Per-day rate limiting
    pub const DAY: Window = Window { secs: 86_400 };

    /// Create a window of `secs` seconds.
    pub fn from_secs(secs: u64) -> Result<Self, ConfigurationError> {
        if secs == 0 || secs > MAX_WINDOW_SECS {
            return Err(ConfigurationError::InvalidWindow(Duration::from_secs(secs)));
        }
        Ok(Self { secs })
    }

    /// Get the window length in seconds.
    pub fn as_secs(&self) -> u64 {
        self.secs
    }

    /// Get the duration of this window.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }

    fn secs_i64(&self) -> i64 {
        // Bounded by MAX_WINDOW_SECS at construction.
        self.secs as i64
    }
}

impl TryFrom<Duration> for Window {
    type Error = ConfigurationError;

    fn try_from(duration: Duration) -> Result<Self, Self::Error> {
        if duration.subsec_nanos() != 0 {
            return Err(ConfigurationError::InvalidWindow(duration));
        }
        Window::from_secs(duration.as_secs())
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.secs)
    }
}

/// Epoch second at which the window containing `now` started.
pub fn window_start(now: DateTime<Utc>, window: Window) -> i64 {
    let ts = now.timestamp();
    ts - (ts + ZERO_TIME_OFFSET).rem_euclid(window.secs_i64())
}

/// Canonical identifier of the window containing `now`.
///
/// Two instants inside the same window always map to the same string. The
/// identifier carries no year, so windows exactly one calendar year apart
/// coincide; counters never live that long.
pub fn bucket_id(now: DateTime<Utc>, window: Window) -> String {
    let into_window = TimeDelta::seconds(now.timestamp() - window_start(now, window))
        + TimeDelta::nanoseconds(i64::from(now.timestamp_subsec_nanos()));
    (now - into_window).format(BUCKET_FORMAT).to_string()
}

/// Seconds until the window containing `now` rolls over, and the epoch
/// second at which it does.
///
/// The first value is always at least 1.
pub fn next_reset(now: DateTime<Utc>, window: Window) -> (u64, i64) {
    let reset_at = window_start(now, window) + window.secs_i64();
    let until_reset = reset_at - now.timestamp();
    (until_reset as u64, reset_at)
}

/// How long a store should keep a counter that has `until_reset` seconds left.
pub fn ttl_hint(until_reset: u64) -> u64 {
    until_reset + TTL_SAFETY_MARGIN_SECS
}

/// A source of wall-clock time for the limiter.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant, UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Jump to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write() = instant;
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::seconds(by.as_secs() as i64)
            + TimeDelta::nanoseconds(i64::from(by.subsec_nanos()));
        *self.now.write() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
