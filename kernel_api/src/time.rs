//! Time abstractions
//!
//! Kernel time is measured from kernel start, not from a wall-clock epoch.
//! Durations convert to and from `std::time::Duration` so timeouts can be
//! handed to host waiting primitives.

use core::ops::{Add, Sub};
use serde::{Deserialize, Serialize};

/// A point in time, in nanoseconds since the kernel started
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Instant {
    nanos: u64,
}

impl Instant {
    /// Kernel start
    pub const BOOT: Instant = Instant { nanos: 0 };

    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Returns the duration since another instant (zero if `earlier` is later)
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(earlier.nanos))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, duration: Duration) -> Self::Output {
        Instant::from_nanos(self.nanos.saturating_add(duration.as_nanos()))
    }
}

/// A span of kernel time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Duration {
    nanos: u64,
}

impl Duration {
    pub const ZERO: Duration = Duration { nanos: 0 };

    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    pub const fn from_micros(micros: u64) -> Self {
        Self {
            nanos: micros * 1_000,
        }
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self {
            nanos: millis * 1_000_000,
        }
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self {
            nanos: secs * 1_000_000_000,
        }
    }

    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    pub const fn as_millis(&self) -> u64 {
        self.nanos / 1_000_000
    }

    /// Converts into a host duration for blocking waits
    pub const fn to_std(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.nanos)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(duration: std::time::Duration) -> Self {
        Duration::from_nanos(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, other: Duration) -> Self::Output {
        Duration::from_nanos(self.nanos.saturating_add(other.nanos))
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, other: Duration) -> Self::Output {
        Duration::from_nanos(self.nanos.saturating_sub(other.nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_units_agree() {
        assert_eq!(Duration::from_secs(1), Duration::from_millis(1000));
        assert_eq!(Duration::from_millis(1), Duration::from_micros(1000));
        assert_eq!(Duration::from_secs(2).as_millis(), 2000);
    }

    #[test]
    fn test_std_conversion() {
        let d = Duration::from_millis(250);
        assert_eq!(d.to_std(), std::time::Duration::from_millis(250));
        assert_eq!(Duration::from(std::time::Duration::from_micros(7)), Duration::from_micros(7));
    }

    #[test]
    fn test_saturating_arithmetic() {
        let d1 = Duration::from_millis(500);
        let d2 = Duration::from_millis(300);
        assert_eq!(d1 + d2, Duration::from_millis(800));
        assert_eq!(d2 - d1, Duration::ZERO);
        assert_eq!(Instant::from_nanos(u64::MAX) + d1, Instant::from_nanos(u64::MAX));
    }

    #[test]
    fn test_instant_duration_since() {
        let i1 = Instant::from_nanos(1000);
        let i2 = Instant::from_nanos(2000);
        assert!(i2 > i1);
        assert_eq!(i2.duration_since(i1), Duration::from_nanos(1000));
        assert_eq!(i1.duration_since(i2), Duration::ZERO);
        assert_eq!(Instant::BOOT + Duration::from_nanos(5), Instant::from_nanos(5));
    }
}
