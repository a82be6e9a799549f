//! Monotonic time abstractions shared by firmware and host targets.
//!
//! Every component that measures elapsed time is generic over
//! [`ControlInstant`] so the same logic runs against Embassy's timer on the
//! MCU, the host clock in the emulator, and hand-stepped instants in tests.

use core::{ops::Add, time::Duration};

/// Monotonic timestamp consumed by the control loop.
pub trait ControlInstant: Copy + Ord + Add<Duration, Output = Self> {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;

    /// Returns `true` once strictly more than `window` has passed since `earlier`.
    fn elapsed_beyond(&self, earlier: Self, window: Duration) -> bool {
        self.saturating_duration_since(earlier) > window
    }
}

/// Microsecond instant counted from an arbitrary origin.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Micros(u64);

impl Micros {
    /// Instant at the origin.
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_micros(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn from_millis(value: u64) -> Self {
        Self(value.saturating_mul(1_000))
    }

    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000
    }
}

impl Add<Duration> for Micros {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl ControlInstant for Micros {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}
