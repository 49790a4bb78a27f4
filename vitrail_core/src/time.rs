// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host time and timeouts.
//!
//! [`HostTime`] is a point on the backend's monotonic clock, in nanoseconds
//! (`CLOCK_MONOTONIC` for the Wayland backend, a virtual clock in tests).
//! [`Duration`] is a span in the same units. Acquire timeouts follow the
//! usual WSI convention: [`Duration::INFINITE`] (`u64::MAX`) never expires,
//! so deadline arithmetic saturates instead of wrapping.

use core::fmt;
use core::ops::{Add, Sub};

const NANOS_PER_MILLI: u64 = 1_000_000;

/// A point in time on the backend's monotonic clock, in nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// The latest representable time. Used as the deadline of an infinite
    /// wait.
    pub const MAX: Self = Self(u64::MAX);

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Returns the duration between `self` and an earlier time, or zero if
    /// `earlier` is after `self`.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }

    /// Adds a duration, clamping at [`HostTime::MAX`].
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.0))
    }

    /// Checked subtraction of a duration.
    #[inline]
    #[must_use]
    pub const fn checked_sub(self, duration: Duration) -> Option<Self> {
        match self.0.checked_sub(duration.0) {
            Some(t) => Some(Self(t)),
            None => None,
        }
    }
}

impl Add<Duration> for HostTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        self.saturating_add(rhs)
    }
}

impl Sub for HostTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Self) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// A span of time in nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    /// A zero-length duration: poll once, never block.
    pub const ZERO: Self = Self(0);

    /// A wait that never times out.
    pub const INFINITE: Self = Self(u64::MAX);

    /// Creates a duration from nanoseconds.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a duration from milliseconds, saturating on overflow.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(NANOS_PER_MILLI))
    }

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Returns `true` for [`Duration::INFINITE`].
    #[inline]
    #[must_use]
    pub const fn is_infinite(self) -> bool {
        self.0 == u64::MAX
    }

    /// Saturating subtraction.
    #[inline]
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Duration {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            f.write_str("Duration(INFINITE)")
        } else {
            write!(f, "Duration({})", self.0)
        }
    }
}

/// An absolute deadline computed once from a relative timeout.
///
/// Remaining time is recomputed against the same monotonic clock on every
/// wait, so repeated wake-ups never extend the total wait.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Deadline {
    end: HostTime,
}

impl Deadline {
    /// Computes the deadline `timeout` after `start`.
    #[must_use]
    pub const fn after(start: HostTime, timeout: Duration) -> Self {
        if timeout.is_infinite() {
            Self { end: HostTime::MAX }
        } else {
            Self {
                end: start.saturating_add(timeout),
            }
        }
    }

    /// Returns the absolute end of the wait.
    #[must_use]
    pub const fn end(self) -> HostTime {
        self.end
    }

    /// Returns `true` once `now` is strictly after the deadline.
    #[must_use]
    pub const fn has_passed(self, now: HostTime) -> bool {
        now.0 > self.end.0
    }

    /// Time left until the deadline, or [`Duration::INFINITE`] for an
    /// unbounded wait.
    #[must_use]
    pub const fn remaining(self, now: HostTime) -> Duration {
        if self.end.0 == u64::MAX {
            Duration::INFINITE
        } else {
            self.end.saturating_duration_since(now)
        }
    }
}

impl fmt::Debug for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deadline({:?})", self.end)
    }
}
