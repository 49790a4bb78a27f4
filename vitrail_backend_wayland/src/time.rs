// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic clock reads and poll timeouts.

use rustix::time::{ClockId, Timespec, clock_gettime};
use vitrail_core::time::{Duration, HostTime};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Returns the current `CLOCK_MONOTONIC` time in nanoseconds.
#[must_use]
pub fn now() -> HostTime {
    timespec_to_host_time(clock_gettime(ClockId::Monotonic))
}

fn timespec_to_host_time(timespec: Timespec) -> HostTime {
    let seconds = u64::try_from(timespec.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(timespec.tv_nsec)
        .unwrap_or(0)
        .min(NANOS_PER_SECOND - 1);

    let ticks = u128::from(seconds)
        .saturating_mul(u128::from(NANOS_PER_SECOND))
        .saturating_add(u128::from(nanos));
    HostTime(u64::try_from(ticks).unwrap_or(u64::MAX))
}

/// Converts a wait into a `poll` timeout. [`Duration::INFINITE`] maps to
/// no timeout.
pub(crate) fn poll_timeout(timeout: Duration) -> Option<Timespec> {
    if timeout.is_infinite() {
        return None;
    }
    let nanos = timeout.nanos();
    Some(Timespec {
        tv_sec: (nanos / NANOS_PER_SECOND).try_into().unwrap_or(i64::MAX),
        tv_nsec: (nanos % NANOS_PER_SECOND).try_into().unwrap_or(0),
    })
}
