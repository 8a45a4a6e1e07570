//! Host-side clock and per-thread timing log.
//!
//! CPU call timing is captured as raw [`Timestamp`] ticks of a [`HostClock`]
//! and only converted to seconds when a trace is rendered. Conversion needs the
//! clock frequency; a frequency of zero makes every conversion undefined and
//! callers must flag such values rather than print them.

#![allow(clippy::cast_precision_loss)]

use crate::domain::Timestamp;
use std::time::Instant;

/// Ticks per second of the default host clock (nanosecond resolution).
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Monotonic host clock
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    origin: Instant,
    frequency: u64,
}

impl HostClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            frequency: NANOS_PER_SEC,
        }
    }

    /// Clock that reads like [`HostClock::new`] but reports `frequency` for
    /// conversions. Used by backends whose tick rate is not nanoseconds, and to
    /// model an unreported frequency with `0`.
    #[must_use]
    pub fn with_frequency(frequency: u64) -> Self {
        Self {
            origin: Instant::now(),
            frequency,
        }
    }

    /// Current reading.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed().as_nanos() as u64)
    }

    #[must_use]
    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    /// Seconds from `from` to `to`, `None` if the frequency is unknown.
    #[must_use]
    pub fn seconds_between(&self, from: Timestamp, to: Timestamp) -> Option<f64> {
        ticks_to_seconds(to.ticks_since(from), self.frequency)
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a tick count at `frequency` Hz to seconds.
#[must_use]
pub fn ticks_to_seconds(ticks: u64, frequency: u64) -> Option<f64> {
    if frequency == 0 {
        return None;
    }
    Some(ticks as f64 / frequency as f64)
}

/// Start/end pair of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTiming {
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Ordered start/end pairs, indexed by call number within a thread.
#[derive(Debug, Default)]
pub struct TimingLog {
    entries: Vec<CallTiming>,
}

impl TimingLog {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append a pair and return its index.
    pub fn log(&mut self, start: Timestamp, end: Timestamp) -> usize {
        self.entries.push(CallTiming { start, end });
        self.entries.len() - 1
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<CallTiming> {
        self.entries.get(index).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
