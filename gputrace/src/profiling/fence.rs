//! Fence bookkeeping for result harvesting.
//!
//! Every harvest signals a fresh value on the queue and waits for it. The
//! tracker hands out values from a monotonic counter and remembers the highest
//! value observed complete, so repeated checks skip the fence entirely.

use super::device::GpuFence;
use crate::domain::ProfilerError;
use log::warn;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a harvest may block on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FenceWait {
    /// Block until the GPU catches up.
    #[default]
    Infinite,
    /// Give up after the given duration.
    Bounded(Duration),
}

impl FenceWait {
    fn timeout(self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::Bounded(limit) => Some(limit),
        }
    }
}

pub(crate) struct FenceTracker {
    fence: Arc<dyn GpuFence>,
    next_value: AtomicU64,
    last_completed: AtomicU64,
}

impl FenceTracker {
    pub(crate) fn new(fence: Arc<dyn GpuFence>) -> Self {
        let completed = fence.completed_value();
        Self {
            fence,
            next_value: AtomicU64::new(completed + 1),
            last_completed: AtomicU64::new(completed),
        }
    }

    pub(crate) fn fence(&self) -> &Arc<dyn GpuFence> {
        &self.fence
    }

    /// Reserve the next value to signal.
    pub(crate) fn next_value(&self) -> u64 {
        self.next_value.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn last_completed(&self) -> u64 {
        self.last_completed.load(Ordering::Acquire)
    }

    fn observe(&self, value: u64) -> u64 {
        self.last_completed
            .fetch_max(value, Ordering::AcqRel)
            .max(value)
    }

    pub(crate) fn is_complete(&self, value: u64) -> bool {
        if value <= self.last_completed() {
            return true;
        }
        value <= self.observe(self.fence.completed_value())
    }

    /// Block until `value` has been reached.
    pub(crate) fn wait(&self, value: u64, wait: FenceWait) -> Result<(), ProfilerError> {
        if self.is_complete(value) {
            return Ok(());
        }
        let started = Instant::now();
        if self.fence.wait_for(value, wait.timeout()) {
            self.observe(self.fence.completed_value().max(value));
            return Ok(());
        }
        let waited_ms = started.elapsed().as_millis();
        warn!("Fence value {value} not reached after {waited_ms}ms");
        Err(ProfilerError::FenceTimeout { value, waited_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct ManualFence {
        value: Mutex<u64>,
    }

    impl GpuFence for ManualFence {
        fn completed_value(&self) -> u64 {
            *self.value.lock()
        }

        fn signal(&self, value: u64) {
            let mut current = self.value.lock();
            *current = (*current).max(value);
        }

        fn wait_for(&self, value: u64, _timeout: Option<Duration>) -> bool {
            self.completed_value() >= value
        }
    }

    #[test]
    fn test_values_are_monotonic() {
        let tracker = FenceTracker::new(Arc::new(ManualFence::default()));
        let a = tracker.next_value();
        let b = tracker.next_value();
        assert_eq!(a, 1);
        assert!(b > a);
    }

    #[test]
    fn test_last_completed_never_decreases() {
        let fence = Arc::new(ManualFence::default());
        let tracker = FenceTracker::new(fence.clone());
        fence.signal(5);
        assert!(tracker.is_complete(3));
        assert_eq!(tracker.last_completed(), 5);
        tracker.observe(2);
        assert_eq!(tracker.last_completed(), 5);
    }

    #[test]
    fn test_bounded_wait_times_out() {
        let tracker = FenceTracker::new(Arc::new(ManualFence::default()));
        let err = tracker
            .wait(1, FenceWait::Bounded(Duration::from_millis(1)))
            .unwrap_err();
        assert!(matches!(err, ProfilerError::FenceTimeout { value: 1, .. }));
    }

    #[test]
    fn test_wait_on_signalled_value() {
        let fence = Arc::new(ManualFence::default());
        let tracker = FenceTracker::new(fence.clone());
        let value = tracker.next_value();
        fence.signal(value);
        assert!(tracker.wait(value, FenceWait::Infinite).is_ok());
        assert_eq!(tracker.last_completed(), value);
    }
}
