//! Drawcall consistency guard.
//!
//! A frame-debugging layer replaying a frame reports when the drawcall it hits
//! differs from the one it expected. From then until the next frame begins,
//! every trace request for the frame fails instead of returning data that no
//! longer matches what the client sees.

use crate::domain::TraceError;
use log::warn;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DrawcallConsistency {
    inconsistent: AtomicBool,
    frame: AtomicU64,
}

impl DrawcallConsistency {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag `frame` as inconsistent.
    pub fn report_mismatch(&self, frame: u64, expected_draw: u64, actual_draw: u64) {
        warn!("Frame {frame}: expected drawcall {expected_draw}, reached {actual_draw}");
        self.frame.store(frame, Ordering::Relaxed);
        self.inconsistent.store(true, Ordering::Release);
    }

    /// Forget any mismatch; called when a new frame begins.
    pub fn reset(&self) {
        self.inconsistent.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        !self.inconsistent.load(Ordering::Acquire)
    }

    /// # Errors
    ///
    /// [`TraceError::InconsistentDrawcalls`] if a mismatch was reported.
    pub fn check(&self) -> Result<(), TraceError> {
        if self.is_consistent() {
            return Ok(());
        }
        Err(TraceError::InconsistentDrawcalls {
            frame: self.frame.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_until_reset() {
        let guard = DrawcallConsistency::new();
        assert!(guard.check().is_ok());
        guard.report_mismatch(4, 10, 11);
        assert!(matches!(
            guard.check(),
            Err(TraceError::InconsistentDrawcalls { frame: 4 })
        ));
        guard.reset();
        assert!(guard.check().is_ok());
    }
}
