//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep the many integer identifiers of a trace apart:
//! a thread id is not a sample id, and a command list id is not a queue id.

use std::fmt;

/// Thread ID
///
/// The kernel thread id of a thread that issued traced calls. Trace output is
/// ordered by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl ThreadId {
    /// Id of the calling thread.
    ///
    /// Uses the kernel thread id on Linux; elsewhere a process-local counter
    /// assigns each thread a stable id on first use.
    #[must_use]
    pub fn current() -> Self {
        CURRENT_THREAD.with(|tid| *tid)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

thread_local! {
    static CURRENT_THREAD: ThreadId = ThreadId(os_thread_id());
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code, clippy::cast_sign_loss)]
fn os_thread_id() -> u32 {
    // SAFETY: gettid has no preconditions and cannot fail.
    let tid = unsafe { libc::gettid() };
    tid as u32
}

#[cfg(not(target_os = "linux"))]
fn os_thread_id() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};
    static NEXT: AtomicU32 = AtomicU32::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Identifier tying a CPU call record to its GPU measurement
///
/// Unique within the process; zero is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleId(pub u64);

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of an intercepted API function in the [`FunctionRegistry`](crate::functions::FunctionRegistry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FUNC:{}", self.0)
    }
}

/// Identity of a command list (the recorded, not yet submitted, GPU work)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandListId(pub u64);

impl fmt::Display for CommandListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CL:{}", self.0)
    }
}

/// Identity of a command queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(pub u64);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q:{}", self.0)
    }
}

/// Identity of the API object a call was made on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Raw host clock reading in ticks of [`HostClock::frequency`](crate::timing::HostClock::frequency)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Ticks elapsed since `earlier` (zero if `earlier` is later).
    #[must_use]
    pub fn ticks_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_stable_per_thread() {
        let a = ThreadId::current();
        let b = ThreadId::current();
        assert_eq!(a, b);
        let other = std::thread::spawn(ThreadId::current).join().unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_display() {
        assert_eq!(ThreadId(42).to_string(), "TID:42");
        assert_eq!(CommandListId(7).to_string(), "CL:7");
        assert_eq!(ObjectId(255).to_string(), "0xff");
    }

    #[test]
    fn test_timestamp_ticks_since_saturates() {
        assert_eq!(Timestamp(10).ticks_since(Timestamp(4)), 6);
        assert_eq!(Timestamp(4).ticks_since(Timestamp(10)), 0);
    }
}
