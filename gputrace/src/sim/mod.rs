//! Software GPU backend
//!
//! Implements the profiler's device traits in host memory so the tracing
//! pipeline can run, and be tested, without a graphics driver:
//!
//! - [`SimDevice`] - query heaps, readback buffers, fences, fault injection
//! - [`SimCommandList`] - records queries and work
//! - [`SimQueue`] - executes submissions on a dedicated GPU thread

mod command_list;
mod device;
mod queue;

pub use command_list::SimCommandList;
pub use device::{SimDevice, SimFence};
pub use queue::SimQueue;
