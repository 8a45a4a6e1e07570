//! GPU device boundary used by the command list profiler.
//!
//! The profiler never talks to a graphics API directly. It allocates query
//! heaps and readback buffers through a [`ProfilerDevice`], injects queries
//! through a [`CommandRecorder`], and synchronizes with the GPU through a
//! [`CommandQueue`] and a [`GpuFence`]. Backends implement these four traits.
//!
//! Resource handles ([`QueryHeap`], [`ReadbackBuffer`]) are move-only: the
//! release calls consume them, so a handle cannot be released twice.

use crate::domain::{CommandListId, DeviceError, QueueId};
use gputrace_common::QueryKind;
use std::sync::Arc;
use std::time::Duration;

/// A block of GPU queries of one kind.
#[derive(Debug, PartialEq, Eq)]
pub struct QueryHeap {
    id: u64,
    kind: QueryKind,
    count: u32,
}

impl QueryHeap {
    /// Handle for a heap the backend has allocated under `id`.
    #[must_use]
    pub fn new(id: u64, kind: QueryKind, count: u32) -> Self {
        Self { id, kind, count }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Number of query slots.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// CPU-readable memory that resolved queries are copied into.
#[derive(Debug, PartialEq, Eq)]
pub struct ReadbackBuffer {
    id: u64,
    size: usize,
}

impl ReadbackBuffer {
    #[must_use]
    pub fn new(id: u64, size: usize) -> Self {
        Self { id, size }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Allocates and frees the GPU resources a measurement needs.
pub trait ProfilerDevice: Send + Sync {
    /// # Errors
    ///
    /// Returns [`DeviceError::AllocationFailed`] when the device is out of resources.
    fn create_query_heap(&self, kind: QueryKind, count: u32) -> Result<QueryHeap, DeviceError>;

    /// # Errors
    ///
    /// Returns [`DeviceError::AllocationFailed`] when the device is out of resources.
    fn create_readback_buffer(&self, size: usize) -> Result<ReadbackBuffer, DeviceError>;

    /// Copy the current contents of `buffer` out of GPU memory.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::MapFailed`] if the buffer cannot be mapped.
    fn read_buffer(&self, buffer: &ReadbackBuffer) -> Result<Vec<u8>, DeviceError>;

    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidHandle`] if the device does not know the heap.
    fn release_query_heap(&self, heap: QueryHeap) -> Result<(), DeviceError>;

    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidHandle`] if the device does not know the buffer.
    fn release_readback_buffer(&self, buffer: ReadbackBuffer) -> Result<(), DeviceError>;

    /// # Errors
    ///
    /// Returns [`DeviceError::AllocationFailed`] when the fence cannot be created.
    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn GpuFence>, DeviceError>;
}

/// A command list that queries can be recorded into.
///
/// Query indices address slots of the heap; the query kind comes from the heap.
pub trait CommandRecorder: Send + Sync {
    fn id(&self) -> CommandListId;

    fn begin_query(&self, heap: &QueryHeap, index: u32);

    fn end_query(&self, heap: &QueryHeap, index: u32);

    /// Copy `count` resolved queries starting at `start` into `dest` at byte
    /// offset `dest_offset`.
    fn resolve_query_data(
        &self,
        heap: &QueryHeap,
        start: u32,
        count: u32,
        dest: &ReadbackBuffer,
        dest_offset: usize,
    );
}

/// A queue that executes submitted command lists in order.
pub trait CommandQueue: Send + Sync {
    fn id(&self) -> QueueId;

    /// Ticks per second of the queue's timestamp clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report the frequency.
    fn timestamp_frequency(&self) -> Result<u64, DeviceError>;

    /// Set `fence` to `value` once all previously submitted work has finished.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::QueueClosed`] if the queue no longer accepts work.
    fn signal(&self, fence: &Arc<dyn GpuFence>, value: u64) -> Result<(), DeviceError>;
}

/// A monotonic 64-bit counter the GPU advances.
pub trait GpuFence: Send + Sync {
    /// Highest value the fence has reached.
    fn completed_value(&self) -> u64;

    /// Advance the fence to `value`. Values never move backwards.
    fn signal(&self, value: u64);

    /// Block until the fence reaches `value` or `timeout` expires
    /// (`None` waits forever). Returns whether the value was reached.
    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> bool;
}
