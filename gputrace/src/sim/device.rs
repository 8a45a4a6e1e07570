//! Software device: query heaps, readback buffers and fences in host memory.

use super::command_list::SimCommandList;
use super::queue::SimQueue;
use crate::domain::{CommandListId, DeviceError, QueueId};
use crate::profiling::{GpuFence, ProfilerDevice, QueryHeap, ReadbackBuffer};
use gputrace_common::{PipelineStatistics, QueryKind};
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub(crate) enum HeapStorage {
    Timestamps(Vec<u64>),
    PipelineStats(Vec<PipelineStatistics>),
}

#[derive(Debug, Default)]
pub(crate) struct SimMemory {
    pub(crate) heaps: HashMap<u64, HeapStorage>,
    pub(crate) buffers: HashMap<u64, Vec<u8>>,
}

#[derive(Debug, Default)]
struct FaultInjection {
    allocations_left: Option<usize>,
    fail_releases: bool,
}

/// A GPU device that lives entirely in host memory.
#[derive(Debug, Default)]
pub struct SimDevice {
    next_id: AtomicU64,
    memory: Mutex<SimMemory>,
    faults: Mutex<FaultInjection>,
}

impl SimDevice {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    pub fn create_command_list(&self) -> Arc<SimCommandList> {
        Arc::new(SimCommandList::new(CommandListId(self.next_id())))
    }

    /// Queue whose timestamp clock runs at `frequency` ticks per second.
    #[must_use]
    pub fn create_queue(self: &Arc<Self>, frequency: u64) -> SimQueue {
        SimQueue::spawn(QueueId(self.next_id()), frequency, Arc::clone(self))
    }

    /// Let the next `successes` allocations succeed and fail every one after.
    pub fn fail_allocations_after(&self, successes: usize) {
        self.faults.lock().allocations_left = Some(successes);
    }

    /// Make every release fail and leave the resource alive.
    pub fn set_fail_releases(&self, fail: bool) {
        self.faults.lock().fail_releases = fail;
    }

    /// Heaps and buffers currently allocated.
    #[must_use]
    pub fn live_resources(&self) -> usize {
        let memory = self.memory.lock();
        memory.heaps.len() + memory.buffers.len()
    }

    pub(crate) fn with_memory<R>(&self, f: impl FnOnce(&mut SimMemory) -> R) -> R {
        f(&mut self.memory.lock())
    }

    fn check_allocation(&self, what: &'static str) -> Result<(), DeviceError> {
        let mut faults = self.faults.lock();
        match faults.allocations_left {
            Some(0) => Err(DeviceError::AllocationFailed {
                what,
                reason: "simulated out of memory".to_string(),
            }),
            Some(ref mut left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn check_release(&self, id: u64) -> Result<(), DeviceError> {
        if self.faults.lock().fail_releases {
            return Err(DeviceError::InvalidHandle(id));
        }
        Ok(())
    }
}

impl ProfilerDevice for SimDevice {
    fn create_query_heap(&self, kind: QueryKind, count: u32) -> Result<QueryHeap, DeviceError> {
        self.check_allocation("query heap")?;
        let id = self.next_id();
        let slots = count as usize;
        let storage = match kind {
            QueryKind::Timestamp => HeapStorage::Timestamps(vec![0; slots]),
            QueryKind::PipelineStatistics => {
                HeapStorage::PipelineStats(vec![PipelineStatistics::default(); slots])
            }
        };
        self.memory.lock().heaps.insert(id, storage);
        debug!("sim: query heap {id} ({kind:?} x{count})");
        Ok(QueryHeap::new(id, kind, count))
    }

    fn create_readback_buffer(&self, size: usize) -> Result<ReadbackBuffer, DeviceError> {
        self.check_allocation("readback buffer")?;
        let id = self.next_id();
        self.memory.lock().buffers.insert(id, vec![0; size]);
        Ok(ReadbackBuffer::new(id, size))
    }

    fn read_buffer(&self, buffer: &ReadbackBuffer) -> Result<Vec<u8>, DeviceError> {
        self.memory
            .lock()
            .buffers
            .get(&buffer.id())
            .cloned()
            .ok_or(DeviceError::MapFailed(buffer.id()))
    }

    fn release_query_heap(&self, heap: QueryHeap) -> Result<(), DeviceError> {
        self.check_release(heap.id())?;
        self.memory
            .lock()
            .heaps
            .remove(&heap.id())
            .map(|_| ())
            .ok_or(DeviceError::InvalidHandle(heap.id()))
    }

    fn release_readback_buffer(&self, buffer: ReadbackBuffer) -> Result<(), DeviceError> {
        self.check_release(buffer.id())?;
        self.memory
            .lock()
            .buffers
            .remove(&buffer.id())
            .map(|_| ())
            .ok_or(DeviceError::InvalidHandle(buffer.id()))
    }

    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn GpuFence>, DeviceError> {
        Ok(Arc::new(SimFence::new(initial_value)))
    }
}

/// Fence backed by a mutex and condition variable.
#[derive(Debug, Default)]
pub struct SimFence {
    value: Mutex<u64>,
    reached: Condvar,
}

impl SimFence {
    #[must_use]
    pub fn new(initial_value: u64) -> Self {
        Self {
            value: Mutex::new(initial_value),
            reached: Condvar::new(),
        }
    }
}

impl GpuFence for SimFence {
    fn completed_value(&self) -> u64 {
        *self.value.lock()
    }

    fn signal(&self, value: u64) {
        let mut current = self.value.lock();
        if value > *current {
            *current = value;
            self.reached.notify_all();
        }
    }

    fn wait_for(&self, value: u64, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut current = self.value.lock();
        while *current < value {
            match deadline {
                Some(deadline) => {
                    if self.reached.wait_until(&mut current, deadline).timed_out() {
                        return *current >= value;
                    }
                }
                None => self.reached.wait(&mut current),
            }
        }
        true
    }
}
