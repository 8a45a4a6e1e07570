//! Software command queue.
//!
//! Submissions are sent over a channel to a dedicated GPU thread that executes
//! them in order against the device's memory, advancing a tick clock:
//!
//! ```text
//! execute() ──▶ [channel] ──▶ GPU thread: timestamps, pipeline stats,
//! signal()  ──▶                           resolves, fence signals
//! ```

use super::command_list::{SimCommand, SimCommandList};
use super::device::{HeapStorage, SimDevice};
use crate::domain::{DeviceError, QueueId};
use crate::profiling::{CommandQueue, GpuFence};
use crossbeam_channel::{unbounded, Sender};
use gputrace_common::{PipelineStatistics, PIPELINE_STATS_SIZE, TIMESTAMP_SIZE};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Clock value of a fresh queue, so raw timestamps are visibly non-zero.
const CLOCK_ORIGIN: u64 = 1_000_000;

/// Clock ticks every recorded command costs in addition to its own work.
const COMMAND_OVERHEAD_TICKS: u64 = 1;

enum QueueOp {
    Execute(Vec<SimCommand>),
    Signal(Arc<dyn GpuFence>, u64),
}

/// A command queue executing on its own thread.
pub struct SimQueue {
    id: QueueId,
    frequency: u64,
    sender: Option<Sender<QueueOp>>,
    worker: Option<JoinHandle<()>>,
}

impl SimQueue {
    pub(crate) fn spawn(id: QueueId, frequency: u64, device: Arc<SimDevice>) -> Self {
        let (sender, receiver) = unbounded::<QueueOp>();
        let worker = std::thread::Builder::new()
            .name(format!("sim-gpu-{}", id.0))
            .spawn(move || {
                let mut engine = GpuEngine::new(device);
                for op in receiver {
                    match op {
                        QueueOp::Execute(commands) => engine.run(&commands),
                        QueueOp::Signal(fence, value) => fence.signal(value),
                    }
                }
                debug!("sim: {id} drained, GPU thread exiting");
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("sim: failed to start GPU thread for {id}: {e}");
                None
            }
        };
        Self {
            id,
            frequency,
            sender: worker.as_ref().map(|_| sender),
            worker,
        }
    }

    /// Submit command lists for execution in order.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::QueueClosed`] if the GPU thread is gone.
    pub fn execute(&self, lists: &[Arc<SimCommandList>]) -> Result<(), DeviceError> {
        let commands = lists.iter().flat_map(|list| list.take_commands()).collect();
        self.send(QueueOp::Execute(commands))
    }

    fn send(&self, op: QueueOp) -> Result<(), DeviceError> {
        self.sender
            .as_ref()
            .ok_or(DeviceError::QueueClosed)?
            .send(op)
            .map_err(|_| DeviceError::QueueClosed)
    }
}

impl CommandQueue for SimQueue {
    fn id(&self) -> QueueId {
        self.id
    }

    fn timestamp_frequency(&self) -> Result<u64, DeviceError> {
        Ok(self.frequency)
    }

    fn signal(&self, fence: &Arc<dyn GpuFence>, value: u64) -> Result<(), DeviceError> {
        self.send(QueueOp::Signal(Arc::clone(fence), value))
    }
}

impl Drop for SimQueue {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("sim: GPU thread for {} panicked", self.id);
            }
        }
    }
}

/// Execution state of the GPU thread.
struct GpuEngine {
    device: Arc<SimDevice>,
    clock: u64,
    totals: PipelineStatistics,
    open_stats: HashMap<(u64, u32), PipelineStatistics>,
}

impl GpuEngine {
    fn new(device: Arc<SimDevice>) -> Self {
        Self {
            device,
            clock: CLOCK_ORIGIN,
            totals: PipelineStatistics::default(),
            open_stats: HashMap::new(),
        }
    }

    fn run(&mut self, commands: &[SimCommand]) {
        let device = Arc::clone(&self.device);
        device.with_memory(|memory| {
            for command in commands {
                self.clock += COMMAND_OVERHEAD_TICKS;
                match command {
                    SimCommand::Work { ticks, stats } => {
                        self.clock += ticks;
                        self.accumulate(stats);
                    }
                    SimCommand::BeginQuery { heap, index, .. } => {
                        if matches!(memory.heaps.get(heap), Some(HeapStorage::PipelineStats(_))) {
                            self.open_stats.insert((*heap, *index), self.totals);
                        }
                    }
                    SimCommand::EndQuery { heap, index, .. } => {
                        let slot = *index as usize;
                        match memory.heaps.get_mut(heap) {
                            Some(HeapStorage::Timestamps(slots)) => {
                                if let Some(value) = slots.get_mut(slot) {
                                    *value = self.clock;
                                }
                            }
                            Some(HeapStorage::PipelineStats(slots)) => {
                                let begin = self.open_stats.remove(&(*heap, *index)).unwrap_or_default();
                                if let Some(value) = slots.get_mut(slot) {
                                    *value = self.totals.delta_since(&begin);
                                }
                            }
                            None => debug!("sim: end query on released heap {heap}"),
                        }
                    }
                    SimCommand::Resolve {
                        heap,
                        start,
                        count,
                        buffer,
                        offset,
                        ..
                    } => {
                        let bytes = match memory.heaps.get(heap) {
                            Some(storage) => resolve(storage, *start as usize, *count as usize),
                            None => continue,
                        };
                        if let Some(dest) = memory.buffers.get_mut(buffer) {
                            let end = (*offset + bytes.len()).min(dest.len());
                            if *offset < end {
                                dest[*offset..end].copy_from_slice(&bytes[..end - offset]);
                            }
                        }
                    }
                }
            }
        });
    }

    fn accumulate(&mut self, stats: &PipelineStatistics) {
        let mut sum = self.totals.counters();
        for (total, add) in sum.iter_mut().zip(stats.counters()) {
            *total += add;
        }
        self.totals = PipelineStatistics::from_counters(sum);
    }
}

fn resolve(storage: &HeapStorage, start: usize, count: usize) -> Vec<u8> {
    match storage {
        HeapStorage::Timestamps(slots) => {
            let mut out = Vec::with_capacity(count * TIMESTAMP_SIZE);
            for value in slots.iter().skip(start).take(count) {
                out.extend_from_slice(&value.to_le_bytes());
            }
            out
        }
        HeapStorage::PipelineStats(slots) => {
            let mut out = Vec::with_capacity(count * PIPELINE_STATS_SIZE);
            for stats in slots.iter().skip(start).take(count) {
                out.extend_from_slice(&stats.to_le_bytes());
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiling::{CommandRecorder, ProfilerDevice};
    use crate::sim::SimFence;
    use gputrace_common::{ProfilerInterval, QueryKind};

    #[test]
    fn test_timestamps_bracket_work() {
        let device = SimDevice::new();
        let queue = device.create_queue(1_000);
        let list = device.create_command_list();
        let heap = device.create_query_heap(QueryKind::Timestamp, 2).unwrap();
        let buffer = device.create_readback_buffer(16).unwrap();

        list.end_query(&heap, 0);
        list.draw(3, 50);
        list.end_query(&heap, 1);
        list.resolve_query_data(&heap, 0, 2, &buffer, 0);
        queue.execute(&[list]).unwrap();

        let fence: Arc<dyn GpuFence> = Arc::new(SimFence::new(0));
        queue.signal(&fence, 1).unwrap();
        assert!(fence.wait_for(1, None));

        let bytes = device.read_buffer(&buffer).unwrap();
        let interval = ProfilerInterval::from_le_bytes(&bytes).unwrap();
        assert!(interval.start >= CLOCK_ORIGIN);
        assert!(interval.ticks() >= 50);
    }

    #[test]
    fn test_pipeline_stats_count_only_bracketed_work() {
        let device = SimDevice::new();
        let queue = device.create_queue(1_000);
        let list = device.create_command_list();
        let heap = device.create_query_heap(QueryKind::PipelineStatistics, 1).unwrap();
        let buffer = device.create_readback_buffer(PIPELINE_STATS_SIZE).unwrap();

        list.draw(300, 1);
        list.begin_query(&heap, 0);
        list.draw(30, 1);
        list.end_query(&heap, 0);
        list.resolve_query_data(&heap, 0, 1, &buffer, 0);
        queue.execute(&[list]).unwrap();

        let fence: Arc<dyn GpuFence> = Arc::new(SimFence::new(0));
        queue.signal(&fence, 1).unwrap();
        assert!(fence.wait_for(1, None));

        let stats = PipelineStatistics::from_le_bytes(&device.read_buffer(&buffer).unwrap()).unwrap();
        assert_eq!(stats.ia_vertices, 30);
        assert_eq!(stats.ps_invocations, 120);
    }
}
