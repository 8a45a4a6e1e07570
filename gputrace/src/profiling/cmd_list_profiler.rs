//! GPU timing of individual calls recorded into command lists.
//!
//! # Protocol
//!
//! ```text
//!            begin_cmd_measurement          end_cmd_measurement
//!   Init ─────────────────────────▶ Started ───────────────────▶ Ended
//!                                      ▲                            │
//!                                      └────────────────────────────┘
//!                                          begin_cmd_measurement
//! ```
//!
//! Each begin/end pair brackets one intercepted call with a start and end
//! timestamp (and optionally a pipeline-statistics query). Measurements are
//! packed into [`MeasurementGroup`]s of fixed capacity; a full group causes a
//! new one to be allocated on the next begin.
//!
//! After the command list has been submitted, [`CommandListProfiler::get_cmd_list_results`]
//! signals the queue's own fence, waits for it, reads every group back and
//! releases all of the command list's GPU resources. Fences are created per
//! queue on first harvest; a value reached on one queue says nothing about
//! another.
//!
//! # Clock correlation
//!
//! GPU clock values are rebased against the earliest start clock of the
//! command list's oldest group, so adjusted values are never negative and the
//! measurements of one submission share a zero point. Durations are converted
//! with the queue's timestamp frequency, fetched once per queue.

use super::device::{CommandQueue, CommandRecorder, ProfilerDevice};
use super::fence::FenceTracker;
use super::measurement::{
    GroupReadback, MeasurementGroup, MeasurementId, MeasurementInfo, ProfilerConfig,
    ProfilerResult, TimestampResult,
};
use crate::domain::{CommandListId, ProfilerError, QueueId};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Position of a command list in the measurement protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfilerState {
    #[default]
    Init,
    Started,
    Ended,
}

#[derive(Debug, Default)]
struct CmdListData {
    state: ProfilerState,
    measurement_count: u64,
    groups: Vec<MeasurementGroup>,
}

impl CmdListData {
    fn active_group(
        &mut self,
        device: &dyn ProfilerDevice,
        config: &ProfilerConfig,
    ) -> Result<&mut MeasurementGroup, ProfilerError> {
        if self.groups.last().map_or(true, MeasurementGroup::is_full) {
            self.groups.push(MeasurementGroup::allocate(device, config)?);
        }
        self.groups.last_mut().ok_or_else(|| {
            ProfilerError::InvalidConfig("measurement group has no capacity".to_string())
        })
    }
}

/// Injects GPU queries around calls on command lists and collects their results.
pub struct CommandListProfiler {
    device: Arc<dyn ProfilerDevice>,
    config: ProfilerConfig,
    fences: RwLock<HashMap<QueueId, Arc<FenceTracker>>>,
    command_lists: Mutex<HashMap<CommandListId, CmdListData>>,
    queue_frequencies: RwLock<HashMap<QueueId, u64>>,
}

impl CommandListProfiler {
    /// Create a profiler that allocates its resources from `device`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilerError::InvalidConfig`] for an invalid `config`.
    pub fn new(device: Arc<dyn ProfilerDevice>, config: ProfilerConfig) -> Result<Self, ProfilerError> {
        config.validate()?;
        Ok(Self {
            device,
            config,
            fences: RwLock::new(HashMap::new()),
            command_lists: Mutex::new(HashMap::new()),
            queue_frequencies: RwLock::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Open a measurement on `list` for the call described by `id`.
    ///
    /// # Errors
    ///
    /// - [`ProfilerError::MeasurementAlreadyStarted`] if the previous
    ///   measurement on `list` was never ended
    /// - [`ProfilerError::Device`] if a new measurement group could not be
    ///   allocated; the command list is left as it was
    pub fn begin_cmd_measurement(
        &self,
        list: &dyn CommandRecorder,
        id: &MeasurementId,
    ) -> Result<(), ProfilerError> {
        let list_id = list.id();
        let mut lists = self.command_lists.lock();

        if lists.get(&list_id).is_some_and(|d| d.state == ProfilerState::Started) {
            return Err(ProfilerError::MeasurementAlreadyStarted(list_id));
        }

        let data = lists.entry(list_id).or_default();
        let measurement_num = data.measurement_count + 1;
        let group = match data.active_group(self.device.as_ref(), &self.config) {
            Ok(group) => group,
            Err(e) => {
                if data.groups.is_empty() {
                    lists.remove(&list_id);
                }
                warn!("{list_id}: measurement unavailable: {e}");
                return Err(e);
            }
        };

        group.begin(
            list,
            MeasurementInfo {
                sample_id: id.sample_id,
                func_id: id.func_id,
                frame_index: id.frame_index,
                command_list: list_id,
                measurement_num,
            },
        );
        data.measurement_count = measurement_num;
        data.state = ProfilerState::Started;
        Ok(())
    }

    /// Close the measurement opened by the last [`begin_cmd_measurement`](Self::begin_cmd_measurement).
    ///
    /// # Errors
    ///
    /// [`ProfilerError::MeasurementNotStarted`] if no measurement is open on
    /// `list`. Nothing is modified in that case.
    pub fn end_cmd_measurement(&self, list: &dyn CommandRecorder) -> Result<(), ProfilerError> {
        let list_id = list.id();
        let mut lists = self.command_lists.lock();
        let data = lists
            .get_mut(&list_id)
            .filter(|d| d.state == ProfilerState::Started)
            .ok_or(ProfilerError::MeasurementNotStarted(list_id))?;
        let group = data
            .groups
            .last()
            .ok_or(ProfilerError::MeasurementNotStarted(list_id))?;
        group.end(list);
        data.state = ProfilerState::Ended;
        Ok(())
    }

    /// Wait for `list`'s work on `queue` to finish and collect one result per
    /// completed measurement, in recorded order.
    ///
    /// All GPU resources of the command list are released; a second call
    /// without new measurements reports [`ProfilerError::NotMeasured`].
    ///
    /// # Errors
    ///
    /// - [`ProfilerError::NotMeasured`] if `list` has no measurements
    /// - [`ProfilerError::FenceTimeout`] if a bounded wait expires; the
    ///   measurements are kept for a later call
    /// - [`ProfilerError::Device`] if the queue's fence cannot be created, or
    ///   signalling or reading back fails
    pub fn get_cmd_list_results(
        &self,
        list: CommandListId,
        queue: &dyn CommandQueue,
    ) -> Result<Vec<ProfilerResult>, ProfilerError> {
        if !self.is_measured(list) {
            return Err(ProfilerError::NotMeasured(list));
        }

        let fence = self.queue_fence(queue)?;
        let value = fence.next_value();
        queue.signal(fence.fence(), value)?;
        fence.wait(value, self.config.fence_wait)?;

        // Another thread may have harvested the list while we waited.
        let data = self
            .command_lists
            .lock()
            .remove(&list)
            .ok_or(ProfilerError::NotMeasured(list))?;
        if data.state == ProfilerState::Started {
            warn!("{list}: harvested with a measurement still open, it is skipped");
        }

        let outcome = self
            .queue_frequency(queue)
            .and_then(|frequency| self.collect_results(list, &data, frequency));
        self.release_groups(list, data.groups);
        outcome
    }

    /// Whether `list` has measurements waiting to be harvested.
    #[must_use]
    pub fn is_measured(&self, list: CommandListId) -> bool {
        self.command_lists
            .lock()
            .get(&list)
            .is_some_and(|d| !d.groups.is_empty())
    }

    /// Protocol state of `list`.
    #[must_use]
    pub fn state(&self, list: CommandListId) -> ProfilerState {
        self.command_lists
            .lock()
            .get(&list)
            .map_or(ProfilerState::Init, |d| d.state)
    }

    /// Number of measurements in each of `list`'s groups, oldest first.
    #[must_use]
    pub fn measurement_group_sizes(&self, list: CommandListId) -> Option<Vec<usize>> {
        self.command_lists
            .lock()
            .get(&list)
            .map(|d| d.groups.iter().map(MeasurementGroup::len).collect())
    }

    /// Command lists holding measurements that were never harvested.
    #[must_use]
    pub fn outstanding_command_lists(&self) -> usize {
        self.command_lists.lock().len()
    }

    /// Timestamp frequency of `queue`, fetched from the queue on first use.
    ///
    /// # Errors
    ///
    /// Returns the device error if the queue cannot report its frequency.
    pub fn queue_frequency(&self, queue: &dyn CommandQueue) -> Result<u64, ProfilerError> {
        let queue_id = queue.id();
        if let Some(&frequency) = self.queue_frequencies.read().get(&queue_id) {
            return Ok(frequency);
        }
        let frequency = queue.timestamp_frequency()?;
        if frequency == 0 {
            warn!("{queue_id} reports a zero timestamp frequency, GPU durations are undefined");
        }
        Ok(*self
            .queue_frequencies
            .write()
            .entry(queue_id)
            .or_insert(frequency))
    }

    fn queue_fence(&self, queue: &dyn CommandQueue) -> Result<Arc<FenceTracker>, ProfilerError> {
        let queue_id = queue.id();
        if let Some(fence) = self.fences.read().get(&queue_id) {
            return Ok(Arc::clone(fence));
        }
        let fence = self.device.create_fence(0)?;
        debug!("{queue_id}: created harvest fence");
        Ok(Arc::clone(
            self.fences
                .write()
                .entry(queue_id)
                .or_insert_with(|| Arc::new(FenceTracker::new(fence))),
        ))
    }

    fn collect_results(
        &self,
        list: CommandListId,
        data: &CmdListData,
        frequency: u64,
    ) -> Result<Vec<ProfilerResult>, ProfilerError> {
        let readbacks = data
            .groups
            .iter()
            .map(|group| group.read(self.device.as_ref()))
            .collect::<Result<Vec<GroupReadback>, _>>()?;

        let last_group = data.groups.len().saturating_sub(1);
        let completed = |group_index: usize, group: &MeasurementGroup| {
            if group_index == last_group && data.state == ProfilerState::Started {
                group.len().saturating_sub(1)
            } else {
                group.len()
            }
        };

        let base_clock = match (data.groups.first(), readbacks.first()) {
            (Some(group), Some(readback)) => (0..completed(0, group))
                .filter_map(|i| readback.interval(i))
                .map(|interval| interval.start)
                .min()
                .unwrap_or(0),
            _ => 0,
        };

        let types = self.config.measurement_types;
        let mut results = Vec::new();
        for (group_index, (group, readback)) in data.groups.iter().zip(&readbacks).enumerate() {
            for (i, info) in group.infos().iter().take(completed(group_index, group)).enumerate() {
                let timestamps = if types.timestamps() {
                    let interval = readback.interval(i).ok_or(ProfilerError::ReadbackTruncated {
                        list,
                        expected: (i + 1) * gputrace_common::ProfilerInterval::SIZE,
                        actual: 0,
                    })?;
                    Some(TimestampResult::new(interval, base_clock, frequency))
                } else {
                    None
                };
                let pipeline_stats = if types.pipeline_stats() {
                    Some(readback.pipeline_stats(i).ok_or(ProfilerError::ReadbackTruncated {
                        list,
                        expected: (i + 1) * gputrace_common::PIPELINE_STATS_SIZE,
                        actual: 0,
                    })?)
                } else {
                    None
                };
                results.push(ProfilerResult {
                    info: *info,
                    timestamps,
                    pipeline_stats,
                });
            }
        }
        debug!("{list}: {} results from {} groups", results.len(), data.groups.len());
        Ok(results)
    }

    fn release_groups(&self, list: CommandListId, groups: Vec<MeasurementGroup>) {
        let total: usize = groups.iter().map(MeasurementGroup::resource_count).sum();
        let failed: usize = groups
            .into_iter()
            .map(|group| group.release(self.device.as_ref()))
            .sum();
        if failed > 0 {
            warn!("{list}: {}", ProfilerError::ResourceLeak { failed, total });
        }
    }
}

impl Drop for CommandListProfiler {
    fn drop(&mut self) {
        let lists: Vec<_> = self.command_lists.get_mut().drain().collect();
        for (list, data) in lists {
            warn!(
                "{list}: {} measurement groups were never harvested, releasing at shutdown",
                data.groups.len()
            );
            self.release_groups(list, data.groups);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FuncId, SampleId};
    use crate::profiling::{FenceWait, MeasurementTypes};
    use crate::sim::SimDevice;

    fn profiler(device: &Arc<SimDevice>, per_group: u32, types: MeasurementTypes) -> CommandListProfiler {
        CommandListProfiler::new(
            device.clone(),
            ProfilerConfig {
                measurements_per_group: per_group,
                measurement_types: types,
                fence_wait: FenceWait::Infinite,
            },
        )
        .unwrap()
    }

    fn id(sample: u64) -> MeasurementId {
        MeasurementId {
            sample_id: SampleId(sample),
            func_id: FuncId(1),
            frame_index: 0,
        }
    }

    #[test]
    fn test_group_capacity_is_respected() {
        let device = SimDevice::new();
        let profiler = profiler(&device, 2, MeasurementTypes::TIMESTAMPS);
        let list = device.create_command_list();

        for sample in 1..=5 {
            profiler.begin_cmd_measurement(list.as_ref(), &id(sample)).unwrap();
            profiler.end_cmd_measurement(list.as_ref()).unwrap();
        }
        assert_eq!(profiler.measurement_group_sizes(list.id()), Some(vec![2, 2, 1]));
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let device = SimDevice::new();
        let profiler = profiler(&device, 4, MeasurementTypes::TIMESTAMPS);
        let list = device.create_command_list();

        profiler.begin_cmd_measurement(list.as_ref(), &id(1)).unwrap();
        let err = profiler.begin_cmd_measurement(list.as_ref(), &id(2)).unwrap_err();
        assert!(matches!(err, ProfilerError::MeasurementAlreadyStarted(_)));
        assert_eq!(profiler.measurement_group_sizes(list.id()), Some(vec![1]));
    }

    #[test]
    fn test_end_without_begin() {
        let device = SimDevice::new();
        let profiler = profiler(&device, 4, MeasurementTypes::TIMESTAMPS);
        let list = device.create_command_list();

        let err = profiler.end_cmd_measurement(list.as_ref()).unwrap_err();
        assert!(matches!(err, ProfilerError::MeasurementNotStarted(_)));
        assert_eq!(profiler.state(list.id()), ProfilerState::Init);
        assert_eq!(profiler.measurement_group_sizes(list.id()), None);
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn test_allocation_failure_leaves_list_untouched() {
        let device = SimDevice::new();
        let profiler = profiler(&device, 4, MeasurementTypes::ALL);
        let list = device.create_command_list();

        device.fail_allocations_after(1);
        let err = profiler.begin_cmd_measurement(list.as_ref(), &id(1)).unwrap_err();
        assert!(matches!(err, ProfilerError::Device(_)));
        assert_eq!(profiler.state(list.id()), ProfilerState::Init);
        assert!(!profiler.is_measured(list.id()));
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn test_results_release_resources() {
        let device = SimDevice::new();
        let queue = device.create_queue(1_000_000);
        let profiler = profiler(&device, 2, MeasurementTypes::ALL);
        let list = device.create_command_list();

        for sample in 1..=3 {
            profiler.begin_cmd_measurement(list.as_ref(), &id(sample)).unwrap();
            list.draw(30, 10);
            profiler.end_cmd_measurement(list.as_ref()).unwrap();
        }
        assert!(device.live_resources() > 0);
        queue.execute(&[list.clone()]).unwrap();

        let results = profiler.get_cmd_list_results(list.id(), &queue).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(device.live_resources(), 0);
        assert!(matches!(
            profiler.get_cmd_list_results(list.id(), &queue),
            Err(ProfilerError::NotMeasured(_))
        ));
    }

    #[test]
    fn test_unharvested_lists_released_on_drop() {
        let device = SimDevice::new();
        let list = device.create_command_list();
        {
            let profiler = profiler(&device, 2, MeasurementTypes::TIMESTAMPS);
            profiler.begin_cmd_measurement(list.as_ref(), &id(1)).unwrap();
            assert_eq!(profiler.outstanding_command_lists(), 1);
        }
        assert_eq!(device.live_resources(), 0);
    }
}
