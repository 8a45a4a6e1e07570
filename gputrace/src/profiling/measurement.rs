//! Measurement groups and profiler results.
//!
//! A [`MeasurementGroup`] owns the query heaps and readback buffers for a fixed
//! number of measurements on one command list. Measurement `i` of a group uses
//! timestamp slots `2i`/`2i + 1` and pipeline-statistics slot `i`.

#![allow(clippy::cast_precision_loss)]

use super::device::{CommandRecorder, ProfilerDevice, QueryHeap, ReadbackBuffer};
use super::fence::FenceWait;
use crate::domain::{CommandListId, DeviceError, FuncId, ProfilerError, SampleId};
use gputrace_common::{
    PipelineStatistics, ProfilerInterval, QueryKind, MEASUREMENT_NONE, MEASUREMENT_PIPE_STATS,
    MEASUREMENT_TIMESTAMPS, PIPELINE_STATS_SIZE, TIMESTAMPS_PER_MEASUREMENT, TIMESTAMP_SIZE,
};
use log::warn;
use std::ops::BitOr;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Default number of measurements sharing one set of query heaps.
pub const DEFAULT_MEASUREMENTS_PER_GROUP: u32 = 256;

/// Which GPU data is collected per measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementTypes(u32);

impl MeasurementTypes {
    pub const NONE: Self = Self(MEASUREMENT_NONE);
    pub const TIMESTAMPS: Self = Self(MEASUREMENT_TIMESTAMPS);
    pub const PIPE_STATS: Self = Self(MEASUREMENT_PIPE_STATS);
    pub const ALL: Self = Self(MEASUREMENT_TIMESTAMPS | MEASUREMENT_PIPE_STATS);

    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[must_use]
    pub fn timestamps(self) -> bool {
        self.contains(Self::TIMESTAMPS)
    }

    #[must_use]
    pub fn pipeline_stats(self) -> bool {
        self.contains(Self::PIPE_STATS)
    }
}

impl BitOr for MeasurementTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Fixed for the lifetime of a profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerConfig {
    pub measurements_per_group: u32,
    pub measurement_types: MeasurementTypes,
    pub fence_wait: FenceWait,
}

impl ProfilerConfig {
    /// # Errors
    ///
    /// Returns [`ProfilerError::InvalidConfig`] for a zero group capacity.
    pub fn validate(&self) -> Result<(), ProfilerError> {
        if self.measurements_per_group == 0 {
            return Err(ProfilerError::InvalidConfig(
                "measurements_per_group must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            measurements_per_group: DEFAULT_MEASUREMENTS_PER_GROUP,
            measurement_types: MeasurementTypes::TIMESTAMPS,
            fence_wait: FenceWait::Infinite,
        }
    }
}

// =============================================================================
// MEASUREMENT IDENTITY AND RESULTS
// =============================================================================

/// What the caller knows about a measurement when it begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementId {
    pub sample_id: SampleId,
    pub func_id: FuncId,
    pub frame_index: u64,
}

/// A measurement as recorded on a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementInfo {
    pub sample_id: SampleId,
    pub func_id: FuncId,
    pub frame_index: u64,
    pub command_list: CommandListId,
    /// 1-based position among all measurements of the command list.
    pub measurement_num: u64,
}

/// Timing of one measured call on the GPU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampResult {
    /// Clock values as written by the GPU.
    pub raw: ProfilerInterval,
    /// Clock values relative to the batch's base clock.
    pub adjusted: ProfilerInterval,
    /// Execution time in microseconds, `None` without a known queue frequency.
    pub duration_us: Option<f64>,
}

impl TimestampResult {
    #[must_use]
    pub fn new(raw: ProfilerInterval, base_clock: u64, frequency: u64) -> Self {
        let adjusted = ProfilerInterval {
            start: raw.start.saturating_sub(base_clock),
            end: raw.end.saturating_sub(base_clock),
        };
        let duration_us = crate::timing::ticks_to_seconds(raw.ticks(), frequency)
            .map(|secs| secs * 1_000_000.0);
        Self {
            raw,
            adjusted,
            duration_us,
        }
    }
}

/// Outcome of one measurement, immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilerResult {
    pub info: MeasurementInfo,
    pub timestamps: Option<TimestampResult>,
    pub pipeline_stats: Option<PipelineStatistics>,
}

// =============================================================================
// MEASUREMENT GROUP
// =============================================================================

#[derive(Debug)]
struct QuerySet {
    heap: QueryHeap,
    buffer: ReadbackBuffer,
}

impl QuerySet {
    fn allocate(
        device: &dyn ProfilerDevice,
        kind: QueryKind,
        queries: u32,
        bytes: usize,
    ) -> Result<Self, DeviceError> {
        let heap = device.create_query_heap(kind, queries)?;
        match device.create_readback_buffer(bytes) {
            Ok(buffer) => Ok(Self { heap, buffer }),
            Err(e) => {
                if let Err(release) = device.release_query_heap(heap) {
                    warn!("Failed to release query heap after allocation failure: {release}");
                }
                Err(e)
            }
        }
    }

    /// Release both resources, returning how many failed.
    fn release(self, device: &dyn ProfilerDevice) -> usize {
        let mut failed = 0;
        if let Err(e) = device.release_query_heap(self.heap) {
            warn!("Failed to release query heap: {e}");
            failed += 1;
        }
        if let Err(e) = device.release_readback_buffer(self.buffer) {
            warn!("Failed to release readback buffer: {e}");
            failed += 1;
        }
        failed
    }
}

/// Resolved memory of a group, copied out of the readback buffers.
#[derive(Debug, Default)]
pub(crate) struct GroupReadback {
    timestamps: Option<Vec<u8>>,
    pipeline_stats: Option<Vec<u8>>,
}

impl GroupReadback {
    pub(crate) fn interval(&self, index: usize) -> Option<ProfilerInterval> {
        let bytes = self.timestamps.as_deref()?;
        ProfilerInterval::from_le_bytes(bytes.get(index * ProfilerInterval::SIZE..)?)
    }

    pub(crate) fn pipeline_stats(&self, index: usize) -> Option<PipelineStatistics> {
        let bytes = self.pipeline_stats.as_deref()?;
        PipelineStatistics::from_le_bytes(bytes.get(index * PIPELINE_STATS_SIZE..)?)
    }
}

/// Query resources and bookkeeping for up to `capacity` measurements.
#[derive(Debug)]
pub struct MeasurementGroup {
    capacity: u32,
    timestamps: Option<QuerySet>,
    pipeline_stats: Option<QuerySet>,
    infos: Vec<MeasurementInfo>,
}

impl MeasurementGroup {
    /// Allocate the heaps and buffers `config` asks for.
    ///
    /// # Errors
    ///
    /// Returns the device error of the first failed allocation; anything
    /// allocated before it is released again.
    pub fn allocate(device: &dyn ProfilerDevice, config: &ProfilerConfig) -> Result<Self, DeviceError> {
        let capacity = config.measurements_per_group;
        let slots = capacity as usize;
        let types = config.measurement_types;

        let timestamps = if types.timestamps() {
            Some(QuerySet::allocate(
                device,
                QueryKind::Timestamp,
                capacity * TIMESTAMPS_PER_MEASUREMENT,
                slots * TIMESTAMPS_PER_MEASUREMENT as usize * TIMESTAMP_SIZE,
            )?)
        } else {
            None
        };

        let pipeline_stats = if types.pipeline_stats() {
            match QuerySet::allocate(
                device,
                QueryKind::PipelineStatistics,
                capacity,
                slots * PIPELINE_STATS_SIZE,
            ) {
                Ok(set) => Some(set),
                Err(e) => {
                    if let Some(set) = timestamps {
                        set.release(device);
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            capacity,
            timestamps,
            pipeline_stats,
            infos: Vec::with_capacity(slots),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.infos.len() >= self.capacity as usize
    }

    #[must_use]
    pub fn infos(&self) -> &[MeasurementInfo] {
        &self.infos
    }

    /// Open measurement `info` in the next free slot.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn begin(&mut self, list: &dyn CommandRecorder, info: MeasurementInfo) {
        let index = self.infos.len() as u32;
        if let Some(set) = &self.pipeline_stats {
            list.begin_query(&set.heap, index);
        }
        if let Some(set) = &self.timestamps {
            list.end_query(&set.heap, index * TIMESTAMPS_PER_MEASUREMENT);
        }
        self.infos.push(info);
    }

    /// Close the most recently opened measurement and resolve its queries.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn end(&self, list: &dyn CommandRecorder) {
        let Some(last) = self.infos.len().checked_sub(1) else {
            return;
        };
        let index = last as u32;
        if let Some(set) = &self.timestamps {
            let first = index * TIMESTAMPS_PER_MEASUREMENT;
            list.end_query(&set.heap, first + 1);
            list.resolve_query_data(
                &set.heap,
                first,
                TIMESTAMPS_PER_MEASUREMENT,
                &set.buffer,
                first as usize * TIMESTAMP_SIZE,
            );
        }
        if let Some(set) = &self.pipeline_stats {
            list.end_query(&set.heap, index);
            list.resolve_query_data(&set.heap, index, 1, &set.buffer, last * PIPELINE_STATS_SIZE);
        }
    }

    /// Copy the resolved data out of the readback buffers.
    pub(crate) fn read(&self, device: &dyn ProfilerDevice) -> Result<GroupReadback, DeviceError> {
        Ok(GroupReadback {
            timestamps: self
                .timestamps
                .as_ref()
                .map(|set| device.read_buffer(&set.buffer))
                .transpose()?,
            pipeline_stats: self
                .pipeline_stats
                .as_ref()
                .map(|set| device.read_buffer(&set.buffer))
                .transpose()?,
        })
    }

    /// Number of GPU resources this group holds.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        2 * (usize::from(self.timestamps.is_some()) + usize::from(self.pipeline_stats.is_some()))
    }

    /// Release every heap and buffer, returning how many releases failed.
    pub fn release(self, device: &dyn ProfilerDevice) -> usize {
        self.timestamps.map_or(0, |set| set.release(device))
            + self.pipeline_stats.map_or(0, |set| set.release(device))
    }
}
