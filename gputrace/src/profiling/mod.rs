//! GPU-side profiling of command lists
//!
//! - `device`: the backend traits and move-only resource handles
//! - `measurement`: configuration, measurement groups and results
//! - `fence`: fence value bookkeeping for harvesting
//! - `cmd_list_profiler`: the begin/end/harvest protocol

pub mod cmd_list_profiler;
pub mod device;
pub mod fence;
pub mod measurement;

pub use cmd_list_profiler::{CommandListProfiler, ProfilerState};
pub use device::{CommandQueue, CommandRecorder, GpuFence, ProfilerDevice, QueryHeap, ReadbackBuffer};
pub use fence::FenceWait;
pub use measurement::{
    MeasurementGroup, MeasurementId, MeasurementInfo, MeasurementTypes, ProfilerConfig,
    ProfilerResult, TimestampResult, DEFAULT_MEASUREMENTS_PER_GROUP,
};
