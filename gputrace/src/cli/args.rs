//! CLI argument definitions

use crate::profiling::{FenceWait, MeasurementTypes, ProfilerConfig, DEFAULT_MEASUREMENTS_PER_GROUP};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// GPU data collected per measured call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Measure {
    Timestamps,
    PipelineStats,
    All,
    None,
}

impl From<Measure> for MeasurementTypes {
    fn from(measure: Measure) -> Self {
        match measure {
            Measure::Timestamps => Self::TIMESTAMPS,
            Measure::PipelineStats => Self::PIPE_STATS,
            Measure::All => Self::ALL,
            Measure::None => Self::NONE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "gputrace",
    about = "Trace API calls and GPU timings of a simulated multi-threaded renderer",
    after_help = "\
EXAMPLES:
    gputrace                                 Trace frame 1, print the linked trace
    gputrace --frames 10 --trace-frame 5     Trace frame 5 of 10
    gputrace --output frame.txt --export trace.json
                                             Save the linked trace and a Chrome trace"
)]
pub struct Args {
    /// Number of frames to render (0 = until Ctrl+C)
    #[arg(long, default_value = "3")]
    pub frames: u64,

    /// Render threads recording command lists
    #[arg(long, default_value = "2")]
    pub threads: usize,

    /// Draw calls each render thread records per frame
    #[arg(long, default_value = "8")]
    pub calls: usize,

    /// Measurements per GPU query group
    #[arg(long, default_value_t = DEFAULT_MEASUREMENTS_PER_GROUP)]
    pub group_capacity: u32,

    /// GPU data collected per measured call
    #[arg(long, value_enum, default_value = "timestamps")]
    pub measure: Measure,

    /// Frame to capture a linked trace of
    #[arg(long, default_value = "1")]
    pub trace_frame: u64,

    /// Write the linked trace to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Export the traced frame as Chrome trace JSON
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Give up waiting for GPU results after this many milliseconds (0 = wait forever)
    #[arg(long, default_value = "0")]
    pub fence_timeout_ms: u64,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn profiler_config(&self) -> ProfilerConfig {
        ProfilerConfig {
            measurements_per_group: self.group_capacity,
            measurement_types: self.measure.into(),
            fence_wait: if self.fence_timeout_ms == 0 {
                FenceWait::Infinite
            } else {
                FenceWait::Bounded(Duration::from_millis(self.fence_timeout_ms))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["gputrace"]);
        assert_eq!(args.frames, 3);
        assert_eq!(args.trace_frame, 1);
        let config = args.profiler_config();
        assert_eq!(config.measurements_per_group, DEFAULT_MEASUREMENTS_PER_GROUP);
        assert_eq!(config.measurement_types, MeasurementTypes::TIMESTAMPS);
        assert_eq!(config.fence_wait, FenceWait::Infinite);
    }

    #[test]
    fn test_measure_and_timeout() {
        let args = Args::parse_from([
            "gputrace",
            "--measure",
            "pipeline-stats",
            "--fence-timeout-ms",
            "250",
            "--group-capacity",
            "4",
        ]);
        let config = args.profiler_config();
        assert_eq!(config.measurement_types, MeasurementTypes::PIPE_STATS);
        assert_eq!(config.fence_wait, FenceWait::Bounded(Duration::from_millis(250)));
        assert_eq!(config.measurements_per_group, 4);
    }
}
