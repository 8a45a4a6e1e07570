//! Hotspot analysis for traced frames.
//!
//! Aggregates traced calls by function name to show where a frame's CPU time
//! goes and which calls keep the GPU busy.
//!
//! # Architecture
//!
//! - **`HotspotStats`** - Running aggregation across many traced frames
//! - **`analyze_hotspots()`** - One-shot analysis of a single `FrameTrace`
//!
//! ## Data Flow
//!
//! ```text
//! FrameTrace
//!     │
//!     ├──► HotspotStats.record_frame()  ← Accumulates over a session
//!     │
//!     └──► analyze_hotspots()           ← Per-frame report
//! ```

// Percentage calculations intentionally convert usize to f64
#![allow(clippy::cast_precision_loss)]

use crate::capture::FrameTrace;
use std::collections::HashMap;

// =============================================================================
// FUNCTION HOTSPOT (OUTPUT TYPE)
// =============================================================================

/// A function hotspot with aggregated statistics.
///
/// ```text
/// HOTSPOTS (frame 12)
/// ─────────────────────────────────────────────
///   ID3D12GraphicsCommandList_DrawInstanced  62.5%  cpu 0.412ms  gpu 180.2us
///   ID3D12GraphicsCommandList_Dispatch       12.5%  cpu 0.051ms  gpu 96.0us
/// ```
#[derive(Debug, Clone)]
pub struct FunctionHotspot {
    /// Intercepted function name (e.g., "ID3D12GraphicsCommandList_DrawInstanced").
    pub name: String,

    /// Number of traced calls.
    pub count: usize,

    /// Percentage of all traced calls (0.0 - 100.0).
    pub percentage: f64,

    /// CPU seconds spent inside the call, summed over calls with defined timing.
    pub total_cpu_secs: f64,

    /// GPU microseconds measured for the function's samples.
    pub total_gpu_us: f64,

    /// Per-thread breakdown: thread id → call count.
    pub threads: HashMap<u32, usize>,
}

// =============================================================================
// HOTSPOT STATS (AGGREGATOR)
// =============================================================================

/// Hotspot statistics accumulated over several frames.
#[derive(Debug, Default)]
pub struct HotspotStats {
    functions: HashMap<String, FunctionStats>,
    total_calls: u64,
    frames: u64,
}

#[derive(Debug, Clone, Default)]
struct FunctionStats {
    count: u64,
    cpu_secs: f64,
    gpu_us: f64,
    threads: HashMap<u32, u64>,
}

impl HotspotStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every call and GPU sample of `trace` into the statistics.
    pub fn record_frame(&mut self, trace: &FrameTrace) {
        self.frames += 1;
        for call in &trace.calls {
            self.total_calls += 1;
            let stats = self.functions.entry(call.function.clone()).or_default();
            stats.count += 1;
            if let (Some(start), Some(end)) = (call.start_secs, call.end_secs) {
                stats.cpu_secs += end - start;
            }
            *stats.threads.entry(call.thread_id.0).or_insert(0) += 1;
        }
        for sample in &trace.gpu_samples {
            if let Some(us) = sample.duration_us {
                self.functions.entry(sample.function.clone()).or_default().gpu_us += us;
            }
        }
    }

    /// Calls recorded across all frames
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.total_calls
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Hotspots sorted by call count, most frequent first
    #[must_use]
    pub fn to_hotspots(&self) -> Vec<FunctionHotspot> {
        let mut hotspots: Vec<FunctionHotspot> = self
            .functions
            .iter()
            .map(|(name, stats)| FunctionHotspot {
                name: name.clone(),
                count: stats.count as usize,
                percentage: percentage(stats.count as usize, self.total_calls as usize),
                total_cpu_secs: stats.cpu_secs,
                total_gpu_us: stats.gpu_us,
                threads: stats.threads.iter().map(|(&k, &v)| (k, v as usize)).collect(),
            })
            .collect();
        sort_hotspots(&mut hotspots);
        hotspots
    }
}

/// Analyze one frame's trace.
///
/// Functions that only appear as GPU samples (the CPU trace was not requested)
/// are reported with a zero call count.
#[must_use]
pub fn analyze_hotspots(trace: &FrameTrace) -> Vec<FunctionHotspot> {
    let mut stats = HotspotStats::new();
    stats.record_frame(trace);
    stats.to_hotspots()
}

fn percentage(count: usize, total: usize) -> f64 {
    if total > 0 {
        (count as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

fn sort_hotspots(hotspots: &mut [FunctionHotspot]) {
    // Name breaks ties so reports are stable between runs
    hotspots.sort_unstable_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{TracedCall, TracedGpuSample};
    use crate::domain::{CommandListId, FuncId, QueueId, SampleId, ThreadId};

    fn call(thread: u32, function: &str, secs: f64) -> TracedCall {
        TracedCall {
            thread_id: ThreadId(thread),
            func_id: FuncId(0),
            function: function.to_string(),
            arguments: String::new(),
            return_value: 0,
            start_secs: Some(0.0),
            end_secs: Some(secs),
            sample_id: None,
            is_draw: false,
        }
    }

    fn gpu(function: &str, us: Option<f64>) -> TracedGpuSample {
        TracedGpuSample {
            queue_id: QueueId(1),
            command_list: CommandListId(1),
            sample_id: SampleId(1),
            func_id: FuncId(0),
            function: function.to_string(),
            start_secs: None,
            end_secs: None,
            duration_us: us,
            pipeline_stats: None,
        }
    }

    #[test]
    fn test_hotspots_sorted_by_count() {
        let trace = FrameTrace {
            calls: vec![
                call(1, "Draw", 0.002),
                call(2, "Draw", 0.001),
                call(2, "Draw", 0.001),
                call(1, "Close", 0.0005),
            ],
            gpu_samples: vec![gpu("Draw", Some(10.0)), gpu("Draw", None), gpu("Draw", Some(5.5))],
            ..Default::default()
        };

        let hotspots = analyze_hotspots(&trace);
        assert_eq!(hotspots.len(), 2);
        assert_eq!(hotspots[0].name, "Draw");
        assert_eq!(hotspots[0].count, 3);
        assert!((hotspots[0].percentage - 75.0).abs() < 1e-9);
        assert!((hotspots[0].total_cpu_secs - 0.004).abs() < 1e-9);
        assert!((hotspots[0].total_gpu_us - 15.5).abs() < 1e-9);
        assert_eq!(hotspots[0].threads[&2], 2);
        assert_eq!(hotspots[1].name, "Close");
    }

    #[test]
    fn test_empty_trace() {
        assert!(analyze_hotspots(&FrameTrace::default()).is_empty());
    }

    #[test]
    fn test_stats_accumulate_over_frames() {
        let trace = FrameTrace {
            calls: vec![call(1, "Present", 0.001)],
            ..Default::default()
        };
        let mut stats = HotspotStats::new();
        stats.record_frame(&trace);
        stats.record_frame(&trace);
        assert_eq!(stats.frames(), 2);
        assert_eq!(stats.total_calls(), 2);
        assert_eq!(stats.to_hotspots()[0].count, 2);
    }
}
