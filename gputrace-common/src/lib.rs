//! # Shared Data Structures (GPU ↔ Host)
//!
//! Defines the layouts the GPU writes into readback memory and the host reads
//! back after a fence completes. All types use `#[repr(C)]` and are decoded
//! from little-endian bytes, so any device backend that resolves queries into
//! a buffer can hand the raw bytes to the profiler.
//!
//! ## Query Layout
//!
//! For a measurement group of capacity `N`:
//!
//! ```text
//! timestamp heap:   [start0, end0, start1, end1, ..., start(N-1), end(N-1)]   2N slots
//! pipe stats heap:  [stats0, stats1, ..., stats(N-1)]                          N slots
//! ```
//!
//! Measurement `i` owns timestamp slots `2i` and `2i + 1` and pipeline
//! statistics slot `i`.
//!
//! ## Key Types
//!
//! - [`ProfilerInterval`] - A start/end pair of raw GPU clock values
//! - [`PipelineStatistics`] - The eleven counters of a pipeline-statistics query
//! - [`QueryKind`] - Which heap a query lives in

#![no_std]

// ============================================================================
// Measurement Type Flags
// ============================================================================

/// No GPU data is collected; results still carry their measurement info.
pub const MEASUREMENT_NONE: u32 = 0x0;

/// Begin/end timestamps are injected around each measured call.
pub const MEASUREMENT_TIMESTAMPS: u32 = 0x1;

/// A pipeline-statistics query brackets each measured call.
pub const MEASUREMENT_PIPE_STATS: u32 = 0x2;

// ============================================================================
// Layout Constants
// ============================================================================

/// Timestamp queries used by one measurement (start and end).
pub const TIMESTAMPS_PER_MEASUREMENT: u32 = 2;

/// Size in bytes of one resolved timestamp.
pub const TIMESTAMP_SIZE: usize = 8;

/// Number of counters in a resolved pipeline-statistics query.
pub const PIPELINE_STAT_COUNTERS: usize = 11;

/// Size in bytes of one resolved pipeline-statistics query.
pub const PIPELINE_STATS_SIZE: usize = PIPELINE_STAT_COUNTERS * 8;

/// Return value recorded for calls that return nothing.
///
/// Rendered as `void` in the API trace.
pub const FUNCTION_RETURNS_VOID: i64 = i64::MIN;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// Kind of query heap
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Timestamp = 0,
    PipelineStatistics = 1,
}

/// Raw GPU clock values bracketing one measured call
///
/// Units are ticks of the queue's timestamp clock; divide the difference by the
/// queue frequency to obtain seconds.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfilerInterval {
    pub start: u64,
    pub end: u64,
}

impl ProfilerInterval {
    /// Size of a resolved start/end pair.
    pub const SIZE: usize = 2 * TIMESTAMP_SIZE;

    /// Decode a start/end pair from resolved readback bytes.
    ///
    /// Returns `None` if `bytes` is shorter than [`Self::SIZE`].
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            start: read_u64(bytes, 0)?,
            end: read_u64(bytes, 1)?,
        })
    }

    /// Clock ticks elapsed between start and end (zero if the pair is inverted).
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// Pipeline statistics for one measured call
///
/// Field order matches the layout a resolved pipeline-statistics query is
/// written in.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStatistics {
    pub ia_vertices: u64,
    pub ia_primitives: u64,
    pub vs_invocations: u64,
    pub gs_invocations: u64,
    pub gs_primitives: u64,
    pub c_invocations: u64,
    pub c_primitives: u64,
    pub ps_invocations: u64,
    pub hs_invocations: u64,
    pub ds_invocations: u64,
    pub cs_invocations: u64,
}

impl PipelineStatistics {
    /// Decode one resolved query from readback bytes.
    ///
    /// Returns `None` if `bytes` is shorter than [`PIPELINE_STATS_SIZE`].
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        let mut counters = [0u64; PIPELINE_STAT_COUNTERS];
        for (i, counter) in counters.iter_mut().enumerate() {
            *counter = read_u64(bytes, i)?;
        }
        Some(Self::from_counters(counters))
    }

    /// Encode into the resolved layout.
    #[must_use]
    pub fn to_le_bytes(&self) -> [u8; PIPELINE_STATS_SIZE] {
        let mut out = [0u8; PIPELINE_STATS_SIZE];
        for (i, counter) in self.counters().iter().enumerate() {
            out[i * 8..(i + 1) * 8].copy_from_slice(&counter.to_le_bytes());
        }
        out
    }

    /// Counters in layout order.
    #[must_use]
    pub fn counters(&self) -> [u64; PIPELINE_STAT_COUNTERS] {
        [
            self.ia_vertices,
            self.ia_primitives,
            self.vs_invocations,
            self.gs_invocations,
            self.gs_primitives,
            self.c_invocations,
            self.c_primitives,
            self.ps_invocations,
            self.hs_invocations,
            self.ds_invocations,
            self.cs_invocations,
        ]
    }

    /// Build from counters in layout order.
    #[must_use]
    pub fn from_counters(c: [u64; PIPELINE_STAT_COUNTERS]) -> Self {
        Self {
            ia_vertices: c[0],
            ia_primitives: c[1],
            vs_invocations: c[2],
            gs_invocations: c[3],
            gs_primitives: c[4],
            c_invocations: c[5],
            c_primitives: c[6],
            ps_invocations: c[7],
            hs_invocations: c[8],
            ds_invocations: c[9],
            cs_invocations: c[10],
        }
    }

    /// Counter-wise `self - earlier`, saturating at zero.
    #[must_use]
    pub fn delta_since(&self, earlier: &Self) -> Self {
        let now = self.counters();
        let then = earlier.counters();
        let mut out = [0u64; PIPELINE_STAT_COUNTERS];
        for i in 0..PIPELINE_STAT_COUNTERS {
            out[i] = now[i].saturating_sub(then[i]);
        }
        Self::from_counters(out)
    }
}

fn read_u64(bytes: &[u8], index: usize) -> Option<u64> {
    let offset = index * TIMESTAMP_SIZE;
    let slice = bytes.get(offset..offset + TIMESTAMP_SIZE)?;
    let mut raw = [0u8; TIMESTAMP_SIZE];
    raw.copy_from_slice(slice);
    Some(u64::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_decode() {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&100u64.to_le_bytes());
        bytes[8..].copy_from_slice(&250u64.to_le_bytes());
        let interval = ProfilerInterval::from_le_bytes(&bytes).unwrap();
        assert_eq!(interval.start, 100);
        assert_eq!(interval.end, 250);
        assert_eq!(interval.ticks(), 150);
    }

    #[test]
    fn test_interval_short_buffer() {
        assert!(ProfilerInterval::from_le_bytes(&[0u8; 12]).is_none());
    }

    #[test]
    fn test_pipeline_stats_layout() {
        let stats = PipelineStatistics {
            ia_vertices: 3,
            ps_invocations: 7,
            cs_invocations: 11,
            ..Default::default()
        };
        let bytes = stats.to_le_bytes();
        assert_eq!(bytes.len(), PIPELINE_STATS_SIZE);
        assert_eq!(PipelineStatistics::from_le_bytes(&bytes), Some(stats));
        assert_eq!(bytes[7 * 8], 7);
    }

    #[test]
    fn test_pipeline_stats_delta_saturates() {
        let later = PipelineStatistics { ia_vertices: 10, ..Default::default() };
        let earlier = PipelineStatistics { ia_vertices: 4, vs_invocations: 2, ..Default::default() };
        let delta = later.delta_since(&earlier);
        assert_eq!(delta.ia_vertices, 6);
        assert_eq!(delta.vs_invocations, 0);
    }
}
