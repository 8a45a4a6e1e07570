//! Frame trace capture
//!
//! - `controller`: per-thread buffers and the begin/end frame lifecycle
//! - `request`: trace requests, auto-capture policies, rendering options
//! - `response`: frame snapshots and their API/GPU/linked text forms
//! - `gpu_results`: profiler results gathered per queue during a frame
//! - `consistency`: drawcall mismatch guard

pub mod consistency;
pub mod controller;
pub mod gpu_results;
pub mod request;
pub mod response;

pub use consistency::DrawcallConsistency;
pub use controller::{FrameSummary, FrameTraceController};
pub use gpu_results::GpuResultStore;
pub use request::{AutoCapturePolicy, CaptureAtFrame, TraceConfig, TraceRequest, DEFAULT_SUSPICIOUS_CALL_SECS};
pub use response::{
    linked_text, FrameResponse, FrameTrace, TraceWarning, TracedCall, TracedGpuSample, API_SECTION,
    GPU_SECTION, NO_DATA,
};
