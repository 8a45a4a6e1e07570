//! # gputrace - API call tracing and GPU timing correlation
//!
//! gputrace records every intercepted graphics API call of a frame together
//! with its CPU timing, measures the GPU execution time of the calls recorded
//! into command lists, and links the two through per-call sample ids.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Application render threads                    │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ intercepted API calls
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Interceptor (pre_call / post_call)              │
//! │  • CPU timing into the calling thread's ThreadTraceBuffer       │
//! │  • GPU queries injected around profiled command list calls      │
//! │  • results harvested when command lists are submitted           │
//! └───────────┬───────────────────────────────────┬─────────────────┘
//!             │                                   │
//!             ▼                                   ▼
//! ┌──────────────────────┐             ┌──────────────────────────┐
//! │ FrameTraceController │◀─ results ──│   CommandListProfiler    │
//! │  per-thread buffers  │             │  measurement groups,     │
//! │  frame lifecycle     │             │  fences, clock rebasing  │
//! └──────────┬───────────┘             └────────────┬─────────────┘
//!            │                                      │ device traits
//!            ▼                                      ▼
//! ┌──────────────────────┐             ┌──────────────────────────┐
//! │ API / GPU / linked   │             │  sim: software device,   │
//! │ text, Chrome export, │             │  queue thread and fences │
//! │ hotspot analysis     │             └──────────────────────────┘
//! └──────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`interception`]: the hook boundary and the trace/profile switches
//! - [`capture`]: frame lifecycle, trace requests and responses
//! - [`trace_data`]: call records and per-thread buffers
//! - [`profiling`]: command list profiler and the device traits it drives
//! - [`sim`]: software implementation of the device traits
//! - [`functions`]: the intercepted function table
//! - [`timing`]: host clock and tick conversion
//! - [`export`]: Chrome Trace Event Format output
//! - [`analysis`]: per-function hotspots
//! - [`cli`]: arguments of the demo binary
//! - [`domain`]: ids and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Capture frame 5 of a 10-frame run and save the linked trace
//! gputrace --frames 10 --trace-frame 5 --output frame5.txt
//!
//! # Include pipeline statistics and open the result in Perfetto
//! gputrace --measure all --export trace.json
//! ```

pub mod analysis;
pub mod capture;
pub mod cli;
pub mod domain;
pub mod export;
pub mod functions;
pub mod interception;
pub mod profiling;
pub mod sim;
pub mod timing;
pub mod trace_data;
