//! Frame-scoped trace collection.
//!
//! # Frame lifecycle
//!
//! ```text
//! begin_frame(request)                            end_frame()
//!   │ request ∪ auto-capture policy                 │ flags off
//!   │ clear buffers and GPU results                 │ merge CPU records (thread-id order)
//!   │ flags on ──▶ threads record calls ──────────▶ │ + stored GPU results
//!   ▼                                               ▼
//!                                             FrameResponse
//! ```
//!
//! Worker threads only ever touch their own [`ThreadTraceBuffer`]. The thread
//! map is read-locked for lookups; the write lock is taken only when a thread
//! makes its first traced call.

#![allow(clippy::cast_precision_loss)]

use super::consistency::DrawcallConsistency;
use super::gpu_results::GpuResultStore;
use super::request::{AutoCapturePolicy, TraceConfig, TraceRequest};
use super::response::{FrameResponse, FrameTrace, TraceWarning, TracedCall, TracedGpuSample};
use crate::domain::{QueueId, SampleId, ThreadId, Timestamp, TraceError};
use crate::functions::FunctionRegistry;
use crate::interception::InterceptFlags;
use crate::profiling::ProfilerResult;
use crate::timing::{ticks_to_seconds, HostClock};
use crate::trace_data::{CallRecord, ThreadTraceBuffer};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Counters of the most recent frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSummary {
    /// Seconds since the controller was created.
    pub total_elapsed_secs: Option<f64>,
    /// CPU time between the last `begin_frame` and `end_frame`.
    pub last_frame_secs: Option<f64>,
    pub api_calls: usize,
    pub draw_calls: usize,
}

#[derive(Debug, Clone, Copy)]
struct ActiveTrace {
    request: TraceRequest,
    autocaptured: bool,
}

#[derive(Debug, Default)]
struct FrameState {
    index: u64,
    start: Timestamp,
    active: Option<ActiveTrace>,
    last_frame_secs: Option<f64>,
}

/// Collects CPU call records from every thread and GPU results from the
/// profiler, and turns them into one trace per requested frame.
pub struct FrameTraceController {
    registry: Arc<FunctionRegistry>,
    flags: Arc<InterceptFlags>,
    clock: HostClock,
    config: TraceConfig,
    threads: RwLock<BTreeMap<ThreadId, Arc<ThreadTraceBuffer>>>,
    gpu_results: Mutex<GpuResultStore>,
    frame: Mutex<FrameState>,
    consistency: DrawcallConsistency,
    autocapture: Option<Box<dyn AutoCapturePolicy>>,
    cached_response: Mutex<Option<FrameResponse>>,
}

impl FrameTraceController {
    #[must_use]
    pub fn new(registry: Arc<FunctionRegistry>, flags: Arc<InterceptFlags>, config: TraceConfig) -> Self {
        Self::with_clock(registry, flags, config, HostClock::new())
    }

    #[must_use]
    pub fn with_clock(
        registry: Arc<FunctionRegistry>,
        flags: Arc<InterceptFlags>,
        config: TraceConfig,
        clock: HostClock,
    ) -> Self {
        Self {
            registry,
            flags,
            clock,
            config,
            threads: RwLock::new(BTreeMap::new()),
            gpu_results: Mutex::new(GpuResultStore::new()),
            frame: Mutex::new(FrameState::default()),
            consistency: DrawcallConsistency::new(),
            autocapture: None,
            cached_response: Mutex::new(None),
        }
    }

    /// Capture frames chosen by `policy` in addition to explicit requests.
    #[must_use]
    pub fn with_autocapture(mut self, policy: Box<dyn AutoCapturePolicy>) -> Self {
        self.autocapture = Some(policy);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn flags(&self) -> &Arc<InterceptFlags> {
        &self.flags
    }

    #[must_use]
    pub fn clock(&self) -> &HostClock {
        &self.clock
    }

    #[must_use]
    pub fn consistency(&self) -> &DrawcallConsistency {
        &self.consistency
    }

    /// Index of the frame currently being rendered.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame.lock().index
    }

    // =========================================================================
    // THREAD BUFFERS
    // =========================================================================

    /// Buffer of `thread`, created on its first traced call.
    pub fn find_or_create_buffer(&self, thread: ThreadId) -> Arc<ThreadTraceBuffer> {
        if let Some(buffer) = self.threads.read().get(&thread) {
            return Arc::clone(buffer);
        }
        let mut threads = self.threads.write();
        Arc::clone(threads.entry(thread).or_insert_with(|| {
            debug!("New trace buffer for {thread}");
            Arc::new(ThreadTraceBuffer::with_capacity(
                thread,
                self.config.reserve_per_thread,
            ))
        }))
    }

    /// Buffer of `thread`, if it has one.
    #[must_use]
    pub fn buffer(&self, thread: ThreadId) -> Option<Arc<ThreadTraceBuffer>> {
        self.threads.read().get(&thread).cloned()
    }

    /// Threads that made a traced call since the last clear.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.read().len()
    }

    /// Drop every thread buffer and stored GPU result.
    pub fn clear(&self) {
        self.threads.write().clear();
        self.gpu_results.lock().clear();
    }

    // =========================================================================
    // FRAME LIFECYCLE
    // =========================================================================

    /// Start a frame. Returns whether anything is traced in it.
    pub fn begin_frame(&self, request: TraceRequest) -> bool {
        let mut frame = self.frame.lock();
        self.consistency.reset();

        let auto = self
            .autocapture
            .as_ref()
            .and_then(|policy| policy.request_for_frame(frame.index));
        let merged = auto.map_or(request, |auto| request.merge(auto));

        frame.start = self.clock.now();
        if merged.is_empty() {
            frame.active = None;
            return false;
        }

        self.clear();
        frame.active = Some(ActiveTrace {
            request: merged,
            autocaptured: request.is_empty() && auto.is_some(),
        });
        self.flags.set_profile_gpu(merged.wants_gpu());
        self.flags.set_collect_trace(true);
        info!("Frame {}: tracing {merged:?}", frame.index);
        true
    }

    /// Finish the current frame and build its response if one was requested.
    ///
    /// # Errors
    ///
    /// [`TraceError::InconsistentDrawcalls`] if a drawcall mismatch was
    /// reported during the frame.
    pub fn end_frame(&self) -> Result<Option<FrameResponse>, TraceError> {
        self.flags.set_collect_trace(false);
        self.flags.set_profile_gpu(false);

        let (frame_index, active) = {
            let mut frame = self.frame.lock();
            frame.last_frame_secs = self.clock.seconds_between(frame.start, self.clock.now());
            let index = frame.index;
            frame.index += 1;
            (index, frame.active.take())
        };

        self.consistency.check()?;
        let Some(active) = active else {
            return Ok(None);
        };

        let request = active.request;
        let trace = self.snapshot(frame_index, request.wants_api(), request.wants_gpu());
        for warning in &trace.warnings {
            warn!("Frame {frame_index}: {warning}");
        }
        let response = FrameResponse {
            request,
            api_text: request
                .wants_api()
                .then(|| trace.api_text(self.config.thread_preamble)),
            gpu_text: request.wants_gpu().then(|| trace.gpu_text()),
            trace,
            autocaptured: active.autocaptured,
        };

        if response.autocaptured {
            *self.cached_response.lock() = Some(response.clone());
        }
        info!(
            "Frame {frame_index}: {} calls, {} GPU samples",
            response.trace.calls.len(),
            response.trace.gpu_samples.len()
        );
        Ok(Some(response))
    }

    /// Take the response of the last auto-captured frame.
    pub fn take_autocapture_response(&self) -> Option<FrameResponse> {
        self.cached_response.lock().take()
    }

    // =========================================================================
    // GPU RESULTS
    // =========================================================================

    /// Keep profiler results harvested from `queue` for the frame's GPU trace.
    pub fn store_profiler_results(&self, queue: QueueId, frequency: u64, results: Vec<ProfilerResult>) {
        self.gpu_results.lock().store(queue, frequency, results);
    }

    /// Stored GPU result for `sample` on `queue`.
    #[must_use]
    pub fn profiler_result(&self, queue: QueueId, sample: SampleId) -> Option<ProfilerResult> {
        self.gpu_results.lock().get(queue, sample).cloned()
    }

    /// CPU call that was measured under `sample`.
    #[must_use]
    pub fn find_call_by_sample(&self, sample: SampleId) -> Option<CallRecord> {
        self.threads
            .read()
            .values()
            .find_map(|buffer| buffer.find_by_sample(sample))
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// API trace of the recorded calls.
    ///
    /// # Errors
    ///
    /// [`TraceError::InconsistentDrawcalls`] after a drawcall mismatch.
    pub fn api_trace_text(&self) -> Result<String, TraceError> {
        self.consistency.check()?;
        let trace = self.snapshot(self.frame_index(), true, false);
        Ok(trace.api_text(self.config.thread_preamble))
    }

    /// GPU trace of the stored profiler results.
    ///
    /// # Errors
    ///
    /// [`TraceError::InconsistentDrawcalls`] after a drawcall mismatch.
    pub fn gpu_trace_text(&self) -> Result<String, TraceError> {
        self.consistency.check()?;
        Ok(self.snapshot(self.frame_index(), false, true).gpu_text())
    }

    #[must_use]
    pub fn num_traced_api_calls(&self) -> usize {
        self.threads.read().values().map(|b| b.len()).sum()
    }

    #[must_use]
    pub fn num_traced_draw_calls(&self) -> usize {
        self.threads
            .read()
            .values()
            .map(|buffer| {
                buffer.with_records(|records| {
                    records
                        .iter()
                        .filter(|r| self.registry.is_draw(r.func_id()))
                        .count()
                })
            })
            .sum()
    }

    #[must_use]
    pub fn frame_summary(&self) -> FrameSummary {
        FrameSummary {
            total_elapsed_secs: self.clock.seconds_between(Timestamp(0), self.clock.now()),
            last_frame_secs: self.frame.lock().last_frame_secs,
            api_calls: self.num_traced_api_calls(),
            draw_calls: self.num_traced_draw_calls(),
        }
    }

    // =========================================================================
    // SNAPSHOT
    // =========================================================================

    fn snapshot(&self, frame_index: u64, cpu: bool, gpu: bool) -> FrameTrace {
        let mut trace = FrameTrace {
            frame_index,
            ..Default::default()
        };
        if cpu {
            let frame_start = self.frame.lock().start;
            for buffer in self.threads.read().values() {
                buffer.with_records(|records| {
                    for record in records {
                        let call = self.convert_call(record, frame_start, &mut trace.warnings);
                        trace.calls.push(call);
                    }
                });
            }
        }
        if gpu {
            for (queue_id, frequency, result) in self.gpu_results.lock().iter() {
                trace
                    .gpu_samples
                    .push(self.convert_gpu_sample(queue_id, frequency, result, &mut trace.warnings));
            }
        }
        trace
    }

    fn convert_call(
        &self,
        record: &CallRecord,
        frame_start: Timestamp,
        warnings: &mut Vec<TraceWarning>,
    ) -> TracedCall {
        let function = self.registry.name(record.func_id()).to_string();
        let start_secs = self.clock.seconds_between(frame_start, record.start());
        let end_secs = self.clock.seconds_between(frame_start, record.end());
        match end_secs {
            None => warnings.push(TraceWarning::UndefinedDuration {
                thread_id: record.thread_id(),
                function: function.clone(),
            }),
            Some(end) if end > self.config.suspicious_call_secs => {
                warnings.push(TraceWarning::SuspiciousDuration {
                    thread_id: record.thread_id(),
                    function: function.clone(),
                    end_secs: end,
                });
            }
            Some(_) => {}
        }
        TracedCall {
            thread_id: record.thread_id(),
            func_id: record.func_id(),
            function,
            arguments: record.arguments().to_string(),
            return_value: record.return_value(),
            start_secs,
            end_secs,
            sample_id: record.sample_id(),
            is_draw: self.registry.is_draw(record.func_id()),
        }
    }

    fn convert_gpu_sample(
        &self,
        queue_id: QueueId,
        frequency: u64,
        result: &ProfilerResult,
        warnings: &mut Vec<TraceWarning>,
    ) -> TracedGpuSample {
        let info = &result.info;
        let (start_secs, end_secs) = result.timestamps.map_or((None, None), |ts| {
            (
                ticks_to_seconds(ts.adjusted.start, frequency),
                ticks_to_seconds(ts.adjusted.end, frequency),
            )
        });
        if result.timestamps.is_some() && frequency == 0 {
            warnings.push(TraceWarning::UndefinedGpuDuration {
                queue_id,
                sample_id: info.sample_id,
            });
        }
        TracedGpuSample {
            queue_id,
            command_list: info.command_list,
            sample_id: info.sample_id,
            func_id: info.func_id,
            function: self.registry.name(info.func_id).to_string(),
            start_secs,
            end_secs,
            duration_us: result.timestamps.and_then(|ts| ts.duration_us),
            pipeline_stats: result.pipeline_stats,
        }
    }
}
