//! Boundary between the API hooks and the tracing core.
//!
//! The hooking layer calls [`Interceptor::pre_call`] just before forwarding an
//! API call and [`Interceptor::post_call`] right after it returns, both on the
//! calling thread. In between, the interceptor:
//!
//! - records CPU timing into the thread's buffer while `collect_trace` is on
//! - brackets profiled command list calls with GPU queries while
//!   `profile_gpu` is on
//! - harvests GPU results for every command list handed to a queue by a
//!   work-submitting call
//!
//! [`InterceptFlags`] are plain atomics so the hot path never takes a lock to
//! find out that nothing is being traced.

use crate::capture::FrameTraceController;
use crate::domain::{CommandListId, FuncId, ObjectId, ProfilerError, SampleId, ThreadId};
use crate::profiling::{CommandListProfiler, CommandQueue, CommandRecorder, MeasurementId};
use crate::trace_data::{CallRecord, PendingCall};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Switches polled on every intercepted call.
#[derive(Debug, Default)]
pub struct InterceptFlags {
    collect_trace: AtomicBool,
    profile_gpu: AtomicBool,
}

impl InterceptFlags {
    #[must_use]
    pub fn should_collect_trace(&self) -> bool {
        self.collect_trace.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn should_collect_gpu_time(&self) -> bool {
        self.profile_gpu.load(Ordering::Acquire) && self.should_collect_trace()
    }

    pub fn set_collect_trace(&self, on: bool) {
        self.collect_trace.store(on, Ordering::Release);
    }

    pub fn set_profile_gpu(&self, on: bool) {
        self.profile_gpu.store(on, Ordering::Release);
    }
}

/// Process-unique, monotonically increasing sample ids.
#[derive(Debug)]
pub struct SampleIdGenerator {
    next: AtomicU64,
}

impl SampleIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> SampleId {
        SampleId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SampleIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// The object an intercepted call was made on.
#[derive(Clone, Copy)]
pub enum Callee<'a> {
    /// Any object without GPU-side behavior (device, resource, swap chain).
    Object(ObjectId),
    /// A command list that queries can be injected into.
    CommandList(&'a dyn CommandRecorder),
    /// A queue receiving the listed command lists.
    Submission {
        queue: &'a dyn CommandQueue,
        command_lists: &'a [CommandListId],
    },
}

impl Callee<'_> {
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        match self {
            Self::Object(id) => *id,
            Self::CommandList(list) => ObjectId(list.id().0),
            Self::Submission { queue, .. } => ObjectId(queue.id().0),
        }
    }
}

/// Tracing context shared by every intercepted thread.
pub struct Interceptor {
    controller: Arc<FrameTraceController>,
    profiler: Option<Arc<CommandListProfiler>>,
    sample_ids: SampleIdGenerator,
}

impl Interceptor {
    /// Interceptor without GPU profiling.
    #[must_use]
    pub fn new(controller: Arc<FrameTraceController>) -> Self {
        Self {
            controller,
            profiler: None,
            sample_ids: SampleIdGenerator::new(),
        }
    }

    #[must_use]
    pub fn with_profiler(mut self, profiler: Arc<CommandListProfiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    #[must_use]
    pub fn controller(&self) -> &Arc<FrameTraceController> {
        &self.controller
    }

    #[must_use]
    pub fn profiler(&self) -> Option<&Arc<CommandListProfiler>> {
        self.profiler.as_ref()
    }

    /// Called before `func` is forwarded to the real API.
    pub fn pre_call(&self, callee: &Callee<'_>, func: FuncId) {
        if !self.controller.flags().should_collect_trace() {
            return;
        }
        let buffer = self.controller.find_or_create_buffer(ThreadId::current());
        let start = self.controller.clock().now();
        let measurement = self.begin_gpu_measurement(callee, func);
        buffer.begin_call(PendingCall {
            func_id: func,
            callee: callee.object_id(),
            start,
            sample_id: measurement.map(|(sample_id, _)| sample_id),
            gpu_list: measurement.map(|(_, list)| list),
        });
    }

    /// Called after `func` returned `return_value` from the real API.
    pub fn post_call(&self, callee: &Callee<'_>, func: FuncId, arguments: &str, return_value: i64) {
        let end = self.controller.clock().now();
        let thread = ThreadId::current();

        if let Some(buffer) = self.controller.buffer(thread) {
            if let Some(call) = buffer.take_pending_for(func, callee.object_id()) {
                if let Some(list) = call.gpu_list {
                    self.end_gpu_measurement(callee, list);
                }
                if self.controller.flags().should_collect_trace() {
                    buffer.add_entry(CallRecord::new(
                        call,
                        thread,
                        end,
                        arguments.to_string(),
                        return_value,
                    ));
                }
            }
        }

        if let Callee::Submission {
            queue,
            command_lists,
        } = callee
        {
            if self.controller.registry().submits_work(func) {
                self.gather_results(*queue, command_lists);
            }
        }
    }

    /// Forward one call through the interceptor.
    pub fn dispatch(
        &self,
        callee: &Callee<'_>,
        func: FuncId,
        arguments: &str,
        call: impl FnOnce() -> i64,
    ) -> i64 {
        self.pre_call(callee, func);
        let return_value = call();
        self.post_call(callee, func, arguments, return_value);
        return_value
    }

    fn begin_gpu_measurement(
        &self,
        callee: &Callee<'_>,
        func: FuncId,
    ) -> Option<(SampleId, CommandListId)> {
        let profiler = self.profiler.as_ref()?;
        let Callee::CommandList(list) = callee else {
            return None;
        };
        if !self.controller.flags().should_collect_gpu_time()
            || !self.controller.registry().should_profile(func)
        {
            return None;
        }
        let sample_id = self.sample_ids.next_id();
        let id = MeasurementId {
            sample_id,
            func_id: func,
            frame_index: self.controller.frame_index(),
        };
        match profiler.begin_cmd_measurement(*list, &id) {
            Ok(()) => Some((sample_id, list.id())),
            Err(e) => {
                debug!("No GPU measurement for sample {sample_id}: {e}");
                None
            }
        }
    }

    fn end_gpu_measurement(&self, callee: &Callee<'_>, measured: CommandListId) {
        let Some(profiler) = &self.profiler else {
            return;
        };
        match callee {
            Callee::CommandList(list) if list.id() == measured => {
                if let Err(e) = profiler.end_cmd_measurement(*list) {
                    warn!("Failed to close GPU measurement on {measured}: {e}");
                }
            }
            _ => warn!("{measured}: call returned on another object, GPU measurement left open"),
        }
    }

    /// Harvest every measured command list of a submission.
    fn gather_results(&self, queue: &dyn CommandQueue, command_lists: &[CommandListId]) {
        let Some(profiler) = &self.profiler else {
            return;
        };
        for &list in command_lists {
            if !profiler.is_measured(list) {
                continue;
            }
            let harvested = profiler
                .get_cmd_list_results(list, queue)
                .and_then(|results| Ok((profiler.queue_frequency(queue)?, results)));
            match harvested {
                Ok((frequency, results)) => {
                    debug!("{list}: {} GPU results on {}", results.len(), queue.id());
                    self.controller
                        .store_profiler_results(queue.id(), frequency, results);
                }
                Err(ProfilerError::NotMeasured(_)) => {}
                Err(e) => warn!("Failed to gather GPU results for {list}: {e}"),
            }
        }
    }
}
