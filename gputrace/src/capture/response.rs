//! Frame trace snapshots and their text rendering.
//!
//! # Line formats
//!
//! ```text
//! API:  <start_s> <end_s> <thread_id> <sample_id|-> <Function>(<args>) = <ret>
//! GPU:  <start_s> <end_s> <queue_id> <sample_id> <Function> <duration_us>
//! ```
//!
//! Offsets are seconds with nanosecond precision. A value that cannot be
//! converted (unknown clock frequency) is written as `undefined`. An empty
//! trace is the single token `NODATA`.

use super::request::TraceRequest;
use crate::domain::{CommandListId, FuncId, QueueId, SampleId, ThreadId};
use gputrace_common::{PipelineStatistics, FUNCTION_RETURNS_VOID};
use std::borrow::Cow;
use std::fmt::{self, Write as _};

/// Body of a trace with no entries.
pub const NO_DATA: &str = "NODATA";

/// Section marker preceding the API trace in a linked response.
pub const API_SECTION: &str = "//Type:API";

/// Section marker preceding the GPU trace in a linked response.
pub const GPU_SECTION: &str = "//Type:GPU";

const UNDEFINED: &str = "undefined";

/// A timing value that should not be taken at face value.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceWarning {
    /// The call ended implausibly long after the frame started.
    SuspiciousDuration {
        thread_id: ThreadId,
        function: String,
        end_secs: f64,
    },
    /// The call's timestamps could not be converted to seconds.
    UndefinedDuration { thread_id: ThreadId, function: String },
    /// The GPU sample's clock values could not be converted to seconds.
    UndefinedGpuDuration { queue_id: QueueId, sample_id: SampleId },
}

impl fmt::Display for TraceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SuspiciousDuration {
                thread_id,
                function,
                end_secs,
            } => write!(f, "{thread_id}: {function} ends {end_secs:.3}s after frame start"),
            Self::UndefinedDuration { thread_id, function } => {
                write!(f, "{thread_id}: {function} has undefined timing (no clock frequency)")
            }
            Self::UndefinedGpuDuration { queue_id, sample_id } => {
                write!(f, "{queue_id}: sample {sample_id} has undefined GPU timing (no queue frequency)")
            }
        }
    }
}

/// One CPU call, converted to frame-relative seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedCall {
    pub thread_id: ThreadId,
    pub func_id: FuncId,
    pub function: String,
    pub arguments: String,
    pub return_value: i64,
    pub start_secs: Option<f64>,
    pub end_secs: Option<f64>,
    pub sample_id: Option<SampleId>,
    pub is_draw: bool,
}

/// One GPU measurement, converted to seconds from its batch's base clock.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedGpuSample {
    pub queue_id: QueueId,
    pub command_list: CommandListId,
    pub sample_id: SampleId,
    pub func_id: FuncId,
    pub function: String,
    pub start_secs: Option<f64>,
    pub end_secs: Option<f64>,
    pub duration_us: Option<f64>,
    pub pipeline_stats: Option<PipelineStatistics>,
}

/// Everything captured for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameTrace {
    pub frame_index: u64,
    /// Ordered by thread id, then by the order calls returned.
    pub calls: Vec<TracedCall>,
    /// Ordered by queue id, then submission order.
    pub gpu_samples: Vec<TracedGpuSample>,
    pub warnings: Vec<TraceWarning>,
}

impl FrameTrace {
    #[must_use]
    pub fn draw_call_count(&self) -> usize {
        self.calls.iter().filter(|c| c.is_draw).count()
    }

    /// API trace text, optionally with a per-thread preamble.
    #[must_use]
    pub fn api_text(&self, thread_preamble: bool) -> String {
        if self.calls.is_empty() {
            return NO_DATA.to_string();
        }
        let mut out = String::new();
        let mut current_thread = None;
        for (i, call) in self.calls.iter().enumerate() {
            if thread_preamble && current_thread != Some(call.thread_id) {
                current_thread = Some(call.thread_id);
                let count = self.calls[i..]
                    .iter()
                    .take_while(|c| c.thread_id == call.thread_id)
                    .count();
                let _ = writeln!(out, "//ThreadID={}", call.thread_id.0);
                let _ = writeln!(out, "//ThreadAPICount={count}");
            }
            let sample = call
                .sample_id
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            let _ = writeln!(
                out,
                "{} {} {} {} {}({}) = {}",
                seconds(call.start_secs),
                seconds(call.end_secs),
                call.thread_id.0,
                sample,
                call.function,
                single_line(&call.arguments),
                return_value(call.return_value),
            );
        }
        out
    }

    /// GPU trace text.
    #[must_use]
    pub fn gpu_text(&self) -> String {
        if self.gpu_samples.is_empty() {
            return NO_DATA.to_string();
        }
        let mut out = String::new();
        for sample in &self.gpu_samples {
            let duration = sample
                .duration_us
                .map_or_else(|| UNDEFINED.to_string(), |us| format!("{us:.3}"));
            let _ = writeln!(
                out,
                "{} {} {} {} {} {}",
                seconds(sample.start_secs),
                seconds(sample.end_secs),
                sample.queue_id.0,
                sample.sample_id,
                sample.function,
                duration,
            );
        }
        out
    }
}

fn seconds(value: Option<f64>) -> String {
    value.map_or_else(|| UNDEFINED.to_string(), |secs| format!("{secs:.9}"))
}

/// Keep one call per line: line breaks inside arguments are escaped.
fn single_line(text: &str) -> Cow<'_, str> {
    if text.contains(['\n', '\r']) {
        Cow::Owned(text.replace('\r', "\\r").replace('\n', "\\n"))
    } else {
        Cow::Borrowed(text)
    }
}

fn return_value(value: i64) -> String {
    if value == FUNCTION_RETURNS_VOID {
        "void".to_string()
    } else {
        value.to_string()
    }
}

/// Join API and GPU trace text into a linked response.
#[must_use]
pub fn linked_text(api: &str, gpu: &str) -> String {
    let mut out = String::with_capacity(api.len() + gpu.len() + 32);
    for (marker, body) in [(API_SECTION, api), (GPU_SECTION, gpu)] {
        out.push_str(marker);
        out.push('\n');
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Result of a traced frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResponse {
    pub request: TraceRequest,
    pub trace: FrameTrace,
    pub api_text: Option<String>,
    pub gpu_text: Option<String>,
    /// Produced by the auto-capture policy rather than a client request.
    pub autocaptured: bool,
}

impl FrameResponse {
    /// Linked text if both traces were produced.
    #[must_use]
    pub fn linked_text(&self) -> Option<String> {
        match (&self.api_text, &self.gpu_text) {
            (Some(api), Some(gpu)) => Some(linked_text(api, gpu)),
            _ => None,
        }
    }

    /// The text a client receives for the request: the linked form when it
    /// asked for a linked trace, otherwise whichever traces it asked for.
    #[must_use]
    pub fn text(&self) -> String {
        if self.request.linked {
            if let Some(linked) = self.linked_text() {
                return linked;
            }
        }
        [&self.api_text, &self.gpu_text]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }
}
