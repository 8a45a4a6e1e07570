//! What a frame should trace, and how.

/// Default end offset, in seconds from frame start, above which a call is
/// flagged as suspicious.
pub const DEFAULT_SUSPICIOUS_CALL_SECS: f64 = 8.0;

/// Traces requested for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceRequest {
    pub api: bool,
    pub gpu: bool,
    /// API and GPU trace delivered together, separated by type markers.
    pub linked: bool,
}

impl TraceRequest {
    pub const NONE: Self = Self {
        api: false,
        gpu: false,
        linked: false,
    };

    #[must_use]
    pub fn api() -> Self {
        Self { api: true, ..Self::NONE }
    }

    #[must_use]
    pub fn gpu() -> Self {
        Self { gpu: true, ..Self::NONE }
    }

    #[must_use]
    pub fn linked() -> Self {
        Self { linked: true, ..Self::NONE }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.api || self.gpu || self.linked)
    }

    /// Whether CPU call records are needed.
    #[must_use]
    pub fn wants_api(&self) -> bool {
        self.api || self.linked
    }

    /// Whether GPU measurements are needed.
    #[must_use]
    pub fn wants_gpu(&self) -> bool {
        self.gpu || self.linked
    }

    /// Union of two requests.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            api: self.api || other.api,
            gpu: self.gpu || other.gpu,
            linked: self.linked || other.linked,
        }
    }
}

/// Decides, frame by frame, whether to capture without a client request.
pub trait AutoCapturePolicy: Send + Sync {
    fn request_for_frame(&self, frame_index: u64) -> Option<TraceRequest>;
}

/// Capture one specific frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureAtFrame {
    pub frame_index: u64,
    pub request: TraceRequest,
}

impl AutoCapturePolicy for CaptureAtFrame {
    fn request_for_frame(&self, frame_index: u64) -> Option<TraceRequest> {
        (frame_index == self.frame_index).then_some(self.request)
    }
}

/// Rendering and buffering options of the frame trace controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceConfig {
    pub suspicious_call_secs: f64,
    /// Prefix each thread's lines with `//ThreadID=` and `//ThreadAPICount=`.
    pub thread_preamble: bool,
    /// Records reserved in a new thread buffer.
    pub reserve_per_thread: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            suspicious_call_secs: DEFAULT_SUSPICIOUS_CALL_SECS,
            thread_preamble: false,
            reserve_per_thread: 256,
        }
    }
}
