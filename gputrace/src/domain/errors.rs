//! Structured error types for gputrace
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::CommandListId;
use thiserror::Error;

/// Failures reported by a GPU device backend.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Failed to allocate {what}: {reason}")]
    AllocationFailed { what: &'static str, reason: String },

    #[error("Unknown or already released handle {0}")]
    InvalidHandle(u64),

    #[error("Failed to map readback buffer {0}")]
    MapFailed(u64),

    #[error("Command queue is no longer accepting work")]
    QueueClosed,
}

/// Result code surfaced to clients of the command list profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilerResultCode {
    Success,
    Fail,
    NotMeasured,
    MeasurementNotStarted,
}

impl ProfilerResultCode {
    /// Message shown to a client for this code.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fail => "failure",
            Self::NotMeasured => "this command list was not measured",
            Self::MeasurementNotStarted => "measurement was never started",
        }
    }
}

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Invalid profiler configuration: {0}")]
    InvalidConfig(String),

    #[error("Command list {0} was not measured")]
    NotMeasured(CommandListId),

    #[error("Command list {0} has no measurement in progress")]
    MeasurementNotStarted(CommandListId),

    #[error("Command list {0} already has a measurement in progress")]
    MeasurementAlreadyStarted(CommandListId),

    #[error("Timed out after {waited_ms}ms waiting for fence value {value}")]
    FenceTimeout { value: u64, waited_ms: u128 },

    #[error("Readback for {list} holds {actual} bytes, expected at least {expected}")]
    ReadbackTruncated {
        list: CommandListId,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to release {failed} of {total} GPU resources")]
    ResourceLeak { failed: usize, total: usize },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl ProfilerError {
    /// Client-facing result code for this error.
    #[must_use]
    pub fn code(&self) -> ProfilerResultCode {
        match self {
            Self::NotMeasured(_) => ProfilerResultCode::NotMeasured,
            Self::MeasurementNotStarted(_) => ProfilerResultCode::MeasurementNotStarted,
            _ => ProfilerResultCode::Fail,
        }
    }
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Inconsistent drawcalls detected in frame {frame}")]
    InconsistentDrawcalls { frame: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write trace file: {0}")]
    WriteFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiler_error_display() {
        let err = ProfilerError::NotMeasured(CommandListId(12));
        assert_eq!(err.to_string(), "Command list CL:12 was not measured");
    }

    #[test]
    fn test_profiler_error_codes() {
        assert_eq!(
            ProfilerError::NotMeasured(CommandListId(1)).code(),
            ProfilerResultCode::NotMeasured
        );
        assert_eq!(
            ProfilerError::MeasurementNotStarted(CommandListId(1)).code(),
            ProfilerResultCode::MeasurementNotStarted
        );
        assert_eq!(
            ProfilerError::Device(DeviceError::QueueClosed).code(),
            ProfilerResultCode::Fail
        );
        assert_eq!(
            ProfilerResultCode::NotMeasured.message(),
            "this command list was not measured"
        );
    }

    #[test]
    fn test_allocation_error() {
        let err = DeviceError::AllocationFailed {
            what: "query heap",
            reason: "out of memory".to_string(),
        };
        assert!(err.to_string().contains("query heap"));
        assert!(err.to_string().contains("out of memory"));
    }
}
