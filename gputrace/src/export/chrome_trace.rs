use crate::capture::FrameTrace;
use crate::domain::ExportError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

/// CPU calls are grouped under this process id, one track per thread.
const CPU_PID: u32 = 1;

/// GPU samples are grouped under this process id, one track per queue.
const GPU_PID: u32 = 2;

/// Chrome Trace Event format
/// Format reference: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChromeTraceEvent {
    /// Function name
    name: String,
    /// "api" or "gpu"
    cat: String,
    /// Phase: "X" = complete, "M" = metadata
    ph: String,
    /// Timestamp in microseconds
    ts: f64,
    /// Duration in microseconds (complete events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    dur: Option<f64>,
    pid: u32,
    tid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

/// Exports traced frames for Perfetto / `chrome://tracing`.
///
/// CPU calls land on one track per thread, GPU samples on one track per
/// queue. Entries whose timing is undefined are skipped.
#[derive(Debug, Default)]
pub struct ChromeTraceExporter {
    events: Vec<ChromeTraceEvent>,
    /// (pid, tid) -> track name
    tracks: BTreeMap<(u32, u64), String>,
}

impl ChromeTraceExporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every call and GPU sample of `trace`.
    pub fn add_frame(&mut self, trace: &FrameTrace) {
        for call in &trace.calls {
            let (Some(start), Some(end)) = (call.start_secs, call.end_secs) else {
                continue;
            };
            let tid = u64::from(call.thread_id.0);
            self.tracks
                .entry((CPU_PID, tid))
                .or_insert_with(|| format!("Thread {}", call.thread_id.0));

            let mut args = HashMap::new();
            args.insert("frame".to_string(), serde_json::json!(trace.frame_index));
            args.insert("arguments".to_string(), serde_json::json!(call.arguments));
            if let Some(sample) = call.sample_id {
                args.insert("sample_id".to_string(), serde_json::json!(sample.0));
            }

            self.events.push(ChromeTraceEvent {
                name: call.function.clone(),
                cat: "api".to_string(),
                ph: "X".to_string(),
                ts: start * 1e6,
                dur: Some((end - start) * 1e6),
                pid: CPU_PID,
                tid,
                args: Some(args),
            });
        }

        for sample in &trace.gpu_samples {
            let (Some(start), Some(end)) = (sample.start_secs, sample.end_secs) else {
                continue;
            };
            let tid = sample.queue_id.0;
            self.tracks
                .entry((GPU_PID, tid))
                .or_insert_with(|| format!("Queue {tid}"));

            let mut args = HashMap::new();
            args.insert("frame".to_string(), serde_json::json!(trace.frame_index));
            args.insert("sample_id".to_string(), serde_json::json!(sample.sample_id.0));
            args.insert("command_list".to_string(), serde_json::json!(sample.command_list.0));
            if let Some(stats) = sample.pipeline_stats {
                args.insert("ia_vertices".to_string(), serde_json::json!(stats.ia_vertices));
                args.insert("ps_invocations".to_string(), serde_json::json!(stats.ps_invocations));
                args.insert("cs_invocations".to_string(), serde_json::json!(stats.cs_invocations));
            }

            self.events.push(ChromeTraceEvent {
                name: sample.function.clone(),
                cat: "gpu".to_string(),
                ph: "X".to_string(),
                ts: start * 1e6,
                dur: Some((end - start) * 1e6),
                pid: GPU_PID,
                tid,
                args: Some(args),
            });
        }
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    ///
    /// # Example
    /// ```
    /// use gputrace::capture::FrameTrace;
    /// use gputrace::export::ChromeTraceExporter;
    ///
    /// # fn example() -> Result<(), gputrace::domain::ExportError> {
    /// let mut exporter = ChromeTraceExporter::new();
    /// exporter.add_frame(&FrameTrace::default());
    ///
    /// let mut buffer = Vec::new();
    /// exporter.export(&mut buffer)?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Json`] if the writer fails mid-document.
    pub fn export<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut all_events = self.events.clone();

        for ((pid, tid), name) in &self.tracks {
            let mut args = HashMap::new();
            args.insert("name".to_string(), serde_json::json!(name));
            all_events.push(ChromeTraceEvent {
                name: "thread_name".to_string(),
                cat: String::new(),
                ph: "M".to_string(),
                ts: 0.0,
                dur: None,
                pid: *pid,
                tid: *tid,
                args: Some(args),
            });
        }

        let trace = ChromeTrace {
            trace_events: all_events,
            display_time_unit: "ms".to_string(),
        };
        serde_json::to_writer_pretty(writer, &trace)?;
        Ok(())
    }

    /// Number of call and sample events collected
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{TracedCall, TracedGpuSample};
    use crate::domain::{CommandListId, FuncId, QueueId, SampleId, ThreadId};

    fn call(thread: u32, start: Option<f64>) -> TracedCall {
        TracedCall {
            thread_id: ThreadId(thread),
            func_id: FuncId(0),
            function: "ID3D12GraphicsCommandList_DrawInstanced".to_string(),
            arguments: "3, 1, 0, 0".to_string(),
            return_value: 0,
            start_secs: start,
            end_secs: start.map(|s| s + 0.001),
            sample_id: Some(SampleId(4)),
            is_draw: true,
        }
    }

    #[test]
    fn test_undefined_timing_is_skipped() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.add_frame(&FrameTrace {
            calls: vec![call(1, Some(0.0)), call(1, None)],
            ..Default::default()
        });
        assert_eq!(exporter.event_count(), 1);
    }

    #[test]
    fn test_cpu_and_gpu_tracks() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.add_frame(&FrameTrace {
            frame_index: 7,
            calls: vec![call(11, Some(0.5)), call(12, Some(0.25))],
            gpu_samples: vec![TracedGpuSample {
                queue_id: QueueId(3),
                command_list: CommandListId(9),
                sample_id: SampleId(4),
                func_id: FuncId(0),
                function: "ID3D12GraphicsCommandList_DrawInstanced".to_string(),
                start_secs: Some(0.0),
                end_secs: Some(0.000_002),
                duration_us: Some(2.0),
                pipeline_stats: None,
            }],
            warnings: Vec::new(),
        });

        let mut buffer = Vec::new();
        exporter.export(&mut buffer).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        let events = parsed["traceEvents"].as_array().unwrap();

        // 3 complete events + 3 track names
        assert_eq!(events.len(), 6);
        let gpu = events.iter().find(|e| e["cat"] == "gpu").unwrap();
        assert_eq!(gpu["pid"], 2);
        assert_eq!(gpu["tid"], 3);
        assert_eq!(gpu["args"]["frame"], 7);
        let first = &events[0];
        assert_eq!(first["ph"], "X");
        assert!((first["ts"].as_f64().unwrap() - 500_000.0).abs() < 1e-6);
        assert!(events.iter().any(|e| e["args"]["name"] == "Queue 3"));
    }
}
