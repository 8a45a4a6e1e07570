use gputrace::capture::{FrameTraceController, TraceConfig, TraceRequest};
use gputrace::domain::ObjectId;
use gputrace::export::ChromeTraceExporter;
use gputrace::functions::FunctionRegistry;
use gputrace::interception::{Callee, InterceptFlags, Interceptor};
use std::sync::Arc;

#[test]
fn test_export_creates_valid_json() {
    // An exporter with no frames still writes a well-formed document
    let exporter = ChromeTraceExporter::new();
    let mut buffer = Vec::new();

    exporter.export(&mut buffer).expect("Failed to export trace");

    // Verify the output is valid JSON
    let json_str = String::from_utf8(buffer).expect("Invalid UTF-8");
    let parsed: serde_json::Value = serde_json::from_str(&json_str).expect("Invalid JSON");

    // Verify it has the expected structure
    assert!(parsed.get("traceEvents").is_some());
    assert!(parsed.get("displayTimeUnit").is_some());
    assert_eq!(parsed["displayTimeUnit"], "ms");
}

#[test]
fn test_export_traced_frame_to_file() {
    let controller = Arc::new(FrameTraceController::new(
        Arc::new(FunctionRegistry::d3d12()),
        Arc::new(InterceptFlags::default()),
        TraceConfig::default(),
    ));
    let interceptor = Interceptor::new(Arc::clone(&controller));
    let present = controller.registry().lookup("IDXGISwapChain_Present").unwrap();

    controller.begin_frame(TraceRequest::api());
    for _ in 0..4 {
        interceptor.dispatch(&Callee::Object(ObjectId(1)), present, "1, 0", || 0);
    }
    let response = controller.end_frame().unwrap().unwrap();

    let mut exporter = ChromeTraceExporter::new();
    exporter.add_frame(&response.trace);
    assert_eq!(exporter.event_count(), 4);

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("trace.json");
    let file = std::fs::File::create(&path).unwrap();
    exporter.export(std::io::BufWriter::new(file)).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let events = parsed["traceEvents"].as_array().unwrap();
    let calls: Vec<_> = events.iter().filter(|e| e["ph"] == "X").collect();
    assert_eq!(calls.len(), 4);
    assert!(calls.iter().all(|e| e["name"] == "IDXGISwapChain_Present" && e["pid"] == 1));
    assert_eq!(events.iter().filter(|e| e["ph"] == "M").count(), 1);
}
