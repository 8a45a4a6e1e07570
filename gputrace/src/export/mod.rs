//! Trace export for external viewers

pub mod chrome_trace;

pub use chrome_trace::ChromeTraceExporter;
