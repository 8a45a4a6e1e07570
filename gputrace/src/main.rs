//! # gputrace - Main Entry Point
//!
//! Renders frames of a simulated multi-threaded D3D12-style renderer on the
//! software GPU backend. Every API call goes through the [`Interceptor`];
//! the frame chosen with `--trace-frame` is auto-captured and written as a
//! linked API/GPU trace, optionally also as Chrome trace JSON.

// Sample workload sizes are small counts converted to tick/vertex totals
#![allow(clippy::cast_possible_truncation, clippy::cast_lossless)]

use anyhow::{Context, Result};
use clap::Parser;
use gputrace::analysis::HotspotStats;
use gputrace::capture::{CaptureAtFrame, FrameResponse, FrameTraceController, TraceConfig, TraceRequest};
use gputrace::cli::Args;
use gputrace::domain::{CommandListId, FuncId, ObjectId};
use gputrace::export::ChromeTraceExporter;
use gputrace::functions::FunctionRegistry;
use gputrace::interception::{Callee, InterceptFlags, Interceptor};
use gputrace::profiling::{CommandListProfiler, CommandRecorder};
use gputrace::sim::{SimCommandList, SimDevice, SimQueue};
use gputrace_common::FUNCTION_RETURNS_VOID;
use log::{info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

const S_OK: i64 = 0;
const E_FAIL: i64 = -2_147_467_259;

/// Timestamp frequency of the simulated direct queue (ticks per second).
const GPU_FREQUENCY: u64 = 10_000_000;

/// Pause between frames so Ctrl+C is picked up promptly.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Handle the swap chain is reported under.
const SWAP_CHAIN: ObjectId = ObjectId(0x5c_4a17);

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("must be at least") || msg.contains("invalid configuration") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Function ids the renderer calls.
#[derive(Clone, Copy)]
struct RenderFunctions {
    reset: FuncId,
    set_pipeline: FuncId,
    draw: FuncId,
    dispatch: FuncId,
    close: FuncId,
    execute: FuncId,
    present: FuncId,
}

impl RenderFunctions {
    fn lookup(registry: &FunctionRegistry) -> Result<Self> {
        let id = |name: &str| {
            registry
                .lookup(name)
                .with_context(|| format!("{name} is missing from the function table"))
        };
        Ok(Self {
            reset: id("ID3D12GraphicsCommandList_Reset")?,
            set_pipeline: id("ID3D12GraphicsCommandList_SetPipelineState")?,
            draw: id("ID3D12GraphicsCommandList_DrawInstanced")?,
            dispatch: id("ID3D12GraphicsCommandList_Dispatch")?,
            close: id("ID3D12GraphicsCommandList_Close")?,
            execute: id("ID3D12CommandQueue_ExecuteCommandLists")?,
            present: id("IDXGISwapChain_Present")?,
        })
    }
}

/// Record one thread's share of a frame into `list`.
fn record_commands(
    interceptor: &Interceptor,
    functions: RenderFunctions,
    list: &SimCommandList,
    thread_index: usize,
    calls: usize,
) {
    let callee = Callee::CommandList(list);
    interceptor.dispatch(&callee, functions.reset, "0x0, 0x0", || {
        list.reset();
        S_OK
    });
    interceptor.dispatch(&callee, functions.set_pipeline, "0x1", || FUNCTION_RETURNS_VOID);
    for i in 0..calls {
        let vertices = 300 * (i as u64 + 1);
        let ticks = 20 + 5 * (i + thread_index) as u64;
        let arguments = format!("{vertices}, 1, 0, 0");
        interceptor.dispatch(&callee, functions.draw, &arguments, || {
            list.draw(vertices, ticks);
            FUNCTION_RETURNS_VOID
        });
    }
    interceptor.dispatch(&callee, functions.dispatch, "8, 8, 1", || {
        list.dispatch(64, 40);
        FUNCTION_RETURNS_VOID
    });
    interceptor.dispatch(&callee, functions.close, "", || S_OK);
}

/// Record every list on its own thread, then submit and present.
fn render_frame(
    interceptor: &Interceptor,
    functions: RenderFunctions,
    lists: &[Arc<SimCommandList>],
    queue: &SimQueue,
    calls: usize,
) {
    std::thread::scope(|scope| {
        for (thread_index, list) in lists.iter().enumerate() {
            scope.spawn(move || record_commands(interceptor, functions, list, thread_index, calls));
        }
    });

    let ids: Vec<CommandListId> = lists.iter().map(|list| list.id()).collect();
    let submission = Callee::Submission {
        queue,
        command_lists: &ids,
    };
    interceptor.dispatch(&submission, functions.execute, &ids.len().to_string(), || {
        match queue.execute(lists) {
            Ok(()) => FUNCTION_RETURNS_VOID,
            Err(e) => {
                warn!("ExecuteCommandLists failed: {e}");
                E_FAIL
            }
        }
    });
    interceptor.dispatch(&Callee::Object(SWAP_CHAIN), functions.present, "1, 0", || S_OK);
}

fn write_outputs(args: &Args, response: &FrameResponse) -> Result<()> {
    let text = response.text();
    match &args.output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write trace to {}", path.display()))?;
            if !args.quiet {
                println!("saved: {}", path.display());
            }
        }
        None => print!("{text}"),
    }

    if let Some(ref export_path) = args.export {
        let mut exporter = ChromeTraceExporter::new();
        exporter.add_frame(&response.trace);
        let file = File::create(export_path).context("Failed to create trace output file")?;
        exporter
            .export(BufWriter::new(file))
            .context("Failed to export trace")?;
        if !args.quiet {
            println!("saved: {} ({} events)", export_path.display(), exporter.event_count());
        }
    }
    Ok(())
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    if args.threads == 0 {
        anyhow::bail!("--threads must be at least 1");
    }

    let quiet = args.quiet;
    if !quiet {
        println!("gputrace v{}", env!("CARGO_PKG_VERSION"));
        println!("threads: {}, draws per thread: {}", args.threads, args.calls);
        println!("capture: frame {}", args.trace_frame);
    }

    // ── GPU side ────────────────────────────────────────────────────────
    let device = SimDevice::new();
    let queue = device.create_queue(GPU_FREQUENCY);
    let profiler = CommandListProfiler::new(device.clone(), args.profiler_config())
        .context("Failed to create GPU profiler")?;

    // ── Tracing side ────────────────────────────────────────────────────
    let registry = Arc::new(FunctionRegistry::d3d12());
    let functions = RenderFunctions::lookup(&registry)?;
    let controller = FrameTraceController::new(
        registry,
        Arc::new(InterceptFlags::default()),
        TraceConfig {
            thread_preamble: true,
            ..Default::default()
        },
    )
    .with_autocapture(Box::new(CaptureAtFrame {
        frame_index: args.trace_frame,
        request: TraceRequest::linked(),
    }));
    let controller = Arc::new(controller);
    let interceptor = Interceptor::new(Arc::clone(&controller)).with_profiler(Arc::new(profiler));

    let lists: Vec<Arc<SimCommandList>> =
        (0..args.threads).map(|_| device.create_command_list()).collect();

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let started = Instant::now();
    let mut hotspots = HotspotStats::new();
    let mut exit_reason = "frame limit reached";

    loop {
        if args.frames > 0 && controller.frame_index() >= args.frames {
            break;
        }

        controller.begin_frame(TraceRequest::NONE);
        render_frame(&interceptor, functions, &lists, &queue, args.calls);
        match controller.end_frame() {
            Ok(Some(response)) => {
                info!("Captured frame {}", response.trace.frame_index);
                hotspots.record_frame(&response.trace);
            }
            Ok(None) => {}
            Err(e) => warn!("Frame {}: {e}", controller.frame_index().saturating_sub(1)),
        }

        tokio::select! {
            () = tokio::time::sleep(FRAME_INTERVAL) => {}
            _ = &mut ctrl_c => {
                exit_reason = "interrupted";
                break;
            }
        }
    }

    match controller.take_autocapture_response() {
        Some(response) => write_outputs(&args, &response)?,
        None => warn!("Frame {} was not rendered, nothing captured", args.trace_frame),
    }

    if !quiet {
        let summary = controller.frame_summary();
        eprintln!(
            "\n{}: {:.1}s, {} frames, captured frame {} API calls ({} draws)",
            exit_reason,
            started.elapsed().as_secs_f64(),
            controller.frame_index(),
            summary.api_calls,
            summary.draw_calls,
        );
        for hotspot in hotspots.to_hotspots().iter().take(5) {
            eprintln!(
                "  {:<48} {:>5.1}%  cpu {:>8.3}ms  gpu {:>9.1}us",
                hotspot.name,
                hotspot.percentage,
                hotspot.total_cpu_secs * 1e3,
                hotspot.total_gpu_us,
            );
        }
    }

    Ok(())
}
