use gputrace::capture::{FrameTraceController, TraceConfig, TraceRequest, NO_DATA};
use gputrace::domain::{FuncId, ObjectId, ThreadId};
use gputrace::functions::FunctionRegistry;
use gputrace::interception::{Callee, InterceptFlags, Interceptor};
use gputrace_common::FUNCTION_RETURNS_VOID;
use std::sync::Arc;

fn interceptor() -> Interceptor {
    let controller = FrameTraceController::new(
        Arc::new(FunctionRegistry::d3d12()),
        Arc::new(InterceptFlags::default()),
        TraceConfig::default(),
    );
    Interceptor::new(Arc::new(controller))
}

fn present(interceptor: &Interceptor) -> FuncId {
    interceptor
        .controller()
        .registry()
        .lookup("IDXGISwapChain_Present")
        .expect("Present is in the D3D12 table")
}

fn make_calls(interceptor: &Interceptor, func: FuncId, count: usize) {
    for i in 0..count {
        interceptor.dispatch(&Callee::Object(ObjectId(0x10)), func, &i.to_string(), || {
            FUNCTION_RETURNS_VOID
        });
    }
}

#[test]
fn test_two_busy_threads_and_one_idle() {
    let interceptor = interceptor();
    let func = present(&interceptor);
    let controller = Arc::clone(interceptor.controller());
    controller.begin_frame(TraceRequest::api());

    std::thread::scope(|scope| {
        scope.spawn(|| make_calls(&interceptor, func, 50));
        scope.spawn(|| make_calls(&interceptor, func, 50));
        scope.spawn(|| {});
    });

    assert_eq!(controller.thread_count(), 2);
    assert_eq!(controller.num_traced_api_calls(), 100);

    let response = controller.end_frame().unwrap().unwrap();
    assert_eq!(response.trace.calls.len(), 100);
    assert_eq!(response.api_text.unwrap().lines().count(), 100);
}

#[test]
fn test_calls_from_many_threads_are_ordered_and_well_formed() {
    const THREADS: usize = 6;
    const CALLS: usize = 40;

    let interceptor = interceptor();
    let func = present(&interceptor);
    let controller = Arc::clone(interceptor.controller());
    controller.begin_frame(TraceRequest::api());

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| make_calls(&interceptor, func, CALLS));
        }
    });

    let response = controller.end_frame().unwrap().unwrap();
    let calls = &response.trace.calls;
    assert_eq!(calls.len(), THREADS * CALLS);

    // Sorted by thread, each thread's calls in the order they were made
    for pair in calls.windows(2) {
        assert!(pair[0].thread_id <= pair[1].thread_id);
        if pair[0].thread_id == pair[1].thread_id {
            let a: usize = pair[0].arguments.parse().unwrap();
            let b: usize = pair[1].arguments.parse().unwrap();
            assert_eq!(a + 1, b);
        }
    }
    for call in calls {
        assert!(call.end_secs.unwrap() >= call.start_secs.unwrap());
        assert_ne!(call.thread_id, ThreadId::current());
    }
}

#[test]
fn test_nothing_recorded_outside_a_traced_frame() {
    let interceptor = interceptor();
    let func = present(&interceptor);
    let controller = Arc::clone(interceptor.controller());

    controller.begin_frame(TraceRequest::NONE);
    make_calls(&interceptor, func, 10);
    assert_eq!(controller.end_frame().unwrap(), None);
    assert_eq!(controller.num_traced_api_calls(), 0);
}

#[test]
fn test_clear_then_serialize_is_nodata() {
    let interceptor = interceptor();
    let func = present(&interceptor);
    let controller = Arc::clone(interceptor.controller());

    controller.begin_frame(TraceRequest::api());
    make_calls(&interceptor, func, 3);
    assert_eq!(controller.api_trace_text().unwrap().lines().count(), 3);

    controller.clear();
    assert_eq!(controller.api_trace_text().unwrap(), NO_DATA);
    assert_eq!(controller.gpu_trace_text().unwrap(), NO_DATA);
}

#[test]
fn test_each_frame_starts_empty() {
    let interceptor = interceptor();
    let func = present(&interceptor);
    let controller = Arc::clone(interceptor.controller());

    controller.begin_frame(TraceRequest::api());
    make_calls(&interceptor, func, 5);
    let first = controller.end_frame().unwrap().unwrap();

    controller.begin_frame(TraceRequest::api());
    make_calls(&interceptor, func, 2);
    let second = controller.end_frame().unwrap().unwrap();

    assert_eq!(first.trace.calls.len(), 5);
    assert_eq!(second.trace.calls.len(), 2);
    assert_eq!(second.trace.frame_index, first.trace.frame_index + 1);
}
