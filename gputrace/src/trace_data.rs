//! Per-thread call records
//!
//! Each thread that makes a traced call owns one [`ThreadTraceBuffer`]. The
//! thread appends to it between frame begin and frame end; the frame
//! controller reads it only after collection has been switched off, so the
//! buffer's internal lock is never contended.

use crate::domain::{CommandListId, FuncId, ObjectId, SampleId, ThreadId, Timestamp};
use crate::timing::{CallTiming, TimingLog};
use log::debug;
use parking_lot::Mutex;

/// One intercepted call
///
/// Sealed when the call returns; fields are read-only from then on.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    thread_id: ThreadId,
    func_id: FuncId,
    callee: ObjectId,
    arguments: String,
    return_value: i64,
    start: Timestamp,
    end: Timestamp,
    sample_id: Option<SampleId>,
}

impl CallRecord {
    #[must_use]
    pub fn new(call: PendingCall, thread_id: ThreadId, end: Timestamp, arguments: String, return_value: i64) -> Self {
        Self {
            thread_id,
            func_id: call.func_id,
            callee: call.callee,
            arguments,
            return_value,
            start: call.start,
            end: end.max(call.start),
            sample_id: call.sample_id,
        }
    }

    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    #[must_use]
    pub fn func_id(&self) -> FuncId {
        self.func_id
    }

    #[must_use]
    pub fn callee(&self) -> ObjectId {
        self.callee
    }

    #[must_use]
    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    #[must_use]
    pub fn return_value(&self) -> i64 {
        self.return_value
    }

    #[must_use]
    pub fn start(&self) -> Timestamp {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// GPU sample this call was measured under, if any.
    #[must_use]
    pub fn sample_id(&self) -> Option<SampleId> {
        self.sample_id
    }
}

/// A call that has entered but not yet returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCall {
    pub func_id: FuncId,
    pub callee: ObjectId,
    pub start: Timestamp,
    pub sample_id: Option<SampleId>,
    /// Command list holding the call's open GPU measurement.
    pub gpu_list: Option<CommandListId>,
}

#[derive(Debug, Default)]
struct BufferState {
    records: Vec<CallRecord>,
    timings: TimingLog,
    // Stack so that calls made from inside another intercepted call nest.
    pending: Vec<PendingCall>,
}

/// Call records of a single thread, in the order the calls returned.
#[derive(Debug)]
pub struct ThreadTraceBuffer {
    thread_id: ThreadId,
    state: Mutex<BufferState>,
}

impl ThreadTraceBuffer {
    #[must_use]
    pub fn new(thread_id: ThreadId) -> Self {
        Self::with_capacity(thread_id, 0)
    }

    /// Buffer with room for `capacity` records before reallocating.
    #[must_use]
    pub fn with_capacity(thread_id: ThreadId, capacity: usize) -> Self {
        Self {
            thread_id,
            state: Mutex::new(BufferState {
                records: Vec::with_capacity(capacity),
                timings: TimingLog::with_capacity(capacity),
                pending: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Note that a call has entered.
    pub fn begin_call(&self, call: PendingCall) {
        self.state.lock().pending.push(call);
    }

    /// Take the innermost call that has entered but not returned.
    pub fn take_pending(&self) -> Option<PendingCall> {
        self.state.lock().pending.pop()
    }

    /// Take the innermost pending call of `func` on `callee`.
    ///
    /// Calls that entered while collection was off have no pending entry, so
    /// their return must not consume the entry of an enclosing traced call.
    pub fn take_pending_for(&self, func: FuncId, callee: ObjectId) -> Option<PendingCall> {
        let mut state = self.state.lock();
        let index = state
            .pending
            .iter()
            .rposition(|call| call.func_id == func && call.callee == callee)?;
        Some(state.pending.remove(index))
    }

    /// Seal the innermost pending call into a record.
    ///
    /// Returns the record's index, or `None` when no call is pending (the
    /// buffer was cleared while the call was in flight).
    pub fn finish_call(&self, end: Timestamp, arguments: String, return_value: i64) -> Option<usize> {
        let mut state = self.state.lock();
        let Some(call) = state.pending.pop() else {
            debug!("{}: call returned with nothing pending, dropped", self.thread_id);
            return None;
        };
        let record = CallRecord::new(call, self.thread_id, end, arguments, return_value);
        Some(push_record(&mut state, record))
    }

    /// Append a sealed record and log its timing pair. Returns the record's index.
    pub fn add_entry(&self, record: CallRecord) -> usize {
        push_record(&mut self.state.lock(), record)
    }

    /// Drop every record, timing pair and pending call. Idempotent.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.records.clear();
        state.timings.clear();
        state.pending.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timing pair of the call at `index`.
    #[must_use]
    pub fn timing(&self, index: usize) -> Option<CallTiming> {
        self.state.lock().timings.get(index)
    }

    /// Run `f` over the records in recorded order.
    pub fn with_records<R>(&self, f: impl FnOnce(&[CallRecord]) -> R) -> R {
        f(&self.state.lock().records)
    }

    /// Record measured under `sample_id`.
    #[must_use]
    pub fn find_by_sample(&self, sample_id: SampleId) -> Option<CallRecord> {
        self.state
            .lock()
            .records
            .iter()
            .find(|r| r.sample_id == Some(sample_id))
            .cloned()
    }
}

fn push_record(state: &mut BufferState, record: CallRecord) -> usize {
    state.timings.log(record.start, record.end);
    state.records.push(record);
    state.records.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(func: u32, start: u64) -> PendingCall {
        PendingCall {
            func_id: FuncId(func),
            callee: ObjectId(0x1000),
            start: Timestamp(start),
            sample_id: None,
            gpu_list: None,
        }
    }

    #[test]
    fn test_take_pending_for_skips_other_calls() {
        let buffer = ThreadTraceBuffer::new(ThreadId(7));
        buffer.begin_call(pending(1, 10));
        assert!(buffer.take_pending_for(FuncId(2), ObjectId(0x1000)).is_none());
        assert!(buffer.take_pending_for(FuncId(1), ObjectId(0x2000)).is_none());

        let call = buffer.take_pending_for(FuncId(1), ObjectId(0x1000)).unwrap();
        assert_eq!(call.start, Timestamp(10));
        assert!(buffer.take_pending().is_none());
    }

    #[test]
    fn test_finish_call_records_in_order() {
        let buffer = ThreadTraceBuffer::new(ThreadId(7));
        buffer.begin_call(pending(1, 10));
        assert_eq!(buffer.finish_call(Timestamp(20), "a".into(), 0), Some(0));
        buffer.begin_call(pending(2, 30));
        assert_eq!(buffer.finish_call(Timestamp(35), "b".into(), 0), Some(1));

        buffer.with_records(|records| {
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].func_id(), FuncId(1));
            assert_eq!(records[1].arguments(), "b");
            assert_eq!(records[1].thread_id(), ThreadId(7));
        });
        assert_eq!(buffer.timing(1).unwrap().start, Timestamp(30));
    }

    #[test]
    fn test_nested_calls_pair_innermost_first() {
        let buffer = ThreadTraceBuffer::new(ThreadId(1));
        buffer.begin_call(pending(1, 10));
        buffer.begin_call(pending(2, 11));
        buffer.finish_call(Timestamp(12), String::new(), 0);
        buffer.finish_call(Timestamp(20), String::new(), 0);
        buffer.with_records(|records| {
            assert_eq!(records[0].func_id(), FuncId(2));
            assert_eq!(records[1].func_id(), FuncId(1));
            assert!(records.iter().all(|r| r.end() >= r.start()));
        });
    }

    #[test]
    fn test_finish_without_pending_is_dropped() {
        let buffer = ThreadTraceBuffer::new(ThreadId(1));
        assert_eq!(buffer.finish_call(Timestamp(5), String::new(), 0), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_end_never_precedes_start() {
        let record = CallRecord::new(pending(1, 100), ThreadId(1), Timestamp(50), String::new(), 0);
        assert_eq!(record.end(), Timestamp(100));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let buffer = ThreadTraceBuffer::new(ThreadId(3));
        buffer.begin_call(pending(1, 1));
        buffer.finish_call(Timestamp(2), String::new(), 0);
        buffer.begin_call(pending(1, 3));

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.take_pending().is_none());
        assert!(buffer.timing(0).is_none());

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_find_by_sample() {
        let buffer = ThreadTraceBuffer::new(ThreadId(3));
        let mut call = pending(4, 1);
        call.sample_id = Some(SampleId(99));
        buffer.begin_call(call);
        buffer.finish_call(Timestamp(2), "x".into(), 0);
        assert_eq!(buffer.find_by_sample(SampleId(99)).unwrap().func_id(), FuncId(4));
        assert!(buffer.find_by_sample(SampleId(1)).is_none());
    }
}
