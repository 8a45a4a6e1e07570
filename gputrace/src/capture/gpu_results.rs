//! Profiler results gathered during a frame, per queue.

use crate::domain::{QueueId, SampleId};
use crate::profiling::ProfilerResult;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct QueueResults {
    frequency: u64,
    results: Vec<ProfilerResult>,
    by_sample: HashMap<SampleId, usize>,
}

/// Results in submission order within each queue, queues in id order.
#[derive(Debug, Default)]
pub struct GpuResultStore {
    queues: BTreeMap<QueueId, QueueResults>,
}

impl GpuResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a harvested batch for `queue`, whose clock runs at `frequency`.
    pub fn store(&mut self, queue: QueueId, frequency: u64, results: Vec<ProfilerResult>) {
        let entry = self.queues.entry(queue).or_default();
        entry.frequency = frequency;
        for result in results {
            entry.by_sample.insert(result.info.sample_id, entry.results.len());
            entry.results.push(result);
        }
    }

    /// Result measured under `sample` on `queue`.
    #[must_use]
    pub fn get(&self, queue: QueueId, sample: SampleId) -> Option<&ProfilerResult> {
        let entry = self.queues.get(&queue)?;
        entry.by_sample.get(&sample).and_then(|&i| entry.results.get(i))
    }

    /// Every result with its queue and queue frequency.
    pub fn iter(&self) -> impl Iterator<Item = (QueueId, u64, &ProfilerResult)> {
        self.queues.iter().flat_map(|(queue, entry)| {
            entry
                .results
                .iter()
                .map(move |result| (*queue, entry.frequency, result))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.values().map(|q| q.results.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandListId, FuncId};
    use crate::profiling::MeasurementInfo;

    fn result(sample: u64) -> ProfilerResult {
        ProfilerResult {
            info: MeasurementInfo {
                sample_id: SampleId(sample),
                func_id: FuncId(0),
                frame_index: 0,
                command_list: CommandListId(1),
                measurement_num: sample,
            },
            timestamps: None,
            pipeline_stats: None,
        }
    }

    #[test]
    fn test_store_orders_by_queue_then_submission() {
        let mut store = GpuResultStore::new();
        store.store(QueueId(9), 100, vec![result(5), result(6)]);
        store.store(QueueId(2), 100, vec![result(7)]);
        store.store(QueueId(9), 100, vec![result(1)]);

        let order: Vec<u64> = store.iter().map(|(_, _, r)| r.info.sample_id.0).collect();
        assert_eq!(order, vec![7, 5, 6, 1]);
        assert_eq!(store.len(), 4);
        assert!(store.get(QueueId(9), SampleId(6)).is_some());
        assert!(store.get(QueueId(2), SampleId(6)).is_none());

        store.clear();
        assert!(store.is_empty());
    }
}
