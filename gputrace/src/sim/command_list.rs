//! Recorded command stream of the software backend.

use crate::domain::CommandListId;
use crate::profiling::{CommandRecorder, QueryHeap, ReadbackBuffer};
use gputrace_common::{PipelineStatistics, QueryKind};
use parking_lot::Mutex;

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SimCommand {
    BeginQuery {
        heap: u64,
        kind: QueryKind,
        index: u32,
    },
    EndQuery {
        heap: u64,
        kind: QueryKind,
        index: u32,
    },
    Resolve {
        heap: u64,
        kind: QueryKind,
        start: u32,
        count: u32,
        buffer: u64,
        offset: usize,
    },
    /// GPU work taking `ticks` clock ticks and producing `stats`.
    Work {
        ticks: u64,
        stats: PipelineStatistics,
    },
}

/// A command list that records into host memory until it is executed.
#[derive(Debug)]
pub struct SimCommandList {
    id: CommandListId,
    commands: Mutex<Vec<SimCommand>>,
}

impl SimCommandList {
    pub(crate) fn new(id: CommandListId) -> Self {
        Self {
            id,
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Record a draw of `vertices` vertices that keeps the GPU busy for `ticks`.
    pub fn draw(&self, vertices: u64, ticks: u64) {
        let stats = PipelineStatistics {
            ia_vertices: vertices,
            ia_primitives: vertices / 3,
            vs_invocations: vertices,
            c_invocations: vertices / 3,
            c_primitives: vertices / 3,
            ps_invocations: vertices * 4,
            ..Default::default()
        };
        self.record(SimCommand::Work { ticks, stats });
    }

    /// Record a compute dispatch of `groups` thread groups.
    pub fn dispatch(&self, groups: u64, ticks: u64) {
        let stats = PipelineStatistics {
            cs_invocations: groups * 64,
            ..Default::default()
        };
        self.record(SimCommand::Work { ticks, stats });
    }

    /// Record work that produces no pipeline statistics (copies, clears).
    pub fn busy(&self, ticks: u64) {
        self.record(SimCommand::Work {
            ticks,
            stats: PipelineStatistics::default(),
        });
    }

    /// Discard everything recorded so far.
    pub fn reset(&self) {
        self.commands.lock().clear();
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn take_commands(&self) -> Vec<SimCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    fn record(&self, command: SimCommand) {
        self.commands.lock().push(command);
    }
}

impl CommandRecorder for SimCommandList {
    fn id(&self) -> CommandListId {
        self.id
    }

    fn begin_query(&self, heap: &QueryHeap, index: u32) {
        self.record(SimCommand::BeginQuery {
            heap: heap.id(),
            kind: heap.kind(),
            index,
        });
    }

    fn end_query(&self, heap: &QueryHeap, index: u32) {
        self.record(SimCommand::EndQuery {
            heap: heap.id(),
            kind: heap.kind(),
            index,
        });
    }

    fn resolve_query_data(
        &self,
        heap: &QueryHeap,
        start: u32,
        count: u32,
        dest: &ReadbackBuffer,
        dest_offset: usize,
    ) {
        self.record(SimCommand::Resolve {
            heap: heap.id(),
            kind: heap.kind(),
            start,
            count,
            buffer: dest.id(),
            offset: dest_offset,
        });
    }
}
