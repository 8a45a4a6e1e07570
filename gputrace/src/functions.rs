//! Intercepted API function table.
//!
//! Every intercepted function has a [`FuncId`] and a row in a
//! [`FunctionRegistry`] describing how the tracer treats it:
//!
//! - **`is_draw`** - counted as a draw call in frame summaries
//! - **`profiled`** - bracketed with GPU queries when GPU tracing is active
//! - **`submits_work`** - hands command lists to a queue; profiler results are
//!   gathered when the call returns
//!
//! The registry is built once and shared read-only, so per-call decisions are a
//! single indexed lookup.

use crate::domain::FuncId;
use std::collections::HashMap;

/// Interface family a function belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiGroup {
    Device,
    CommandList,
    CommandQueue,
    SwapChain,
    Resource,
}

/// One row of the function table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: &'static str,
    pub group: ApiGroup,
    pub is_draw: bool,
    pub profiled: bool,
    pub submits_work: bool,
}

impl FunctionInfo {
    const fn plain(name: &'static str, group: ApiGroup) -> Self {
        Self {
            name,
            group,
            is_draw: false,
            profiled: false,
            submits_work: false,
        }
    }

    const fn draw(name: &'static str) -> Self {
        Self {
            name,
            group: ApiGroup::CommandList,
            is_draw: true,
            profiled: true,
            submits_work: false,
        }
    }

    const fn gpu_work(name: &'static str) -> Self {
        Self {
            name,
            group: ApiGroup::CommandList,
            is_draw: false,
            profiled: true,
            submits_work: false,
        }
    }

    const fn submit(name: &'static str) -> Self {
        Self {
            name,
            group: ApiGroup::CommandQueue,
            is_draw: false,
            profiled: false,
            submits_work: true,
        }
    }
}

/// The D3D12 entry points traced by default.
const D3D12_FUNCTIONS: &[FunctionInfo] = &[
    FunctionInfo::plain("ID3D12Device_CreateCommandQueue", ApiGroup::Device),
    FunctionInfo::plain("ID3D12Device_CreateCommandAllocator", ApiGroup::Device),
    FunctionInfo::plain("ID3D12Device_CreateGraphicsPipelineState", ApiGroup::Device),
    FunctionInfo::plain("ID3D12Device_CreateCommandList", ApiGroup::Device),
    FunctionInfo::plain("ID3D12Device_CreateDescriptorHeap", ApiGroup::Device),
    FunctionInfo::plain("ID3D12Device_CreateRenderTargetView", ApiGroup::Device),
    FunctionInfo::plain("ID3D12Device_CreateCommittedResource", ApiGroup::Device),
    FunctionInfo::plain("ID3D12Device_CreateFence", ApiGroup::Device),
    FunctionInfo::plain("ID3D12Resource_Map", ApiGroup::Resource),
    FunctionInfo::plain("ID3D12Resource_Unmap", ApiGroup::Resource),
    FunctionInfo::plain("ID3D12GraphicsCommandList_Close", ApiGroup::CommandList),
    FunctionInfo::plain("ID3D12GraphicsCommandList_Reset", ApiGroup::CommandList),
    FunctionInfo::draw("ID3D12GraphicsCommandList_DrawInstanced"),
    FunctionInfo::draw("ID3D12GraphicsCommandList_DrawIndexedInstanced"),
    FunctionInfo::gpu_work("ID3D12GraphicsCommandList_Dispatch"),
    FunctionInfo::gpu_work("ID3D12GraphicsCommandList_CopyBufferRegion"),
    FunctionInfo::gpu_work("ID3D12GraphicsCommandList_CopyTextureRegion"),
    FunctionInfo::gpu_work("ID3D12GraphicsCommandList_CopyResource"),
    FunctionInfo::gpu_work("ID3D12GraphicsCommandList_ResolveSubresource"),
    FunctionInfo::plain("ID3D12GraphicsCommandList_IASetPrimitiveTopology", ApiGroup::CommandList),
    FunctionInfo::plain("ID3D12GraphicsCommandList_RSSetViewports", ApiGroup::CommandList),
    FunctionInfo::plain("ID3D12GraphicsCommandList_RSSetScissorRects", ApiGroup::CommandList),
    FunctionInfo::plain("ID3D12GraphicsCommandList_SetPipelineState", ApiGroup::CommandList),
    FunctionInfo::plain("ID3D12GraphicsCommandList_ResourceBarrier", ApiGroup::CommandList),
    FunctionInfo::gpu_work("ID3D12GraphicsCommandList_ExecuteBundle"),
    FunctionInfo::plain("ID3D12GraphicsCommandList_SetGraphicsRootSignature", ApiGroup::CommandList),
    FunctionInfo::plain("ID3D12GraphicsCommandList_IASetVertexBuffers", ApiGroup::CommandList),
    FunctionInfo::plain("ID3D12GraphicsCommandList_OMSetRenderTargets", ApiGroup::CommandList),
    FunctionInfo::gpu_work("ID3D12GraphicsCommandList_ClearDepthStencilView"),
    FunctionInfo::gpu_work("ID3D12GraphicsCommandList_ClearRenderTargetView"),
    FunctionInfo::gpu_work("ID3D12GraphicsCommandList_ExecuteIndirect"),
    FunctionInfo::submit("ID3D12CommandQueue_ExecuteCommandLists"),
    FunctionInfo::plain("ID3D12CommandQueue_Signal", ApiGroup::CommandQueue),
    FunctionInfo::plain("ID3D12CommandQueue_Wait", ApiGroup::CommandQueue),
    FunctionInfo::plain("ID3D12CommandQueue_GetTimestampFrequency", ApiGroup::CommandQueue),
    FunctionInfo::plain("IDXGISwapChain_Present", ApiGroup::SwapChain),
];

const UNKNOWN_FUNCTION: &str = "<unknown>";

/// Lookup table from [`FuncId`] to [`FunctionInfo`].
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    entries: Vec<FunctionInfo>,
    by_name: HashMap<&'static str, FuncId>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the D3D12 entry points.
    #[must_use]
    pub fn d3d12() -> Self {
        let mut registry = Self::new();
        for info in D3D12_FUNCTIONS {
            registry.register(info.clone());
        }
        registry
    }

    /// Add a function, returning its id. Registering a name twice returns the
    /// existing id and leaves the first row unchanged.
    #[allow(clippy::cast_possible_truncation)]
    pub fn register(&mut self, info: FunctionInfo) -> FuncId {
        if let Some(&id) = self.by_name.get(info.name) {
            return id;
        }
        let id = FuncId(self.entries.len() as u32);
        self.by_name.insert(info.name, id);
        self.entries.push(info);
        id
    }

    #[must_use]
    pub fn get(&self, id: FuncId) -> Option<&FunctionInfo> {
        self.entries.get(id.0 as usize)
    }

    /// Id of the function with this name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    /// Name of `id`, or `<unknown>` for ids outside the table.
    #[must_use]
    pub fn name(&self, id: FuncId) -> &str {
        self.get(id).map_or(UNKNOWN_FUNCTION, |info| info.name)
    }

    #[must_use]
    pub fn is_draw(&self, id: FuncId) -> bool {
        self.get(id).is_some_and(|info| info.is_draw)
    }

    /// Whether calls to `id` are bracketed with GPU queries.
    #[must_use]
    pub fn should_profile(&self, id: FuncId) -> bool {
        self.get(id).is_some_and(|info| info.profiled)
    }

    #[must_use]
    pub fn submits_work(&self, id: FuncId) -> bool {
        self.get(id).is_some_and(|info| info.submits_work)
    }

    /// Turn GPU profiling of one function on or off.
    ///
    /// Returns false if `id` is not registered.
    pub fn set_profiled(&mut self, id: FuncId, profiled: bool) -> bool {
        match self.entries.get_mut(id.0 as usize) {
            Some(info) => {
                info.profiled = profiled;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_d3d12_table_lookups() {
        let registry = FunctionRegistry::d3d12();
        let draw = registry
            .lookup("ID3D12GraphicsCommandList_DrawInstanced")
            .unwrap();
        assert!(registry.is_draw(draw));
        assert!(registry.should_profile(draw));
        assert!(!registry.submits_work(draw));

        let execute = registry
            .lookup("ID3D12CommandQueue_ExecuteCommandLists")
            .unwrap();
        assert!(registry.submits_work(execute));
        assert!(!registry.should_profile(execute));
    }

    #[test]
    fn test_unknown_id() {
        let registry = FunctionRegistry::d3d12();
        let bogus = FuncId(10_000);
        assert_eq!(registry.name(bogus), "<unknown>");
        assert!(!registry.is_draw(bogus));
        assert!(!registry.should_profile(bogus));
    }

    #[test]
    fn test_register_is_idempotent_by_name() {
        let mut registry = FunctionRegistry::new();
        let a = registry.register(FunctionInfo::draw("Draw"));
        let b = registry.register(FunctionInfo::plain("Draw", ApiGroup::Device));
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert!(registry.is_draw(a));
    }

    #[test]
    fn test_set_profiled() {
        let mut registry = FunctionRegistry::d3d12();
        let close = registry.lookup("ID3D12GraphicsCommandList_Close").unwrap();
        assert!(!registry.should_profile(close));
        assert!(registry.set_profiled(close, true));
        assert!(registry.should_profile(close));
        assert!(!registry.set_profiled(FuncId(9999), true));
    }
}
