/*!
# Direct3D 12 objects.

Every object here is generic over the [`Native`] call surface, so the same
recording and binding logic drives the real runtime and the soft device.

## Resource transitions

Abstract usages map onto native resource states by OR-ing one state per usage
bit. A barrier whose states match on both sides is dropped, unless it is a
storage-to-storage dependency, which becomes a UAV barrier.

## Memory

All resources are committed. Upload and readback heaps back the mappable
buffers, everything else lives in the default heap.

## Resource binding

Each bind group gets at most two descriptor tables in the root signature: one
for CBV/SRV/UAV entries and one for samplers, see [`derive_root_layout`].
Bind group descriptors are written into the two shader-visible heaps at
creation time, so binding is a matter of setting two table handles.

Changing the root signature invalidates every bound table. Passes keep the
bound tables in `PassState::root_elements` and re-apply all of them whenever
the signature changes, before the next draw or dispatch.

## Synchronization

The device owns an idle fence. [`Device::wait_for_gpu`] signals it from the
queue and blocks on an event until the GPU catches up. Surface reconfiguration,
presentation and the queue's staging writes all drain through it.
!*/

mod adapter;
mod command;
pub(crate) mod conv;
mod descriptor;
mod device;
mod instance;
mod queue;
pub mod shader_compilation;
mod surface;
mod view;

use std::{
    fmt,
    num::NonZeroU32,
    ops::Range,
    ptr::NonNull,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use arrayvec::ArrayVec;
use fxhash::FxHashMap;
use parking_lot::{Mutex, RwLock};

use crate::native::{self, Native, RawDevice as _, RawEvent as _, RawFence as _, RawQueue as _};
use native::NativeResultExt as _;

pub use command::{ComputePass, RenderPass};
pub use descriptor::{DescriptorHeap, DescriptorSlot, HeapRange, HeapUsage};
pub use device::{derive_root_layout, HeapReport, RootLayout};
pub use surface::SurfaceTexture;

/// Root signatures are limited to 64 DWORDs and a table costs one.
const MAX_ROOT_ELEMENTS: usize = 64;

/// Helper structure for waiting for GPU.
struct Idler<N: Native> {
    fence: N::Fence,
    /// The event, and the last value signaled on `fence`.
    state: Mutex<(N::Event, u64)>,
}

impl<N: Native> fmt::Debug for Idler<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Idler")
            .field("fence", &self.fence)
            .field("value", &self.state.lock().1)
            .finish()
    }
}

/// Parts of the device shared with encoders, queues and swapchains.
#[derive(Debug)]
pub(crate) struct DeviceShared<N: Native> {
    raw: N::Device,
    present_queue: N::Queue,
    idler: Idler<N>,
    heap_views: Arc<DescriptorHeap<N>>,
    heap_samplers: Arc<DescriptorHeap<N>>,
    rtv_heap: Arc<DescriptorHeap<N>>,
    dsv_heap: Arc<DescriptorHeap<N>>,
    view_staging: Arc<DescriptorHeap<N>>,
    sampler_staging: Arc<DescriptorHeap<N>>,
    lost: AtomicBool,
}

impl<N: Native> DeviceShared<N> {
    fn mark_lost(&self) {
        if !self.lost.swap(true, Ordering::AcqRel) {
            log::error!("Device lost: {}", self.raw.removed_reason());
        }
    }

    /// Fails with [`crate::DeviceError::Lost`] once the native device reports removal.
    fn check_removed(&self) -> Result<(), crate::DeviceError> {
        if self.lost.load(Ordering::Acquire) {
            return Err(crate::DeviceError::Lost);
        }
        let reason = self.raw.removed_reason();
        if reason.is_ok() {
            Ok(())
        } else {
            self.mark_lost();
            Err(crate::DeviceError::Lost)
        }
    }

    /// Blocks until the queue is finished with all of its work.
    fn wait_for_gpu(&self) -> Result<(), crate::DeviceError> {
        profiling::scope!("wait_for_gpu");
        let mut state = self.idler.state.lock();
        if self.idler.fence.completed_value() == u64::MAX {
            self.mark_lost();
            return Err(crate::DeviceError::Lost);
        }
        state.1 += 1;
        let value = state.1;
        self.present_queue
            .signal(&self.idler.fence, value)
            .into_device_result("Signal")
            .inspect_err(|_| self.mark_lost())?;
        self.idler
            .fence
            .set_event_on_completion(value, &state.0)
            .into_device_result("SetEventOnCompletion")?;
        log::trace!("Waiting for idle fence value {value}");
        match state.0.wait(native::INFINITE) {
            native::WaitStatus::Signaled => {}
            other => {
                log::error!("Idle wait returned {other:?}");
                self.mark_lost();
                return Err(crate::DeviceError::Lost);
            }
        }
        if self.idler.fence.completed_value() == u64::MAX {
            self.mark_lost();
            return Err(crate::DeviceError::Lost);
        }
        Ok(())
    }
}

pub struct Instance<N: Native> {
    raw: Arc<N::Instance>,
    flags: crate::InstanceFlags,
}

impl<N: Native> fmt::Debug for Instance<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

pub struct Adapter<N: Native> {
    raw: N::Adapter,
    /// Keeps the runtime loaded.
    _instance: Arc<N::Instance>,
    flags: crate::InstanceFlags,
}

impl<N: Native> fmt::Debug for Adapter<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter").field("raw", &self.raw).finish()
    }
}

pub struct Device<N: Native> {
    shared: Arc<DeviceShared<N>>,
    /// Root signature of pipelines created without a layout.
    empty_root_signature: Mutex<Option<Arc<N::RootSignature>>>,
    flags: crate::InstanceFlags,
    shader_compiler: Option<Arc<dyn crate::ShaderCompiler>>,
    counters: crate::HalCounters,
}

impl<N: Native> fmt::Debug for Device<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("shared", &self.shared)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Command list and allocator used for queue-side staging copies.
#[derive(Debug)]
struct Transfer<N: Native> {
    allocator: N::CommandAllocator,
    list: Option<N::CommandList>,
}

#[derive(Debug)]
pub struct Queue<N: Native> {
    raw: N::Queue,
    shared: Arc<DeviceShared<N>>,
    transfer: Mutex<Transfer<N>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EncoderState {
    Idle,
    Recording,
    Discarded,
}

#[derive(Clone, Copy, Debug)]
enum RootElement {
    Empty,
    /// Descriptor table.
    Table(native::GpuDescriptor),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PassKind {
    Render,
    Compute,
    Transfer,
}

#[derive(Debug)]
struct PassState<N: Native> {
    has_label: bool,
    heaps_bound: bool,
    signature: Option<Arc<N::RootSignature>>,
    root_elements: [RootElement; MAX_ROOT_ELEMENTS],
    dirty_root_elements: u64,
    vertex_buffers: [native::VertexBufferView; crate::MAX_VERTEX_BUFFERS],
    vertex_strides: [Option<NonZeroU32>; crate::MAX_VERTEX_BUFFERS],
    dirty_vertex_buffers: usize,
    kind: PassKind,
}

#[test]
fn test_dirty_mask() {
    assert_eq!(MAX_ROOT_ELEMENTS, u64::BITS as usize);
    assert!(crate::MAX_VERTEX_BUFFERS <= usize::BITS as usize);
}

impl<N: Native> PassState<N> {
    fn new() -> Self {
        PassState {
            has_label: false,
            heaps_bound: false,
            signature: None,
            root_elements: [RootElement::Empty; MAX_ROOT_ELEMENTS],
            dirty_root_elements: 0,
            vertex_buffers: [Default::default(); crate::MAX_VERTEX_BUFFERS],
            vertex_strides: [None; crate::MAX_VERTEX_BUFFERS],
            dirty_vertex_buffers: 0,
            kind: PassKind::Transfer,
        }
    }

    fn clear(&mut self) {
        *self = Self::new();
    }
}

pub struct CommandEncoder<N: Native> {
    allocator: N::CommandAllocator,
    shared: Arc<DeviceShared<N>>,
    list: Option<N::CommandList>,
    free_lists: Vec<N::CommandList>,
    state: EncoderState,
    pass: PassState<N>,
}

impl<N: Native> fmt::Debug for CommandEncoder<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEncoder")
            .field("allocator", &self.allocator)
            .field("state", &self.state)
            .field("free_lists", &self.free_lists.len())
            .finish()
    }
}

#[derive(Debug)]
pub struct CommandBuffer<N: Native> {
    raw: N::CommandList,
}

impl<N: Native> CommandBuffer<N> {
    pub fn raw(&self) -> &N::CommandList {
        &self.raw
    }
}

/// CPU address of a mapped buffer.
#[derive(Clone, Copy, Debug)]
struct MappedPtr(NonNull<u8>);

// The pointer targets native memory owned by the resource, which is `Send + Sync`.
unsafe impl Send for MappedPtr {}
unsafe impl Sync for MappedPtr {}

#[derive(Debug)]
pub struct Buffer<N: Native> {
    resource: N::Resource,
    size: crate::BufferAddress,
    allocated_size: crate::BufferAddress,
    usage: crate::BufferUses,
    heap: native::HeapType,
    gpu_address: u64,
    mapped: Mutex<Option<MappedPtr>>,
}

impl<N: Native> Buffer<N> {
    pub fn raw(&self) -> &N::Resource {
        &self.resource
    }

    /// Size as requested at creation.
    pub fn size(&self) -> crate::BufferAddress {
        self.size
    }

    pub fn allocated_size(&self) -> crate::BufferAddress {
        self.allocated_size
    }

    pub fn usage(&self) -> crate::BufferUses {
        self.usage
    }

    pub fn heap(&self) -> native::HeapType {
        self.heap
    }

    pub fn gpu_address(&self) -> u64 {
        self.gpu_address
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.lock().is_some()
    }
}

impl<N: Native> Drop for Buffer<N> {
    fn drop(&mut self) {
        if self.mapped.get_mut().take().is_some() {
            native::RawResource::unmap(&self.resource);
        }
    }
}

impl<N: Native> crate::BufferBinding<'_, N> {
    fn resolve_size(&self) -> crate::BufferAddress {
        crate::resolve_binding_size(self.buffer.size, self.offset, self.size)
    }

    fn resolve_address(&self) -> crate::BufferAddress {
        self.buffer.gpu_address + self.offset
    }
}

#[derive(Debug)]
pub struct Texture<N: Native> {
    resource: N::Resource,
    format: crate::TextureFormat,
    dimension: crate::TextureDimension,
    size: crate::Extent3d,
    mip_level_count: u32,
    sample_count: u32,
    usage: crate::TextureUses,
    /// Back buffer handed out by a surface.
    is_external: bool,
}

impl<N: Native> Texture<N> {
    pub fn raw(&self) -> &N::Resource {
        &self.resource
    }

    pub fn format(&self) -> crate::TextureFormat {
        self.format
    }

    pub fn size(&self) -> crate::Extent3d {
        self.size
    }

    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }

    pub fn usage(&self) -> crate::TextureUses {
        self.usage
    }

    pub fn is_external(&self) -> bool {
        self.is_external
    }

    pub fn array_layer_count(&self) -> u32 {
        match self.dimension {
            crate::TextureDimension::D1 | crate::TextureDimension::D3 => 1,
            crate::TextureDimension::D2 => self.size.depth_or_array_layers,
        }
    }

    /// Resolves the open ends of `range` and checks it against the texture.
    /// Returns the mip levels and array layers it covers, neither empty.
    fn resolve_range(
        &self,
        range: &crate::ImageSubresourceRange,
    ) -> Result<(Range<u32>, Range<u32>), crate::DeviceError> {
        let resolve = |base: u32, count: Option<u32>, total: u32| {
            let end = match count {
                Some(count) => base.checked_add(count)?,
                None => total,
            };
            (base < end && end <= total).then_some(base..end)
        };
        let mip_levels = resolve(
            range.base_mip_level,
            range.mip_level_count,
            self.mip_level_count,
        );
        let array_layers = resolve(
            range.base_array_layer,
            range.array_layer_count,
            self.array_layer_count(),
        );
        match (mip_levels, array_layers) {
            (Some(mip_levels), Some(array_layers)) => Ok((mip_levels, array_layers)),
            _ => Err(crate::DeviceError::InvalidArgument(format!(
                "subresource range {range:?} exceeds the texture ({} mips, {} layers)",
                self.mip_level_count,
                self.array_layer_count()
            ))),
        }
    }

    /// see <https://learn.microsoft.com/en-us/windows/win32/direct3d12/subresources#plane-slice>
    pub fn calc_subresource(&self, mip_level: u32, array_layer: u32, plane: u32) -> u32 {
        mip_level + (array_layer + plane * self.array_layer_count()) * self.mip_level_count
    }

    fn calc_subresource_for_copy(&self, base: &crate::TextureCopyBase) -> u32 {
        // Stencil lives in plane 1 of the combined formats.
        let plane = if base.aspect == crate::FormatAspects::STENCIL {
            1
        } else {
            0
        };
        self.calc_subresource(base.mip_level, base.array_layer, plane)
    }
}

#[derive(Debug)]
pub struct TextureView<N: Native> {
    format: crate::TextureFormat,
    raw_format: native::Format,
    aspects: crate::FormatAspects,
    dimension: crate::TextureViewDimension,
    mip_levels: Range<u32>,
    array_layers: Range<u32>,
    /// Extent of the first mip level in the view.
    extent: crate::Extent3d,
    sample_count: u32,
    handle_srv: Option<DescriptorSlot<N>>,
    handle_uav: Option<DescriptorSlot<N>>,
    /// Shared with the swapchain for back buffer views.
    handle_rtv: Option<Arc<DescriptorSlot<N>>>,
    handle_dsv_ro: Option<DescriptorSlot<N>>,
    handle_dsv_rw: Option<DescriptorSlot<N>>,
}

impl<N: Native> TextureView<N> {
    pub fn format(&self) -> crate::TextureFormat {
        self.format
    }

    pub fn raw_format(&self) -> native::Format {
        self.raw_format
    }

    pub fn dimension(&self) -> crate::TextureViewDimension {
        self.dimension
    }

    pub fn extent(&self) -> crate::Extent3d {
        self.extent
    }

    pub fn mip_levels(&self) -> Range<u32> {
        self.mip_levels.clone()
    }

    pub fn array_layers(&self) -> Range<u32> {
        self.array_layers.clone()
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn srv(&self) -> Option<native::CpuDescriptor> {
        self.handle_srv.as_ref().map(DescriptorSlot::raw)
    }

    pub fn uav(&self) -> Option<native::CpuDescriptor> {
        self.handle_uav.as_ref().map(DescriptorSlot::raw)
    }

    pub fn rtv(&self) -> Option<native::CpuDescriptor> {
        self.handle_rtv.as_deref().map(DescriptorSlot::raw)
    }

    pub fn dsv(&self, read_only: bool) -> Option<native::CpuDescriptor> {
        if read_only {
            self.handle_dsv_ro.as_ref().map(DescriptorSlot::raw)
        } else {
            self.handle_dsv_rw.as_ref().map(DescriptorSlot::raw)
        }
    }
}

#[derive(Debug)]
pub struct Sampler<N: Native> {
    handle: DescriptorSlot<N>,
}

impl<N: Native> Sampler<N> {
    pub fn raw(&self) -> native::CpuDescriptor {
        self.handle.raw()
    }
}

#[derive(Debug)]
pub struct BindGroupLayout {
    /// Sorted list of entries.
    entries: Vec<crate::BindGroupLayoutEntry>,
    view_count: u32,
    sampler_count: u32,
}

impl BindGroupLayout {
    pub fn entries(&self) -> &[crate::BindGroupLayoutEntry] {
        &self.entries
    }

    pub fn view_count(&self) -> u32 {
        self.view_count
    }

    pub fn sampler_count(&self) -> u32 {
        self.sampler_count
    }
}

#[derive(Debug)]
pub struct BindGroup {
    handle_views: Option<HeapRange>,
    handle_samplers: Option<HeapRange>,
}

impl BindGroup {
    pub fn views(&self) -> Option<&HeapRange> {
        self.handle_views.as_ref()
    }

    pub fn samplers(&self) -> Option<&HeapRange> {
        self.handle_samplers.as_ref()
    }
}

// Element (also known as parameter) index into the root signature.
type RootIndex = u32;

/// Root parameters that belong to one bind group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BindGroupInfo {
    pub view_root_index: Option<RootIndex>,
    pub sampler_root_index: Option<RootIndex>,
}

#[derive(Debug)]
pub struct PipelineLayout<N: Native> {
    /// Sole strong owner; pipelines keep a `Weak`.
    raw: Arc<N::RootSignature>,
    total_root_elements: RootIndex,
    // Storing for each associated bind group, which tables we created
    // in the root signature. This is required for binding descriptor sets.
    bind_group_infos: ArrayVec<BindGroupInfo, { crate::MAX_BIND_GROUPS }>,
}

impl<N: Native> PipelineLayout<N> {
    pub fn raw(&self) -> &N::RootSignature {
        &self.raw
    }

    pub fn bind_group_infos(&self) -> &[BindGroupInfo] {
        &self.bind_group_infos
    }

    pub fn total_root_elements(&self) -> u32 {
        self.total_root_elements
    }
}

#[derive(Debug)]
pub struct ShaderModule {
    entry_points: FxHashMap<String, (crate::ShaderStages, crate::CompiledShader)>,
}

impl ShaderModule {
    pub fn entry_point(&self, name: &str) -> Option<(crate::ShaderStages, &crate::CompiledShader)> {
        self.entry_points
            .get(name)
            .map(|&(stage, ref shader)| (stage, shader))
    }
}

#[derive(Debug)]
pub struct RenderPipeline<N: Native> {
    raw: N::PipelineState,
    signature: Weak<N::RootSignature>,
    total_root_elements: RootIndex,
    topology: native::PrimitiveTopology,
    vertex_strides: [Option<NonZeroU32>; crate::MAX_VERTEX_BUFFERS],
}

impl<N: Native> RenderPipeline<N> {
    pub fn raw(&self) -> &N::PipelineState {
        &self.raw
    }
}

#[derive(Debug)]
pub struct ComputePipeline<N: Native> {
    raw: N::PipelineState,
    signature: Weak<N::RootSignature>,
    total_root_elements: RootIndex,
}

impl<N: Native> ComputePipeline<N> {
    pub fn raw(&self) -> &N::PipelineState {
        &self.raw
    }
}

#[derive(Debug)]
pub struct Fence<N: Native> {
    raw: N::Fence,
    event: Mutex<N::Event>,
}

impl<N: Native> Fence<N> {
    pub fn raw(&self) -> &N::Fence {
        &self.raw
    }
}

#[derive(Debug)]
struct BackBuffer<N: Native> {
    resource: N::Resource,
    rtv: Arc<DescriptorSlot<N>>,
}

#[derive(Debug)]
struct SwapChain<N: Native> {
    raw: N::SwapChain,
    device: Arc<DeviceShared<N>>,
    back_buffers: Vec<BackBuffer<N>>,
    acquired_count: usize,
    present_mode: crate::PresentMode,
    format: crate::TextureFormat,
    usage: crate::TextureUses,
    size: crate::Extent3d,
    tearing_allowed: bool,
}

pub struct Surface<N: Native> {
    instance: Arc<N::Instance>,
    window: N::Window,
    supports_allow_tearing: bool,
    swap_chain: RwLock<Option<SwapChain<N>>>,
}

impl<N: Native> fmt::Debug for Surface<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("window", &self.window)
            .field("supports_allow_tearing", &self.supports_allow_tearing)
            .field("configured", &self.swap_chain.read().is_some())
            .finish()
    }
}
