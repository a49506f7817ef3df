//! CPU reference implementation of the native call surface.
//!
//! Command lists are recorded into memory and executed on the calling thread
//! at `ExecuteCommandLists` time. Copies and clears touch real bytes, draws and
//! dispatches are counted. Descriptor heaps are address ranges backed by a
//! registry, so every descriptor written by the layer can be inspected.
//!
//! Every instance keeps a [`JournalEntry`] log of queue, fence and swapchain
//! calls.

use std::{
    ptr::NonNull,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use fxhash::FxHashMap;
use parking_lot::{Condvar, Mutex};

use super::{
    Barrier, ClearValue, ComputePipelineDesc, ConstantBufferViewDesc, CopyBox, CpuDescriptor,
    DepthStencilViewDesc, DescriptorHeapType, Diagnostic, DsvDimension, Format, GpuDescriptor,
    GraphicsPipelineDesc, HeapType, IndexBufferView, InputElement, PresentFlags,
    PrimitiveTopology, PrimitiveTopologyType, Rect, RenderTargetViewDesc, ResourceDesc,
    ResourceDimension, ResourceStates, RootParameter, RootSignatureDesc, RtvDimension,
    SamplerDesc, ShaderResourceViewDesc, Status, SwapChainDesc, SwapChainFlags,
    TextureCopyLocation, UnorderedAccessViewDesc, VertexBufferView, Viewport, WaitStatus,
    WindowAssociation, ALL_SUBRESOURCES, INFINITE,
};

const DESCRIPTOR_STRIDE: u32 = 32;
const DSV_STRIDE: u32 = 8;
const HEAP_ADDRESS_BASE: usize = 0x10_0000;
const HEAP_ADDRESS_GAP: usize = 0x1_0000;
const GPU_HEAP_OFFSET: u64 = 0x1_0000_0000_0000;
const GPU_ADDRESS_BASE: u64 = 0x10_0000_0000;
const GPU_ADDRESS_ALIGNMENT: u64 = 0x1_0000;
const MAX_ROOT_DWORDS: usize = 64;

#[derive(Clone, Copy, Debug)]
pub struct Soft;

impl super::Native for Soft {
    type Instance = Instance;
    type Adapter = Adapter;
    type Device = Device;
    type Queue = Queue;
    type Resource = Resource;
    type DescriptorHeap = DescriptorHeap;
    type CommandAllocator = CommandAllocator;
    type CommandList = CommandList;
    type Fence = Fence;
    type Event = Event;
    type RootSignature = RootSignature;
    type PipelineState = PipelineState;
    type SwapChain = SwapChain;
    type Window = Window;
}

/// Calls observed by the soft device, in submission order.
#[derive(Clone, Debug, PartialEq)]
pub enum JournalEntry {
    CreateSwapChain(SwapChainDesc),
    MakeWindowAssociation(WindowAssociation),
    ResetCommandAllocator,
    ExecuteCommandLists { count: usize },
    Signal { value: u64 },
    SetEventOnCompletion { value: u64 },
    ResizeBuffers {
        buffer_count: u32,
        width: u32,
        height: u32,
        format: Format,
    },
    Present {
        sync_interval: u32,
        flags: PresentFlags,
    },
}

/// Counters updated while command lists execute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub command_lists: u64,
    pub barriers: u64,
    pub barrier_mismatches: u64,
    pub copies: u64,
    pub clears: u64,
    pub draws: u64,
    pub dispatches: u64,
}

#[derive(Debug)]
struct InstanceShared {
    journal: Mutex<Vec<JournalEntry>>,
    tearing: AtomicBool,
}

impl InstanceShared {
    fn record(&self, entry: JournalEntry) {
        self.journal.lock().push(entry);
    }
}

#[derive(Debug)]
pub struct Instance {
    shared: Arc<InstanceShared>,
}

impl Instance {
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.shared.journal.lock().clone()
    }

    /// Toggles the reported `DXGI_FEATURE_PRESENT_ALLOW_TEARING` support.
    pub fn set_tearing_support(&self, supported: bool) {
        self.shared.tearing.store(supported, Ordering::Relaxed);
    }
}

impl super::RawInstance<Soft> for Instance {
    fn init(desc: &crate::InstanceDescriptor) -> Result<Self, crate::InstanceError> {
        log::debug!("Soft instance '{}' with {:?}", desc.name, desc.flags);
        Ok(Self {
            shared: Arc::new(InstanceShared {
                journal: Mutex::new(Vec::new()),
                tearing: AtomicBool::new(true),
            }),
        })
    }

    fn enumerate_adapters(&self) -> Vec<Adapter> {
        vec![Adapter {
            shared: Arc::clone(&self.shared),
        }]
    }

    fn supports_allow_tearing(&self) -> bool {
        self.shared.tearing.load(Ordering::Relaxed)
    }

    fn create_window(
        &self,
        handle: raw_window_handle::RawWindowHandle,
    ) -> Result<Window, crate::InstanceError> {
        Ok(Window {
            description: format!("{handle:?}"),
        })
    }

    fn create_swap_chain_for_window(
        &self,
        queue: &Queue,
        _window: &Window,
        desc: &SwapChainDesc,
    ) -> Result<SwapChain, Status> {
        self.shared.record(JournalEntry::CreateSwapChain(*desc));
        if desc.flags.contains(SwapChainFlags::ALLOW_TEARING) && !self.supports_allow_tearing() {
            return Err(Status::E_INVALIDARG);
        }
        if desc.buffer_count < 2 || desc.width == 0 || desc.height == 0 {
            return Err(Status::DXGI_ERROR_INVALID_CALL);
        }
        let device = Arc::clone(&queue.device);
        let buffers = device.create_back_buffers(desc);
        Ok(SwapChain {
            instance: Arc::clone(&self.shared),
            device,
            state: Mutex::new(SwapChainState {
                desc: *desc,
                buffers,
                current: 0,
            }),
        })
    }

    fn make_window_association(
        &self,
        _window: &Window,
        flags: WindowAssociation,
    ) -> Result<(), Status> {
        self.shared.record(JournalEntry::MakeWindowAssociation(flags));
        Ok(())
    }
}

#[derive(Debug)]
pub struct Window {
    pub description: String,
}

#[derive(Debug)]
pub struct Adapter {
    shared: Arc<InstanceShared>,
}

impl super::RawAdapter<Soft> for Adapter {
    fn info(&self) -> crate::AdapterInfo {
        crate::AdapterInfo {
            name: "Soft Reference Device".to_string(),
            vendor: 0,
            device: 0,
            device_type: crate::DeviceType::Cpu,
            driver_info: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn create_device(&self) -> Result<Device, Status> {
        Ok(Device {
            state: Arc::new(DeviceState {
                instance: Arc::clone(&self.shared),
                removed: AtomicBool::new(false),
                descriptors: Mutex::new(FxHashMap::default()),
                next_heap_address: AtomicUsize::new(HEAP_ADDRESS_BASE),
                next_gpu_address: AtomicU64::new(GPU_ADDRESS_BASE),
                next_id: AtomicU64::new(1),
                root_signatures: Mutex::new(FxHashMap::default()),
                stats: Mutex::new(ExecutionStats::default()),
            }),
        })
    }
}

/// A descriptor as written into a soft heap.
#[derive(Clone, Debug, PartialEq)]
pub enum SoftDescriptor {
    ConstantBuffer(ConstantBufferViewDesc),
    ShaderResource {
        resource: ResourceRef,
        desc: ShaderResourceViewDesc,
    },
    UnorderedAccess {
        resource: ResourceRef,
        desc: UnorderedAccessViewDesc,
    },
    RenderTarget {
        resource: ResourceRef,
        desc: Option<RenderTargetViewDesc>,
    },
    DepthStencil {
        resource: ResourceRef,
        desc: DepthStencilViewDesc,
    },
    Sampler(SamplerDesc),
}

#[derive(Debug)]
struct DeviceState {
    instance: Arc<InstanceShared>,
    removed: AtomicBool,
    descriptors: Mutex<FxHashMap<usize, SoftDescriptor>>,
    next_heap_address: AtomicUsize,
    next_gpu_address: AtomicU64,
    next_id: AtomicU64,
    root_signatures: Mutex<FxHashMap<u64, RootSignatureDesc>>,
    stats: Mutex<ExecutionStats>,
}

impl DeviceState {
    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    fn new_resource(&self, heap: HeapType, desc: &ResourceDesc, state: ResourceStates) -> Resource {
        let mut offsets = Vec::new();
        let mut total = 0usize;
        let texel = format_block_size(desc.format).unwrap_or(4) as usize;
        if desc.dimension == ResourceDimension::Buffer {
            offsets.push(0);
            total = desc.width as usize;
        } else {
            let mips = desc.mip_levels.max(1) as u32;
            for _layer in 0..desc.array_size() {
                for mip in 0..mips {
                    let (w, h, d) = subresource_extent(desc, mip);
                    offsets.push(total);
                    total += (w * h * d) as usize * texel;
                }
            }
        }
        let subresources = offsets.len();
        let size = (total as u64).max(1);
        let gpu_address = self.next_gpu_address.fetch_add(
            (size + GPU_ADDRESS_ALIGNMENT - 1) & !(GPU_ADDRESS_ALIGNMENT - 1),
            Ordering::Relaxed,
        );
        Resource(Arc::new(ResourceInner {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            desc: *desc,
            heap,
            gpu_address,
            offsets,
            size: total,
            memory: Mutex::new(vec![0; total].into_boxed_slice()),
            states: Mutex::new(vec![state; subresources]),
            name: Mutex::new(None),
            map_count: AtomicUsize::new(0),
        }))
    }

    fn create_back_buffers(&self, desc: &SwapChainDesc) -> Vec<Resource> {
        let resource_desc = ResourceDesc {
            dimension: ResourceDimension::Texture2D,
            width: desc.width as u64,
            height: desc.height,
            depth_or_array_size: 1,
            mip_levels: 1,
            format: desc.format,
            sample_count: 1,
            flags: super::ResourceFlags::ALLOW_RENDER_TARGET,
        };
        (0..desc.buffer_count)
            .map(|_| self.new_resource(HeapType::Default, &resource_desc, ResourceStates::COMMON))
            .collect()
    }

    fn write_descriptor(&self, dest: CpuDescriptor, descriptor: SoftDescriptor) {
        self.descriptors.lock().insert(dest.ptr, descriptor);
    }

    fn descriptor(&self, address: usize) -> Option<SoftDescriptor> {
        self.descriptors.lock().get(&address).cloned()
    }

    fn update_stats(&self, f: impl FnOnce(&mut ExecutionStats)) {
        f(&mut self.stats.lock());
    }
}

#[derive(Debug)]
pub struct Device {
    state: Arc<DeviceState>,
}

impl Device {
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.state.instance.journal.lock().clone()
    }

    pub fn clear_journal(&self) {
        self.state.instance.journal.lock().clear();
    }

    pub fn stats(&self) -> ExecutionStats {
        *self.state.stats.lock()
    }

    /// Descriptor stored at a CPU handle, in any heap.
    pub fn descriptor(&self, handle: CpuDescriptor) -> Option<SoftDescriptor> {
        self.state.descriptor(handle.ptr)
    }

    /// Descriptor stored at a GPU handle of a shader-visible heap.
    pub fn descriptor_at_gpu(&self, handle: GpuDescriptor) -> Option<SoftDescriptor> {
        let cpu = handle.ptr.checked_sub(GPU_HEAP_OFFSET)?;
        self.state.descriptor(cpu as usize)
    }

    /// Puts the device into the removed state, as a TDR would.
    pub fn simulate_removed(&self) {
        log::warn!("Soft device removed");
        self.state.removed.store(true, Ordering::Release);
    }
}

impl super::RawDevice<Soft> for Device {
    fn create_command_queue(&self) -> Result<Queue, Status> {
        Ok(Queue {
            device: Arc::clone(&self.state),
        })
    }

    fn descriptor_increment_size(&self, ty: DescriptorHeapType) -> u32 {
        match ty {
            DescriptorHeapType::Dsv => DSV_STRIDE,
            _ => DESCRIPTOR_STRIDE,
        }
    }

    fn create_descriptor_heap(
        &self,
        ty: DescriptorHeapType,
        count: u32,
        shader_visible: bool,
    ) -> Result<DescriptorHeap, Status> {
        if shader_visible && matches!(ty, DescriptorHeapType::Rtv | DescriptorHeapType::Dsv) {
            return Err(Status::E_INVALIDARG);
        }
        let span = count as usize * self.descriptor_increment_size(ty) as usize;
        let base = self
            .state
            .next_heap_address
            .fetch_add(span + HEAP_ADDRESS_GAP, Ordering::Relaxed);
        Ok(DescriptorHeap {
            ty,
            cpu_start: CpuDescriptor { ptr: base },
            gpu_start: if shader_visible {
                GpuDescriptor {
                    ptr: base as u64 + GPU_HEAP_OFFSET,
                }
            } else {
                GpuDescriptor { ptr: 0 }
            },
            count,
        })
    }

    fn create_committed_resource(
        &self,
        heap: HeapType,
        desc: &ResourceDesc,
        initial_state: ResourceStates,
        _clear_value: Option<ClearValue>,
    ) -> Result<Resource, Status> {
        if self.state.is_removed() {
            return Err(Status::DXGI_ERROR_DEVICE_REMOVED);
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(Status::E_INVALIDARG);
        }
        if desc.dimension != ResourceDimension::Buffer && format_block_size(desc.format).is_none() {
            return Err(Status::E_INVALIDARG);
        }
        match heap {
            HeapType::Upload if initial_state != ResourceStates::GENERIC_READ => {
                return Err(Status::E_INVALIDARG)
            }
            HeapType::Readback if initial_state != ResourceStates::COPY_DEST => {
                return Err(Status::E_INVALIDARG)
            }
            _ => {}
        }
        Ok(self.state.new_resource(heap, desc, initial_state))
    }

    fn create_constant_buffer_view(&self, desc: &ConstantBufferViewDesc, dest: CpuDescriptor) {
        self.state
            .write_descriptor(dest, SoftDescriptor::ConstantBuffer(*desc));
    }

    fn create_shader_resource_view(
        &self,
        resource: &Resource,
        desc: &ShaderResourceViewDesc,
        dest: CpuDescriptor,
    ) {
        self.state.write_descriptor(
            dest,
            SoftDescriptor::ShaderResource {
                resource: resource.downgrade(),
                desc: *desc,
            },
        );
    }

    fn create_unordered_access_view(
        &self,
        resource: &Resource,
        desc: &UnorderedAccessViewDesc,
        dest: CpuDescriptor,
    ) {
        self.state.write_descriptor(
            dest,
            SoftDescriptor::UnorderedAccess {
                resource: resource.downgrade(),
                desc: *desc,
            },
        );
    }

    fn create_render_target_view(
        &self,
        resource: &Resource,
        desc: Option<&RenderTargetViewDesc>,
        dest: CpuDescriptor,
    ) {
        self.state.write_descriptor(
            dest,
            SoftDescriptor::RenderTarget {
                resource: resource.downgrade(),
                desc: desc.copied(),
            },
        );
    }

    fn create_depth_stencil_view(
        &self,
        resource: &Resource,
        desc: &DepthStencilViewDesc,
        dest: CpuDescriptor,
    ) {
        self.state.write_descriptor(
            dest,
            SoftDescriptor::DepthStencil {
                resource: resource.downgrade(),
                desc: *desc,
            },
        );
    }

    fn create_sampler(&self, desc: &SamplerDesc, dest: CpuDescriptor) {
        self.state
            .write_descriptor(dest, SoftDescriptor::Sampler(*desc));
    }

    fn copy_descriptors_simple(
        &self,
        count: u32,
        dest: CpuDescriptor,
        src: CpuDescriptor,
        ty: DescriptorHeapType,
    ) {
        let stride = self.descriptor_increment_size(ty) as usize;
        let mut descriptors = self.state.descriptors.lock();
        for i in 0..count as usize {
            let from = src.ptr + i * stride;
            let to = dest.ptr + i * stride;
            match descriptors.get(&from).cloned() {
                Some(descriptor) => {
                    descriptors.insert(to, descriptor);
                }
                None => {
                    descriptors.remove(&to);
                }
            }
        }
    }

    fn create_command_allocator(&self) -> Result<CommandAllocator, Status> {
        Ok(CommandAllocator(Arc::new(AllocatorInner {
            instance: Arc::clone(&self.state.instance),
            open_lists: AtomicUsize::new(0),
            reset_count: AtomicU64::new(0),
        })))
    }

    fn create_command_list(&self, allocator: &CommandAllocator) -> Result<CommandList, Status> {
        allocator.0.open_lists.fetch_add(1, Ordering::AcqRel);
        Ok(CommandList {
            state: Mutex::new(ListState {
                commands: Vec::new(),
                closed: false,
                allocator: Some(Arc::clone(&allocator.0)),
                name: None,
            }),
        })
    }

    fn create_fence(&self, initial_value: u64) -> Result<Fence, Status> {
        Ok(Fence(Arc::new(FenceInner {
            device: Arc::clone(&self.state),
            value: Mutex::new(initial_value),
            waiters: Mutex::new(Vec::new()),
        })))
    }

    fn create_event(&self) -> Result<Event, Status> {
        Ok(Event::default())
    }

    fn serialize_root_signature(&self, desc: &RootSignatureDesc) -> Result<Vec<u8>, Diagnostic> {
        if desc.parameters.len() > MAX_ROOT_DWORDS {
            return Err(Diagnostic {
                status: Status::E_INVALIDARG,
                message: format!(
                    "root signature uses {} DWORDs, the limit is {MAX_ROOT_DWORDS}",
                    desc.parameters.len()
                ),
            });
        }
        for (index, parameter) in desc.parameters.iter().enumerate() {
            let RootParameter::DescriptorTable { ref ranges, .. } = *parameter;
            if ranges.is_empty() {
                return Err(Diagnostic {
                    status: Status::E_INVALIDARG,
                    message: format!("root parameter {index} is an empty descriptor table"),
                });
            }
            let samplers = ranges
                .iter()
                .filter(|range| range.ty == super::DescriptorRangeType::Sampler)
                .count();
            if samplers != 0 && samplers != ranges.len() {
                return Err(Diagnostic {
                    status: Status::E_INVALIDARG,
                    message: format!(
                        "root parameter {index} mixes sampler and non-sampler ranges"
                    ),
                });
            }
        }
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        self.state.root_signatures.lock().insert(id, desc.clone());
        Ok(id.to_le_bytes().to_vec())
    }

    fn create_root_signature(&self, blob: &[u8]) -> Result<RootSignature, Status> {
        let id = <[u8; 8]>::try_from(blob)
            .map(u64::from_le_bytes)
            .map_err(|_| Status::E_INVALIDARG)?;
        let desc = self
            .state
            .root_signatures
            .lock()
            .get(&id)
            .cloned()
            .ok_or(Status::E_INVALIDARG)?;
        Ok(RootSignature { desc })
    }

    fn create_graphics_pipeline_state(
        &self,
        desc: &GraphicsPipelineDesc<'_, Soft>,
    ) -> Result<PipelineState, Status> {
        if desc.vertex_shader.is_empty() || desc.pixel_shader.map_or(false, |ps| ps.is_empty()) {
            return Err(Status::E_INVALIDARG);
        }
        if desc.blend.len() != desc.rtv_formats.len() {
            return Err(Status::E_INVALIDARG);
        }
        Ok(PipelineState {
            root_signature: desc.root_signature.desc.clone(),
            kind: PipelineKind::Graphics {
                input_layout: desc.input_layout.clone(),
                topology_type: desc.primitive_topology_type,
                rtv_formats: desc.rtv_formats.to_vec(),
                dsv_format: desc.dsv_format,
            },
            name: desc.name.map(str::to_string),
        })
    }

    fn create_compute_pipeline_state(
        &self,
        desc: &ComputePipelineDesc<'_, Soft>,
    ) -> Result<PipelineState, Status> {
        if desc.compute_shader.is_empty() {
            return Err(Status::E_INVALIDARG);
        }
        Ok(PipelineState {
            root_signature: desc.root_signature.desc.clone(),
            kind: PipelineKind::Compute,
            name: desc.name.map(str::to_string),
        })
    }

    fn removed_reason(&self) -> Status {
        if self.state.is_removed() {
            Status::DXGI_ERROR_DEVICE_REMOVED
        } else {
            Status::OK
        }
    }
}

#[derive(Clone, Debug)]
pub struct Queue {
    device: Arc<DeviceState>,
}

impl super::RawQueue<Soft> for Queue {
    fn execute_command_lists(&self, lists: &[&CommandList]) {
        self.device
            .instance
            .record(JournalEntry::ExecuteCommandLists { count: lists.len() });
        if self.device.is_removed() {
            return;
        }
        for list in lists {
            let state = list.state.lock();
            if !state.closed {
                log::error!("Executing a command list that is still recording");
                self.device.removed.store(true, Ordering::Release);
                return;
            }
            for command in state.commands.iter() {
                execute(&self.device, command);
            }
            self.device.update_stats(|stats| stats.command_lists += 1);
        }
    }

    fn signal(&self, fence: &Fence, value: u64) -> Result<(), Status> {
        self.device.instance.record(JournalEntry::Signal { value });
        if self.device.is_removed() {
            return Err(Status::DXGI_ERROR_DEVICE_REMOVED);
        }
        fence.0.signal(value);
        Ok(())
    }
}

struct ResourceInner {
    id: u64,
    desc: ResourceDesc,
    heap: HeapType,
    gpu_address: u64,
    offsets: Vec<usize>,
    size: usize,
    memory: Mutex<Box<[u8]>>,
    states: Mutex<Vec<ResourceStates>>,
    name: Mutex<Option<String>>,
    map_count: AtomicUsize,
}

impl std::fmt::Debug for ResourceInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .field("heap", &self.heap)
            .field("name", &*self.name.lock())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Resource(Arc<ResourceInner>);

impl Resource {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn heap(&self) -> HeapType {
        self.0.heap
    }

    pub fn name(&self) -> Option<String> {
        self.0.name.lock().clone()
    }

    /// Copy of the bytes of one subresource.
    pub fn read_subresource(&self, subresource: u32) -> Vec<u8> {
        let memory = self.0.memory.lock();
        let range = self.subresource_range(subresource as usize);
        memory[range].to_vec()
    }

    /// Tracked state of one subresource, updated by executed barriers.
    pub fn state(&self, subresource: u32) -> ResourceStates {
        self.0.states.lock()[subresource as usize]
    }

    pub fn is_mapped(&self) -> bool {
        self.0.map_count.load(Ordering::Acquire) != 0
    }

    fn subresource_range(&self, index: usize) -> std::ops::Range<usize> {
        let start = self.0.offsets[index];
        let end = self.0.offsets.get(index + 1).copied().unwrap_or(self.0.size);
        start..end
    }

    fn downgrade(&self) -> ResourceRef {
        ResourceRef {
            id: self.0.id,
            weak: Arc::downgrade(&self.0),
        }
    }
}

impl super::RawResource for Resource {
    fn desc(&self) -> ResourceDesc {
        self.0.desc
    }

    fn gpu_virtual_address(&self) -> u64 {
        self.0.gpu_address
    }

    fn map(&self) -> Result<NonNull<u8>, Status> {
        if self.0.heap == HeapType::Default {
            return Err(Status::E_INVALIDARG);
        }
        self.0.map_count.fetch_add(1, Ordering::AcqRel);
        let mut memory = self.0.memory.lock();
        NonNull::new(memory.as_mut_ptr()).ok_or(Status::E_OUTOFMEMORY)
    }

    fn unmap(&self) {
        let _ = self
            .0
            .map_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
    }

    fn set_name(&self, name: &str) {
        *self.0.name.lock() = Some(name.to_string());
    }
}

/// Non-owning reference to a resource, as held by descriptors and command lists.
#[derive(Clone, Debug)]
pub struct ResourceRef {
    id: u64,
    weak: Weak<ResourceInner>,
}

impl ResourceRef {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn upgrade(&self) -> Option<Resource> {
        self.weak.upgrade().map(Resource)
    }
}

impl PartialEq for ResourceRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug)]
pub struct DescriptorHeap {
    ty: DescriptorHeapType,
    cpu_start: CpuDescriptor,
    gpu_start: GpuDescriptor,
    count: u32,
}

impl DescriptorHeap {
    pub fn ty(&self) -> DescriptorHeapType {
        self.ty
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl super::RawDescriptorHeap for DescriptorHeap {
    fn cpu_start(&self) -> CpuDescriptor {
        self.cpu_start
    }

    fn gpu_start(&self) -> GpuDescriptor {
        self.gpu_start
    }
}

#[derive(Debug)]
struct AllocatorInner {
    instance: Arc<InstanceShared>,
    open_lists: AtomicUsize,
    reset_count: AtomicU64,
}

#[derive(Debug)]
pub struct CommandAllocator(Arc<AllocatorInner>);

impl CommandAllocator {
    pub fn reset_count(&self) -> u64 {
        self.0.reset_count.load(Ordering::Acquire)
    }
}

impl super::RawCommandAllocator for CommandAllocator {
    fn reset(&self) -> Result<(), Status> {
        if self.0.open_lists.load(Ordering::Acquire) != 0 {
            log::error!("Command allocator reset while a command list is recording");
            return Err(Status::E_FAIL);
        }
        self.0.reset_count.fetch_add(1, Ordering::AcqRel);
        self.0.instance.record(JournalEntry::ResetCommandAllocator);
        Ok(())
    }
}

/// A command as recorded into a soft command list.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Transition {
        resource: ResourceRef,
        subresource: u32,
        before: ResourceStates,
        after: ResourceStates,
    },
    UavBarrier {
        resource: ResourceRef,
    },
    CopyBuffer {
        dst: ResourceRef,
        dst_offset: u64,
        src: ResourceRef,
        src_offset: u64,
        size: u64,
    },
    CopyTexture {
        dst: CopyLocation,
        dst_origin: crate::Origin3d,
        src: CopyLocation,
        src_box: Option<CopyBox>,
    },
    ClearRenderTarget {
        rtv: CpuDescriptor,
        color: [f32; 4],
    },
    ClearDepthStencil {
        dsv: CpuDescriptor,
        depth: Option<f32>,
        stencil: Option<u8>,
    },
    SetRenderTargets {
        rtvs: Vec<CpuDescriptor>,
        dsv: Option<CpuDescriptor>,
    },
    SetViewports(Vec<Viewport>),
    SetScissorRects(Vec<Rect>),
    SetBlendFactor([f32; 4]),
    SetStencilRef(u32),
    SetDescriptorHeaps(Vec<DescriptorHeapType>),
    SetRootSignature {
        compute: bool,
        parameters: usize,
    },
    SetRootDescriptorTable {
        compute: bool,
        index: u32,
        base: GpuDescriptor,
    },
    SetPipelineState {
        compute: bool,
    },
    SetPrimitiveTopology(PrimitiveTopology),
    SetVertexBuffers {
        start_slot: u32,
        views: Vec<VertexBufferView>,
    },
    SetIndexBuffer(IndexBufferView),
    Draw {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
    Dispatch([u32; 3]),
    BeginEvent(String),
    EndEvent,
    SetMarker(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum CopyLocation {
    Subresource(ResourceRef, u32),
    Footprint(ResourceRef, super::PlacedFootprint),
}

impl CopyLocation {
    fn from_native(location: &TextureCopyLocation<'_, Soft>) -> Self {
        match *location {
            TextureCopyLocation::Subresource(resource, index) => {
                Self::Subresource(resource.downgrade(), index)
            }
            TextureCopyLocation::PlacedFootprint(resource, footprint) => {
                Self::Footprint(resource.downgrade(), footprint)
            }
        }
    }
}

#[derive(Debug)]
struct ListState {
    commands: Vec<Command>,
    closed: bool,
    allocator: Option<Arc<AllocatorInner>>,
    name: Option<String>,
}

#[derive(Debug)]
pub struct CommandList {
    state: Mutex<ListState>,
}

impl CommandList {
    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    pub fn name(&self) -> Option<String> {
        self.state.lock().name.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn push(&self, command: Command) {
        let mut state = self.state.lock();
        if state.closed {
            log::error!("Recording {command:?} into a closed command list");
            return;
        }
        state.commands.push(command);
    }
}

impl super::RawCommandList<Soft> for CommandList {
    fn reset(&self, allocator: &CommandAllocator) -> Result<(), Status> {
        let mut state = self.state.lock();
        if !state.closed {
            return Err(Status::E_FAIL);
        }
        allocator.0.open_lists.fetch_add(1, Ordering::AcqRel);
        state.commands.clear();
        state.closed = false;
        state.allocator = Some(Arc::clone(&allocator.0));
        Ok(())
    }

    fn close(&self) -> Result<(), Status> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Status::E_FAIL);
        }
        state.closed = true;
        if let Some(allocator) = state.allocator.take() {
            allocator.open_lists.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(())
    }

    fn set_name(&self, name: &str) {
        self.state.lock().name = Some(name.to_string());
    }

    fn resource_barrier(&self, barriers: &[Barrier<'_, Soft>]) {
        for barrier in barriers {
            self.push(match *barrier {
                Barrier::Transition {
                    resource,
                    subresource,
                    before,
                    after,
                } => Command::Transition {
                    resource: resource.downgrade(),
                    subresource,
                    before,
                    after,
                },
                Barrier::Uav { resource } => Command::UavBarrier {
                    resource: resource.downgrade(),
                },
            });
        }
    }

    fn copy_buffer_region(
        &self,
        dst: &Resource,
        dst_offset: u64,
        src: &Resource,
        src_offset: u64,
        size: u64,
    ) {
        self.push(Command::CopyBuffer {
            dst: dst.downgrade(),
            dst_offset,
            src: src.downgrade(),
            src_offset,
            size,
        });
    }

    fn copy_texture_region(
        &self,
        dst: &TextureCopyLocation<'_, Soft>,
        dst_origin: crate::Origin3d,
        src: &TextureCopyLocation<'_, Soft>,
        src_box: Option<&CopyBox>,
    ) {
        self.push(Command::CopyTexture {
            dst: CopyLocation::from_native(dst),
            dst_origin,
            src: CopyLocation::from_native(src),
            src_box: src_box.copied(),
        });
    }

    fn clear_render_target_view(&self, rtv: CpuDescriptor, color: [f32; 4]) {
        self.push(Command::ClearRenderTarget { rtv, color });
    }

    fn clear_depth_stencil_view(
        &self,
        dsv: CpuDescriptor,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) {
        self.push(Command::ClearDepthStencil {
            dsv,
            depth,
            stencil,
        });
    }

    fn om_set_render_targets(&self, rtvs: &[CpuDescriptor], dsv: Option<CpuDescriptor>) {
        self.push(Command::SetRenderTargets {
            rtvs: rtvs.to_vec(),
            dsv,
        });
    }

    fn rs_set_viewports(&self, viewports: &[Viewport]) {
        self.push(Command::SetViewports(viewports.to_vec()));
    }

    fn rs_set_scissor_rects(&self, rects: &[Rect]) {
        self.push(Command::SetScissorRects(rects.to_vec()));
    }

    fn om_set_blend_factor(&self, factor: [f32; 4]) {
        self.push(Command::SetBlendFactor(factor));
    }

    fn om_set_stencil_ref(&self, value: u32) {
        self.push(Command::SetStencilRef(value));
    }

    fn set_descriptor_heaps(&self, heaps: &[&DescriptorHeap]) {
        self.push(Command::SetDescriptorHeaps(
            heaps.iter().map(|heap| heap.ty).collect(),
        ));
    }

    fn set_graphics_root_signature(&self, signature: &RootSignature) {
        self.push(Command::SetRootSignature {
            compute: false,
            parameters: signature.desc.parameters.len(),
        });
    }

    fn set_compute_root_signature(&self, signature: &RootSignature) {
        self.push(Command::SetRootSignature {
            compute: true,
            parameters: signature.desc.parameters.len(),
        });
    }

    fn set_graphics_root_descriptor_table(&self, index: u32, base: GpuDescriptor) {
        self.push(Command::SetRootDescriptorTable {
            compute: false,
            index,
            base,
        });
    }

    fn set_compute_root_descriptor_table(&self, index: u32, base: GpuDescriptor) {
        self.push(Command::SetRootDescriptorTable {
            compute: true,
            index,
            base,
        });
    }

    fn set_pipeline_state(&self, pipeline: &PipelineState) {
        self.push(Command::SetPipelineState {
            compute: matches!(pipeline.kind, PipelineKind::Compute),
        });
    }

    fn ia_set_primitive_topology(&self, topology: PrimitiveTopology) {
        self.push(Command::SetPrimitiveTopology(topology));
    }

    fn ia_set_vertex_buffers(&self, start_slot: u32, views: &[VertexBufferView]) {
        self.push(Command::SetVertexBuffers {
            start_slot,
            views: views.to_vec(),
        });
    }

    fn ia_set_index_buffer(&self, view: &IndexBufferView) {
        self.push(Command::SetIndexBuffer(*view));
    }

    fn draw_instanced(
        &self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) {
        self.push(Command::Draw {
            vertex_count,
            instance_count,
            start_vertex,
            start_instance,
        });
    }

    fn draw_indexed_instanced(
        &self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        self.push(Command::DrawIndexed {
            index_count,
            instance_count,
            start_index,
            base_vertex,
            start_instance,
        });
    }

    fn dispatch(&self, x: u32, y: u32, z: u32) {
        self.push(Command::Dispatch([x, y, z]));
    }

    fn begin_event(&self, name: &str) {
        self.push(Command::BeginEvent(name.to_string()));
    }

    fn end_event(&self) {
        self.push(Command::EndEvent);
    }

    fn set_marker(&self, name: &str) {
        self.push(Command::SetMarker(name.to_string()));
    }
}

#[derive(Debug)]
struct FenceInner {
    device: Arc<DeviceState>,
    value: Mutex<u64>,
    waiters: Mutex<Vec<(u64, Event)>>,
}

impl FenceInner {
    fn signal(&self, value: u64) {
        *self.value.lock() = value;
        self.waiters.lock().retain(|&(target, ref event)| {
            if target <= value {
                event.set();
                false
            } else {
                true
            }
        });
    }
}

#[derive(Debug)]
pub struct Fence(Arc<FenceInner>);

impl super::RawFence<Soft> for Fence {
    fn completed_value(&self) -> u64 {
        if self.0.device.is_removed() {
            u64::MAX
        } else {
            *self.0.value.lock()
        }
    }

    fn set_event_on_completion(&self, value: u64, event: &Event) -> Result<(), Status> {
        self.0
            .device
            .instance
            .record(JournalEntry::SetEventOnCompletion { value });
        if self.0.device.is_removed() || *self.0.value.lock() >= value {
            event.set();
        } else {
            self.0.waiters.lock().push((value, event.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct EventInner {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

/// Auto-reset event.
#[derive(Clone, Debug, Default)]
pub struct Event(Arc<EventInner>);

impl Event {
    fn set(&self) {
        *self.0.signaled.lock() = true;
        self.0.condvar.notify_all();
    }
}

impl super::RawEvent for Event {
    fn wait(&self, timeout_ms: u32) -> WaitStatus {
        let mut signaled = self.0.signaled.lock();
        if timeout_ms == INFINITE {
            while !*signaled {
                self.0.condvar.wait(&mut signaled);
            }
        } else if !*signaled {
            let timeout = Duration::from_millis(timeout_ms as u64);
            // Spurious wakeups end the wait early; callers loop on the remaining time.
            let _ = self.0.condvar.wait_for(&mut signaled, timeout);
        }
        if *signaled {
            *signaled = false;
            WaitStatus::Signaled
        } else {
            WaitStatus::Timeout
        }
    }
}

#[derive(Debug)]
pub struct RootSignature {
    desc: RootSignatureDesc,
}

impl RootSignature {
    pub fn desc(&self) -> &RootSignatureDesc {
        &self.desc
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineKind {
    Graphics {
        input_layout: Vec<InputElement>,
        topology_type: PrimitiveTopologyType,
        rtv_formats: Vec<Format>,
        dsv_format: Format,
    },
    Compute,
}

#[derive(Debug)]
pub struct PipelineState {
    root_signature: RootSignatureDesc,
    kind: PipelineKind,
    name: Option<String>,
}

impl PipelineState {
    pub fn kind(&self) -> &PipelineKind {
        &self.kind
    }

    pub fn root_signature(&self) -> &RootSignatureDesc {
        &self.root_signature
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[derive(Debug)]
struct SwapChainState {
    desc: SwapChainDesc,
    buffers: Vec<Resource>,
    current: u32,
}

#[derive(Debug)]
pub struct SwapChain {
    instance: Arc<InstanceShared>,
    device: Arc<DeviceState>,
    state: Mutex<SwapChainState>,
}

impl SwapChain {
    pub fn desc(&self) -> SwapChainDesc {
        self.state.lock().desc
    }
}

impl super::RawSwapChain<Soft> for SwapChain {
    fn buffer(&self, index: u32) -> Result<Resource, Status> {
        self.state
            .lock()
            .buffers
            .get(index as usize)
            .cloned()
            .ok_or(Status::DXGI_ERROR_INVALID_CALL)
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.state.lock().current
    }

    fn resize_buffers(
        &self,
        buffer_count: u32,
        width: u32,
        height: u32,
        format: Format,
        flags: SwapChainFlags,
    ) -> Result<(), Status> {
        let mut state = self.state.lock();
        // Outstanding references to the back buffers make DXGI refuse the resize.
        if state
            .buffers
            .iter()
            .any(|buffer| Arc::strong_count(&buffer.0) > 1)
        {
            log::error!("ResizeBuffers called with back buffers still referenced");
            return Err(Status::DXGI_ERROR_INVALID_CALL);
        }
        if flags.contains(SwapChainFlags::ALLOW_TEARING)
            != state.desc.flags.contains(SwapChainFlags::ALLOW_TEARING)
        {
            return Err(Status::DXGI_ERROR_INVALID_CALL);
        }
        let mut desc = state.desc;
        if buffer_count != 0 {
            desc.buffer_count = buffer_count;
        }
        if width != 0 {
            desc.width = width;
        }
        if height != 0 {
            desc.height = height;
        }
        if format != Format::UNKNOWN {
            desc.format = format;
        }
        desc.flags = flags;
        self.instance.record(JournalEntry::ResizeBuffers {
            buffer_count: desc.buffer_count,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
        state.buffers = self.device.create_back_buffers(&desc);
        state.desc = desc;
        state.current = 0;
        Ok(())
    }

    fn present(&self, sync_interval: u32, flags: PresentFlags) -> Status {
        self.instance.record(JournalEntry::Present {
            sync_interval,
            flags,
        });
        if self.device.is_removed() {
            return Status::DXGI_ERROR_DEVICE_REMOVED;
        }
        let mut state = self.state.lock();
        if flags.contains(PresentFlags::ALLOW_TEARING)
            && (sync_interval != 0 || !state.desc.flags.contains(SwapChainFlags::ALLOW_TEARING))
        {
            return Status::DXGI_ERROR_INVALID_CALL;
        }
        state.current = (state.current + 1) % state.desc.buffer_count;
        Status::OK
    }
}

fn format_block_size(format: Format) -> Option<u32> {
    Some(match format {
        Format::R8_UNORM => 1,
        Format::R8G8_UNORM
        | Format::R16_FLOAT
        | Format::R16_UNORM
        | Format::R16_UINT
        | Format::R16_TYPELESS
        | Format::D16_UNORM => 2,
        Format::R8G8B8A8_UNORM
        | Format::R8G8B8A8_UNORM_SRGB
        | Format::R8G8B8A8_UINT
        | Format::B8G8R8A8_UNORM
        | Format::B8G8R8A8_UNORM_SRGB
        | Format::R10G10B10A2_UNORM
        | Format::R16G16_FLOAT
        | Format::R32_FLOAT
        | Format::R32_UINT
        | Format::R32_TYPELESS
        | Format::D32_FLOAT
        | Format::R24G8_TYPELESS
        | Format::D24_UNORM_S8_UINT
        | Format::R24_UNORM_X8_TYPELESS => 4,
        Format::R16G16B16A16_FLOAT
        | Format::R32G32_FLOAT
        | Format::R32G32_UINT
        | Format::R32G8X24_TYPELESS
        | Format::D32_FLOAT_S8X24_UINT
        | Format::R32_FLOAT_X8X24_TYPELESS => 8,
        Format::R32G32B32_FLOAT => 12,
        Format::R32G32B32A32_FLOAT | Format::R32G32B32A32_UINT => 16,
        _ => return None,
    })
}

fn subresource_extent(desc: &ResourceDesc, mip: u32) -> (u32, u32, u32) {
    let width = ((desc.width >> mip) as u32).max(1);
    let height = match desc.dimension {
        ResourceDimension::Texture1D => 1,
        _ => (desc.height >> mip).max(1),
    };
    let depth = match desc.dimension {
        ResourceDimension::Texture3D => ((desc.depth_or_array_size as u32) >> mip).max(1),
        _ => 1,
    };
    (width, height, depth)
}

fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xFF) as i32 - 127 + 15;
    let mantissa = bits & 0x7F_FFFF;
    if exponent <= 0 {
        sign
    } else if exponent >= 0x1F {
        sign | 0x7C00
    } else {
        sign | ((exponent as u16) << 10) | (mantissa >> 13) as u16
    }
}

fn linear_to_srgb(value: f32) -> f32 {
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn encode_color(format: Format, color: [f32; 4]) -> Option<Vec<u8>> {
    let [r, g, b, a] = color;
    Some(match format {
        Format::R8G8B8A8_UNORM => vec![unorm8(r), unorm8(g), unorm8(b), unorm8(a)],
        Format::R8G8B8A8_UNORM_SRGB => vec![
            unorm8(linear_to_srgb(r)),
            unorm8(linear_to_srgb(g)),
            unorm8(linear_to_srgb(b)),
            unorm8(a),
        ],
        Format::B8G8R8A8_UNORM => vec![unorm8(b), unorm8(g), unorm8(r), unorm8(a)],
        Format::B8G8R8A8_UNORM_SRGB => vec![
            unorm8(linear_to_srgb(b)),
            unorm8(linear_to_srgb(g)),
            unorm8(linear_to_srgb(r)),
            unorm8(a),
        ],
        Format::R8G8B8A8_UINT => vec![r as u8, g as u8, b as u8, a as u8],
        Format::R8_UNORM => vec![unorm8(r)],
        Format::R8G8_UNORM => vec![unorm8(r), unorm8(g)],
        Format::R10G10B10A2_UNORM => {
            let ten = |v: f32| (v.clamp(0.0, 1.0) * 1023.0).round() as u32;
            let two = (a.clamp(0.0, 1.0) * 3.0).round() as u32;
            (ten(r) | ten(g) << 10 | ten(b) << 20 | two << 30)
                .to_le_bytes()
                .to_vec()
        }
        Format::R16_FLOAT => f32_to_f16(r).to_le_bytes().to_vec(),
        Format::R16G16_FLOAT => [r, g]
            .iter()
            .flat_map(|&v| f32_to_f16(v).to_le_bytes())
            .collect(),
        Format::R16G16B16A16_FLOAT => color
            .iter()
            .flat_map(|&v| f32_to_f16(v).to_le_bytes())
            .collect(),
        Format::R32_FLOAT => r.to_le_bytes().to_vec(),
        Format::R32_UINT => (r as u32).to_le_bytes().to_vec(),
        Format::R32G32_FLOAT => [r, g].iter().flat_map(|v| v.to_le_bytes()).collect(),
        Format::R32G32_UINT => [r, g]
            .iter()
            .flat_map(|&v| (v as u32).to_le_bytes())
            .collect(),
        Format::R32G32B32A32_FLOAT => color.iter().flat_map(|v| v.to_le_bytes()).collect(),
        Format::R32G32B32A32_UINT => color
            .iter()
            .flat_map(|&v| (v as u32).to_le_bytes())
            .collect(),
        _ => return None,
    })
}

fn write_depth_stencil(format: Format, texel: &mut [u8], depth: Option<f32>, stencil: Option<u8>) {
    match format {
        Format::D32_FLOAT | Format::R32_TYPELESS => {
            if let Some(depth) = depth {
                texel.copy_from_slice(&depth.to_le_bytes());
            }
        }
        Format::D16_UNORM | Format::R16_TYPELESS => {
            if let Some(depth) = depth {
                let value = (depth.clamp(0.0, 1.0) * 65535.0).round() as u16;
                texel.copy_from_slice(&value.to_le_bytes());
            }
        }
        Format::D24_UNORM_S8_UINT | Format::R24G8_TYPELESS => {
            let mut value = u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
            if let Some(depth) = depth {
                let d = (depth.clamp(0.0, 1.0) * 16_777_215.0).round() as u32;
                value = (value & 0xFF00_0000) | d;
            }
            if let Some(stencil) = stencil {
                value = (value & 0x00FF_FFFF) | (stencil as u32) << 24;
            }
            texel.copy_from_slice(&value.to_le_bytes());
        }
        Format::D32_FLOAT_S8X24_UINT | Format::R32G8X24_TYPELESS => {
            if let Some(depth) = depth {
                texel[..4].copy_from_slice(&depth.to_le_bytes());
            }
            if let Some(stencil) = stencil {
                texel[4] = stencil;
            }
        }
        _ => log::warn!("Soft device cannot clear depth format {format:?}"),
    }
}

/// Linear addressing of a copy source or destination.
struct Region {
    resource: Resource,
    offset: usize,
    row_pitch: usize,
    slice_pitch: usize,
    texel: usize,
    extent: (u32, u32, u32),
}

impl Region {
    fn resolve(location: &CopyLocation) -> Option<Self> {
        match *location {
            CopyLocation::Subresource(ref resource, index) => {
                let resource = resource.upgrade()?;
                let desc = resource.0.desc;
                let mips = desc.mip_levels.max(1) as u32;
                let (w, h, d) = subresource_extent(&desc, index % mips);
                let texel = format_block_size(desc.format)? as usize;
                Some(Self {
                    offset: *resource.0.offsets.get(index as usize)?,
                    row_pitch: w as usize * texel,
                    slice_pitch: (w * h) as usize * texel,
                    texel,
                    extent: (w, h, d),
                    resource,
                })
            }
            CopyLocation::Footprint(ref resource, placed) => {
                let footprint = placed.footprint;
                let texel = format_block_size(footprint.format)? as usize;
                Some(Self {
                    resource: resource.upgrade()?,
                    offset: placed.offset as usize,
                    row_pitch: footprint.row_pitch as usize,
                    slice_pitch: footprint.row_pitch as usize * footprint.height as usize,
                    texel,
                    extent: (footprint.width, footprint.height, footprint.depth),
                })
            }
        }
    }

    fn row_start(&self, x: u32, y: u32, z: u32) -> usize {
        self.offset + z as usize * self.slice_pitch + y as usize * self.row_pitch
            + x as usize * self.texel
    }
}

fn execute(device: &DeviceState, command: &Command) {
    match *command {
        Command::Transition {
            ref resource,
            subresource,
            before,
            after,
        } => {
            device.update_stats(|stats| stats.barriers += 1);
            let Some(resource) = resource.upgrade() else {
                return;
            };
            let mut states = resource.0.states.lock();
            let range = if subresource == ALL_SUBRESOURCES {
                0..states.len()
            } else {
                subresource as usize..subresource as usize + 1
            };
            let Some(states) = states.get_mut(range) else {
                log::error!(
                    "Barrier on subresource {subresource} of resource {} is out of range",
                    resource.0.id
                );
                return;
            };
            for state in states.iter_mut() {
                if *state != before {
                    log::warn!(
                        "Barrier on resource {} expects {before:?}, tracked state is {:?}",
                        resource.0.id,
                        *state
                    );
                    device.update_stats(|stats| stats.barrier_mismatches += 1);
                }
                *state = after;
            }
        }
        Command::UavBarrier { .. } => device.update_stats(|stats| stats.barriers += 1),
        Command::CopyBuffer {
            ref dst,
            dst_offset,
            ref src,
            src_offset,
            size,
        } => {
            let (Some(dst), Some(src)) = (dst.upgrade(), src.upgrade()) else {
                return;
            };
            let (src_offset, dst_offset, size) =
                (src_offset as usize, dst_offset as usize, size as usize);
            let bytes = {
                let memory = src.0.memory.lock();
                match memory.get(src_offset..src_offset + size) {
                    Some(bytes) => bytes.to_vec(),
                    None => {
                        log::error!("CopyBufferRegion reads past the end of the source");
                        return;
                    }
                }
            };
            let mut memory = dst.0.memory.lock();
            match memory.get_mut(dst_offset..dst_offset + size) {
                Some(target) => target.copy_from_slice(&bytes),
                None => log::error!("CopyBufferRegion writes past the end of the destination"),
            }
            device.update_stats(|stats| stats.copies += 1);
        }
        Command::CopyTexture {
            ref dst,
            dst_origin,
            ref src,
            src_box,
        } => {
            let (Some(dst), Some(src)) = (Region::resolve(dst), Region::resolve(src)) else {
                log::error!("CopyTextureRegion with an unresolvable location");
                return;
            };
            let copy_box = src_box.unwrap_or(CopyBox {
                left: 0,
                top: 0,
                front: 0,
                right: src.extent.0,
                bottom: src.extent.1,
                back: src.extent.2,
            });
            let row_bytes = (copy_box.right - copy_box.left) as usize * src.texel;
            let mut staging = Vec::new();
            {
                let memory = src.resource.0.memory.lock();
                for z in copy_box.front..copy_box.back {
                    for y in copy_box.top..copy_box.bottom {
                        let start = src.row_start(copy_box.left, y, z);
                        match memory.get(start..start + row_bytes) {
                            Some(row) => staging.extend_from_slice(row),
                            None => {
                                log::error!("CopyTextureRegion reads out of bounds");
                                return;
                            }
                        }
                    }
                }
            }
            let mut memory = dst.resource.0.memory.lock();
            let mut rows = staging.chunks(row_bytes.max(1));
            for z in 0..copy_box.back - copy_box.front {
                for y in 0..copy_box.bottom - copy_box.top {
                    let start = dst.row_start(dst_origin.x, dst_origin.y + y, dst_origin.z + z);
                    let (Some(row), Some(target)) =
                        (rows.next(), memory.get_mut(start..start + row_bytes))
                    else {
                        log::error!("CopyTextureRegion writes out of bounds");
                        return;
                    };
                    target.copy_from_slice(row);
                }
            }
            device.update_stats(|stats| stats.copies += 1);
        }
        Command::ClearRenderTarget { rtv, color } => {
            let Some(SoftDescriptor::RenderTarget { resource, desc }) = device.descriptor(rtv.ptr)
            else {
                log::error!("ClearRenderTargetView on a handle without a render target view");
                return;
            };
            let Some(resource) = resource.upgrade() else {
                return;
            };
            let resource_desc = resource.0.desc;
            let format = desc.map_or(resource_desc.format, |desc| desc.format);
            let Some(texel) = encode_color(format, color) else {
                log::warn!("Soft device cannot clear color format {format:?}");
                return;
            };
            let mips = resource_desc.mip_levels.max(1) as u32;
            let (mip, layers) = match desc.map(|desc| desc.dimension) {
                None | Some(RtvDimension::Texture2DMs) => (0, 0..1),
                Some(RtvDimension::Texture1D { mip_slice })
                | Some(RtvDimension::Texture2D { mip_slice })
                | Some(RtvDimension::Texture3D { mip_slice, .. }) => (mip_slice, 0..1),
                Some(RtvDimension::Texture2DArray {
                    mip_slice,
                    first_array_slice,
                    array_size,
                }) => (mip_slice, first_array_slice..first_array_slice + array_size),
            };
            for layer in layers {
                let range = resource.subresource_range((mip + layer * mips) as usize);
                let mut memory = resource.0.memory.lock();
                for chunk in memory[range].chunks_exact_mut(texel.len()) {
                    chunk.copy_from_slice(&texel);
                }
            }
            device.update_stats(|stats| stats.clears += 1);
        }
        Command::ClearDepthStencil {
            dsv,
            depth,
            stencil,
        } => {
            let Some(SoftDescriptor::DepthStencil { resource, desc }) = device.descriptor(dsv.ptr)
            else {
                log::error!("ClearDepthStencilView on a handle without a depth stencil view");
                return;
            };
            let Some(resource) = resource.upgrade() else {
                return;
            };
            let mips = resource.0.desc.mip_levels.max(1) as u32;
            let (mip, layers) = match desc.dimension {
                DsvDimension::Texture2DMs => (0, 0..1),
                DsvDimension::Texture1D { mip_slice } | DsvDimension::Texture2D { mip_slice } => {
                    (mip_slice, 0..1)
                }
                DsvDimension::Texture2DArray {
                    mip_slice,
                    first_array_slice,
                    array_size,
                } => (mip_slice, first_array_slice..first_array_slice + array_size),
            };
            let texel = format_block_size(desc.format).unwrap_or(4) as usize;
            for layer in layers {
                let range = resource.subresource_range((mip + layer * mips) as usize);
                let mut memory = resource.0.memory.lock();
                for chunk in memory[range].chunks_exact_mut(texel) {
                    write_depth_stencil(desc.format, chunk, depth, stencil);
                }
            }
            device.update_stats(|stats| stats.clears += 1);
        }
        Command::Draw { .. } | Command::DrawIndexed { .. } => {
            device.update_stats(|stats| stats.draws += 1)
        }
        Command::Dispatch(_) => device.update_stats(|stats| stats.dispatches += 1),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_float_encoding() {
        assert_eq!(f32_to_f16(1.0), 0x3C00);
        assert_eq!(f32_to_f16(0.0), 0);
        assert_eq!(f32_to_f16(-2.0), 0xC000);
    }

    #[test]
    fn color_encoding_swizzles_bgra() {
        assert_eq!(
            encode_color(Format::B8G8R8A8_UNORM, [1.0, 0.0, 0.0, 1.0]),
            Some(vec![0, 0, 255, 255])
        );
        assert_eq!(encode_color(Format::UNKNOWN, [0.0; 4]), None);
    }

    #[test]
    fn event_times_out_without_signal() {
        let event = Event::default();
        assert_eq!(super::super::RawEvent::wait(&event, 1), WaitStatus::Timeout);
        event.set();
        assert_eq!(super::super::RawEvent::wait(&event, 1), WaitStatus::Signaled);
        // Auto-reset.
        assert_eq!(super::super::RawEvent::wait(&event, 0), WaitStatus::Timeout);
    }
}
