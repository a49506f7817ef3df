/*!
# Native call surface.

Every call the backend makes into Direct3D 12 or DXGI goes through the traits
in this module. [`Native`] bundles one associated type per native interface;
[`d3d12`] binds them to the real runtime and [`soft`] implements them on the CPU.

Fallible calls return [`Status`], an HRESULT-style code. Descriptor handles are
plain addresses, as they are in the native API.
!*/

#[cfg(windows)]
pub mod d3d12;
pub mod soft;

use std::{fmt, ptr::NonNull};

use arrayvec::ArrayVec;
use bitflags::bitflags;

/// HRESULT-style status code of a native call.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Self = Self(0);
    pub const E_FAIL: Self = Self(0x8000_4005_u32 as i32);
    pub const E_INVALIDARG: Self = Self(0x8007_0057_u32 as i32);
    pub const E_OUTOFMEMORY: Self = Self(0x8007_000E_u32 as i32);
    pub const DXGI_ERROR_INVALID_CALL: Self = Self(0x887A_0001_u32 as i32);
    pub const DXGI_ERROR_DEVICE_REMOVED: Self = Self(0x887A_0005_u32 as i32);
    pub const DXGI_ERROR_DEVICE_HUNG: Self = Self(0x887A_0006_u32 as i32);
    pub const DXGI_ERROR_DEVICE_RESET: Self = Self(0x887A_0007_u32 as i32);

    pub fn is_ok(self) -> bool {
        self.0 >= 0
    }

    pub fn is_device_lost(self) -> bool {
        self == Self::DXGI_ERROR_DEVICE_REMOVED
            || self == Self::DXGI_ERROR_DEVICE_HUNG
            || self == Self::DXGI_ERROR_DEVICE_RESET
    }

    pub fn ok(self) -> Result<(), Status> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status(0x{:08X})", self.0 as u32)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::OK => "S_OK",
            Self::E_FAIL => "E_FAIL",
            Self::E_INVALIDARG => "E_INVALIDARG",
            Self::E_OUTOFMEMORY => "E_OUTOFMEMORY",
            Self::DXGI_ERROR_INVALID_CALL => "DXGI_ERROR_INVALID_CALL",
            Self::DXGI_ERROR_DEVICE_REMOVED => "DXGI_ERROR_DEVICE_REMOVED",
            Self::DXGI_ERROR_DEVICE_HUNG => "DXGI_ERROR_DEVICE_HUNG",
            Self::DXGI_ERROR_DEVICE_RESET => "DXGI_ERROR_DEVICE_RESET",
            _ => return write!(f, "0x{:08X}", self.0 as u32),
        };
        f.write_str(name)
    }
}

pub(crate) trait NativeResultExt<T> {
    fn into_device_result(self, call: &'static str) -> Result<T, crate::DeviceError>;
}

impl<T> NativeResultExt<T> for Result<T, Status> {
    fn into_device_result(self, call: &'static str) -> Result<T, crate::DeviceError> {
        self.map_err(|status| {
            if status.is_device_lost() {
                log::error!("{call} failed: device lost ({status})");
                crate::DeviceError::Lost
            } else {
                log::error!("{call} failed: {status}");
                crate::DeviceError::NativeCallFailed { call, status }
            }
        })
    }
}

/// Diagnostic produced by a failed native compile or serialization.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub status: Status,
    pub message: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuDescriptor {
    pub ptr: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuDescriptor {
    pub ptr: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    CbvSrvUav,
    Sampler,
    Rtv,
    Dsv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeapType {
    Default,
    Upload,
    Readback,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ResourceStates: u32 {
        const COMMON = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const GENERIC_READ = 0x1 | 0x2 | 0x40 | 0x80 | 0x200 | 0x800;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ResourceFlags: u32 {
        const ALLOW_RENDER_TARGET = 0x1;
        const ALLOW_DEPTH_STENCIL = 0x2;
        const ALLOW_UNORDERED_ACCESS = 0x4;
        const DENY_SHADER_RESOURCE = 0x8;
    }
}

/// DXGI format code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Format(pub u32);

impl Format {
    pub const UNKNOWN: Self = Self(0);
    pub const R32G32B32A32_FLOAT: Self = Self(2);
    pub const R32G32B32A32_UINT: Self = Self(3);
    pub const R32G32B32_FLOAT: Self = Self(6);
    pub const R16G16B16A16_FLOAT: Self = Self(10);
    pub const R32G32_FLOAT: Self = Self(16);
    pub const R32G32_UINT: Self = Self(17);
    pub const R32G8X24_TYPELESS: Self = Self(19);
    pub const D32_FLOAT_S8X24_UINT: Self = Self(20);
    pub const R32_FLOAT_X8X24_TYPELESS: Self = Self(21);
    pub const R10G10B10A2_UNORM: Self = Self(24);
    pub const R8G8B8A8_UNORM: Self = Self(28);
    pub const R8G8B8A8_UNORM_SRGB: Self = Self(29);
    pub const R8G8B8A8_UINT: Self = Self(30);
    pub const R16G16_FLOAT: Self = Self(34);
    pub const R32_TYPELESS: Self = Self(39);
    pub const D32_FLOAT: Self = Self(40);
    pub const R32_FLOAT: Self = Self(41);
    pub const R32_UINT: Self = Self(42);
    pub const R24G8_TYPELESS: Self = Self(44);
    pub const D24_UNORM_S8_UINT: Self = Self(45);
    pub const R24_UNORM_X8_TYPELESS: Self = Self(46);
    pub const R8G8_UNORM: Self = Self(49);
    pub const R16_TYPELESS: Self = Self(53);
    pub const R16_FLOAT: Self = Self(54);
    pub const D16_UNORM: Self = Self(55);
    pub const R16_UNORM: Self = Self(56);
    pub const R8_UNORM: Self = Self(61);
    pub const B8G8R8A8_UNORM: Self = Self(87);
    pub const B8G8R8A8_UNORM_SRGB: Self = Self(91);
    pub const R16_UINT: Self = Self(57);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceDimension {
    Buffer,
    Texture1D,
    Texture2D,
    Texture3D,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceDesc {
    pub dimension: ResourceDimension,
    pub width: u64,
    pub height: u32,
    pub depth_or_array_size: u16,
    pub mip_levels: u16,
    pub format: Format,
    pub sample_count: u32,
    pub flags: ResourceFlags,
}

impl ResourceDesc {
    pub fn buffer(size: u64, flags: ResourceFlags) -> Self {
        Self {
            dimension: ResourceDimension::Buffer,
            width: size,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            format: Format::UNKNOWN,
            sample_count: 1,
            flags,
        }
    }

    pub fn array_size(&self) -> u32 {
        match self.dimension {
            ResourceDimension::Texture3D | ResourceDimension::Buffer => 1,
            _ => self.depth_or_array_size as u32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    Color(Format, [f32; 4]),
    DepthStencil(Format, f32, u8),
}

pub const ALL_SUBRESOURCES: u32 = 0xFFFF_FFFF;
pub const TEXTURE_DATA_PITCH_ALIGNMENT: u32 = 256;
pub const TEXTURE_DATA_PLACEMENT_ALIGNMENT: u64 = 512;

pub enum Barrier<'a, N: Native> {
    Transition {
        resource: &'a N::Resource,
        subresource: u32,
        before: ResourceStates,
        after: ResourceStates,
    },
    Uav {
        resource: &'a N::Resource,
    },
}

impl<N: Native> Clone for Barrier<'_, N> {
    fn clone(&self) -> Self {
        match *self {
            Self::Transition {
                resource,
                subresource,
                before,
                after,
            } => Self::Transition {
                resource,
                subresource,
                before,
                after,
            },
            Self::Uav { resource } => Self::Uav { resource },
        }
    }
}

impl<N: Native> fmt::Debug for Barrier<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Transition {
                subresource,
                before,
                after,
                ..
            } => f
                .debug_struct("Transition")
                .field("subresource", &subresource)
                .field("before", &before)
                .field("after", &after)
                .finish(),
            Self::Uav { .. } => f.write_str("Uav"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantBufferViewDesc {
    pub buffer_location: u64,
    pub size_in_bytes: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SrvDimension {
    /// Raw (byte address) buffer view, in 32-bit elements.
    RawBuffer { first_element: u64, num_elements: u32 },
    Texture1D { most_detailed_mip: u32, mip_levels: u32 },
    Texture2D { most_detailed_mip: u32, mip_levels: u32 },
    Texture2DArray {
        most_detailed_mip: u32,
        mip_levels: u32,
        first_array_slice: u32,
        array_size: u32,
    },
    Texture2DMs,
    TextureCube { most_detailed_mip: u32, mip_levels: u32 },
    TextureCubeArray {
        most_detailed_mip: u32,
        mip_levels: u32,
        first_2d_array_face: u32,
        num_cubes: u32,
    },
    Texture3D { most_detailed_mip: u32, mip_levels: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderResourceViewDesc {
    pub format: Format,
    pub dimension: SrvDimension,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UavDimension {
    RawBuffer { first_element: u64, num_elements: u32 },
    Texture1D { mip_slice: u32 },
    Texture2D { mip_slice: u32 },
    Texture2DArray { mip_slice: u32, first_array_slice: u32, array_size: u32 },
    Texture3D { mip_slice: u32, first_w_slice: u32, w_size: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnorderedAccessViewDesc {
    pub format: Format,
    pub dimension: UavDimension,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RtvDimension {
    Texture1D { mip_slice: u32 },
    Texture2D { mip_slice: u32 },
    Texture2DArray { mip_slice: u32, first_array_slice: u32, array_size: u32 },
    Texture2DMs,
    Texture3D { mip_slice: u32, first_w_slice: u32, w_size: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTargetViewDesc {
    pub format: Format,
    pub dimension: RtvDimension,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DsvDimension {
    Texture1D { mip_slice: u32 },
    Texture2D { mip_slice: u32 },
    Texture2DArray { mip_slice: u32, first_array_slice: u32, array_size: u32 },
    Texture2DMs,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct DsvFlags: u32 {
        const READ_ONLY_DEPTH = 0x1;
        const READ_ONLY_STENCIL = 0x2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthStencilViewDesc {
    pub format: Format,
    pub dimension: DsvDimension,
    pub flags: DsvFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterType {
    Point,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureAddressMode {
    Wrap,
    Mirror,
    Clamp,
    Border,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub min_filter: FilterType,
    pub mag_filter: FilterType,
    pub mip_filter: FilterType,
    pub anisotropic: bool,
    pub comparison: bool,
    pub address: [TextureAddressMode; 3],
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: ComparisonFunc,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorRangeType {
    Srv,
    Uav,
    Cbv,
    Sampler,
}

pub const DESCRIPTOR_RANGE_OFFSET_APPEND: u32 = 0xFFFF_FFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    pub ty: DescriptorRangeType,
    pub count: u32,
    pub base_shader_register: u32,
    pub register_space: u32,
    pub offset_in_table: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderVisibility {
    All,
    Vertex,
    Pixel,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RootParameter {
    DescriptorTable {
        ranges: Vec<DescriptorRange>,
        visibility: ShaderVisibility,
    },
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct RootSignatureFlags: u32 {
        const ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT = 0x1;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RootSignatureDesc {
    pub parameters: Vec<RootParameter>,
    pub flags: RootSignatureFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveTopologyType {
    Point,
    Line,
    Triangle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputClassification {
    PerVertex,
    PerInstance,
}

/// Vertex attribute. The semantic is always `LOC<semantic_index>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputElement {
    pub semantic_index: u32,
    pub format: Format,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
    pub classification: InputClassification,
    pub instance_data_step_rate: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Blend {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DestAlpha,
    InvDestAlpha,
    DestColor,
    InvDestColor,
    SrcAlphaSat,
    BlendFactor,
    InvBlendFactor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTargetBlendDesc {
    pub blend_enable: bool,
    pub src_blend: Blend,
    pub dest_blend: Blend,
    pub blend_op: BlendOp,
    pub src_blend_alpha: Blend,
    pub dest_blend_alpha: Blend,
    pub blend_op_alpha: BlendOp,
    pub write_mask: u8,
}

impl Default for RenderTargetBlendDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_blend: Blend::One,
            dest_blend: Blend::Zero,
            blend_op: BlendOp::Add,
            src_blend_alpha: Blend::One,
            dest_blend_alpha: Blend::Zero,
            blend_op_alpha: BlendOp::Add,
            write_mask: 0xF,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterizerDesc {
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrSat,
    DecrSat,
    Invert,
    Incr,
    Decr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilOpDesc {
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub func: ComparisonFunc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: StencilOpDesc,
    pub back_face: StencilOpDesc,
}

pub struct GraphicsPipelineDesc<'a, N: Native> {
    pub root_signature: &'a N::RootSignature,
    pub vertex_shader: &'a [u8],
    pub pixel_shader: Option<&'a [u8]>,
    pub input_layout: Vec<InputElement>,
    pub primitive_topology_type: PrimitiveTopologyType,
    pub strip_cut: Option<crate::IndexFormat>,
    pub rasterizer: RasterizerDesc,
    pub blend: ArrayVec<RenderTargetBlendDesc, { crate::MAX_COLOR_ATTACHMENTS }>,
    pub alpha_to_coverage: bool,
    pub depth_stencil: Option<DepthStencilDesc>,
    pub rtv_formats: ArrayVec<Format, { crate::MAX_COLOR_ATTACHMENTS }>,
    pub dsv_format: Format,
    pub sample_count: u32,
    pub sample_mask: u32,
    pub name: Option<&'a str>,
}

pub struct ComputePipelineDesc<'a, N: Native> {
    pub root_signature: &'a N::RootSignature,
    pub compute_shader: &'a [u8],
    pub name: Option<&'a str>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub top_left_x: f32,
    pub top_left_y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VertexBufferView {
    pub buffer_location: u64,
    pub size_in_bytes: u32,
    pub stride_in_bytes: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBufferView {
    pub buffer_location: u64,
    pub size_in_bytes: u32,
    pub format: Format,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubresourceFootprint {
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub row_pitch: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacedFootprint {
    pub offset: u64,
    pub footprint: SubresourceFootprint,
}

pub enum TextureCopyLocation<'a, N: Native> {
    Subresource(&'a N::Resource, u32),
    PlacedFootprint(&'a N::Resource, PlacedFootprint),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyBox {
    pub left: u32,
    pub top: u32,
    pub front: u32,
    pub right: u32,
    pub bottom: u32,
    pub back: u32,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct SwapChainFlags: u32 {
        const ALLOW_TEARING = 2048;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PresentFlags: u32 {
        const ALLOW_TEARING = 0x200;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct WindowAssociation: u32 {
        const NO_WINDOW_CHANGES = 1 << 0;
        const NO_ALT_ENTER = 1 << 1;
        const NO_PRINT_SCREEN = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub buffer_count: u32,
    pub flags: SwapChainFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    Signaled,
    Timeout,
    Failed,
}

pub const INFINITE: u32 = 0xFFFF_FFFF;

/// The set of native interfaces a backend provides.
pub trait Native: Sized + Send + Sync + fmt::Debug + 'static {
    type Instance: RawInstance<Self>;
    type Adapter: RawAdapter<Self>;
    type Device: RawDevice<Self>;
    type Queue: RawQueue<Self>;
    type Resource: RawResource;
    type DescriptorHeap: RawDescriptorHeap;
    type CommandAllocator: RawCommandAllocator;
    type CommandList: RawCommandList<Self>;
    type Fence: RawFence<Self>;
    type Event: RawEvent;
    type RootSignature: fmt::Debug + Send + Sync;
    type PipelineState: fmt::Debug + Send + Sync;
    type SwapChain: RawSwapChain<Self>;
    /// Presentation target a swapchain is created for.
    type Window: fmt::Debug + Send + Sync;
}

pub trait RawInstance<N: Native>: Sized + fmt::Debug + Send + Sync {
    fn init(desc: &crate::InstanceDescriptor) -> Result<Self, crate::InstanceError>;
    fn enumerate_adapters(&self) -> Vec<N::Adapter>;
    fn supports_allow_tearing(&self) -> bool;
    fn create_window(
        &self,
        handle: raw_window_handle::RawWindowHandle,
    ) -> Result<N::Window, crate::InstanceError>;
    fn create_swap_chain_for_window(
        &self,
        queue: &N::Queue,
        window: &N::Window,
        desc: &SwapChainDesc,
    ) -> Result<N::SwapChain, Status>;
    fn make_window_association(
        &self,
        window: &N::Window,
        flags: WindowAssociation,
    ) -> Result<(), Status>;
}

pub trait RawAdapter<N: Native>: fmt::Debug + Send + Sync {
    fn info(&self) -> crate::AdapterInfo;
    fn create_device(&self) -> Result<N::Device, Status>;
}

pub trait RawDevice<N: Native>: fmt::Debug + Send + Sync {
    fn create_command_queue(&self) -> Result<N::Queue, Status>;
    fn descriptor_increment_size(&self, ty: DescriptorHeapType) -> u32;
    fn create_descriptor_heap(
        &self,
        ty: DescriptorHeapType,
        count: u32,
        shader_visible: bool,
    ) -> Result<N::DescriptorHeap, Status>;
    fn create_committed_resource(
        &self,
        heap: HeapType,
        desc: &ResourceDesc,
        initial_state: ResourceStates,
        clear_value: Option<ClearValue>,
    ) -> Result<N::Resource, Status>;
    fn create_constant_buffer_view(&self, desc: &ConstantBufferViewDesc, dest: CpuDescriptor);
    fn create_shader_resource_view(
        &self,
        resource: &N::Resource,
        desc: &ShaderResourceViewDesc,
        dest: CpuDescriptor,
    );
    fn create_unordered_access_view(
        &self,
        resource: &N::Resource,
        desc: &UnorderedAccessViewDesc,
        dest: CpuDescriptor,
    );
    fn create_render_target_view(
        &self,
        resource: &N::Resource,
        desc: Option<&RenderTargetViewDesc>,
        dest: CpuDescriptor,
    );
    fn create_depth_stencil_view(
        &self,
        resource: &N::Resource,
        desc: &DepthStencilViewDesc,
        dest: CpuDescriptor,
    );
    fn create_sampler(&self, desc: &SamplerDesc, dest: CpuDescriptor);
    fn copy_descriptors_simple(
        &self,
        count: u32,
        dest: CpuDescriptor,
        src: CpuDescriptor,
        ty: DescriptorHeapType,
    );
    fn create_command_allocator(&self) -> Result<N::CommandAllocator, Status>;
    /// Creates a command list in the recording state.
    fn create_command_list(&self, allocator: &N::CommandAllocator)
        -> Result<N::CommandList, Status>;
    fn create_fence(&self, initial_value: u64) -> Result<N::Fence, Status>;
    fn create_event(&self) -> Result<N::Event, Status>;
    fn serialize_root_signature(&self, desc: &RootSignatureDesc) -> Result<Vec<u8>, Diagnostic>;
    fn create_root_signature(&self, blob: &[u8]) -> Result<N::RootSignature, Status>;
    fn create_graphics_pipeline_state(
        &self,
        desc: &GraphicsPipelineDesc<'_, N>,
    ) -> Result<N::PipelineState, Status>;
    fn create_compute_pipeline_state(
        &self,
        desc: &ComputePipelineDesc<'_, N>,
    ) -> Result<N::PipelineState, Status>;
    /// `Status::OK` while the device is alive.
    fn removed_reason(&self) -> Status;
}

pub trait RawQueue<N: Native>: Clone + fmt::Debug + Send + Sync {
    fn execute_command_lists(&self, lists: &[&N::CommandList]);
    fn signal(&self, fence: &N::Fence, value: u64) -> Result<(), Status>;
}

pub trait RawResource: Clone + fmt::Debug + Send + Sync {
    fn desc(&self) -> ResourceDesc;
    fn gpu_virtual_address(&self) -> u64;
    fn map(&self) -> Result<NonNull<u8>, Status>;
    fn unmap(&self);
    fn set_name(&self, name: &str);
}

pub trait RawDescriptorHeap: fmt::Debug + Send + Sync {
    fn cpu_start(&self) -> CpuDescriptor;
    /// Only meaningful for shader-visible heaps.
    fn gpu_start(&self) -> GpuDescriptor;
}

pub trait RawCommandAllocator: fmt::Debug + Send + Sync {
    fn reset(&self) -> Result<(), Status>;
}

pub trait RawCommandList<N: Native>: fmt::Debug + Send + Sync {
    fn reset(&self, allocator: &N::CommandAllocator) -> Result<(), Status>;
    fn close(&self) -> Result<(), Status>;
    fn set_name(&self, name: &str);

    fn resource_barrier(&self, barriers: &[Barrier<'_, N>]);
    fn copy_buffer_region(
        &self,
        dst: &N::Resource,
        dst_offset: u64,
        src: &N::Resource,
        src_offset: u64,
        size: u64,
    );
    fn copy_texture_region(
        &self,
        dst: &TextureCopyLocation<'_, N>,
        dst_origin: crate::Origin3d,
        src: &TextureCopyLocation<'_, N>,
        src_box: Option<&CopyBox>,
    );
    fn clear_render_target_view(&self, rtv: CpuDescriptor, color: [f32; 4]);
    fn clear_depth_stencil_view(
        &self,
        dsv: CpuDescriptor,
        depth: Option<f32>,
        stencil: Option<u8>,
    );
    fn om_set_render_targets(&self, rtvs: &[CpuDescriptor], dsv: Option<CpuDescriptor>);
    fn rs_set_viewports(&self, viewports: &[Viewport]);
    fn rs_set_scissor_rects(&self, rects: &[Rect]);
    fn om_set_blend_factor(&self, factor: [f32; 4]);
    fn om_set_stencil_ref(&self, value: u32);

    fn set_descriptor_heaps(&self, heaps: &[&N::DescriptorHeap]);
    fn set_graphics_root_signature(&self, signature: &N::RootSignature);
    fn set_compute_root_signature(&self, signature: &N::RootSignature);
    fn set_graphics_root_descriptor_table(&self, index: u32, base: GpuDescriptor);
    fn set_compute_root_descriptor_table(&self, index: u32, base: GpuDescriptor);
    fn set_pipeline_state(&self, pipeline: &N::PipelineState);

    fn ia_set_primitive_topology(&self, topology: PrimitiveTopology);
    fn ia_set_vertex_buffers(&self, start_slot: u32, views: &[VertexBufferView]);
    fn ia_set_index_buffer(&self, view: &IndexBufferView);

    fn draw_instanced(
        &self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    );
    fn draw_indexed_instanced(
        &self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    );
    fn dispatch(&self, x: u32, y: u32, z: u32);

    fn begin_event(&self, name: &str);
    fn end_event(&self);
    fn set_marker(&self, name: &str);
}

pub trait RawFence<N: Native>: fmt::Debug + Send + Sync {
    /// `u64::MAX` when the device has been removed.
    fn completed_value(&self) -> u64;
    fn set_event_on_completion(&self, value: u64, event: &N::Event) -> Result<(), Status>;
}

pub trait RawEvent: fmt::Debug + Send + Sync {
    /// Timeout in milliseconds, [`INFINITE`] to block.
    fn wait(&self, timeout_ms: u32) -> WaitStatus;
}

pub trait RawSwapChain<N: Native>: fmt::Debug + Send + Sync {
    fn buffer(&self, index: u32) -> Result<N::Resource, Status>;
    fn current_back_buffer_index(&self) -> u32;
    fn resize_buffers(
        &self,
        buffer_count: u32,
        width: u32,
        height: u32,
        format: Format,
        flags: SwapChainFlags,
    ) -> Result<(), Status>;
    fn present(&self, sync_interval: u32, flags: PresentFlags) -> Status;
}

