/*!
# Direct3D 12 runtime bindings.

`d3d12.dll` and `dxgi.dll` are loaded at runtime, the rest of the calls go
through the `windows` COM bindings. Interface pointers borrowed into native
structs are passed with [`borrow_interface_temporarily`] so no reference
counts change.
!*/

use std::{ffi, mem, ptr, ptr::NonNull, sync::Arc};

use windows::{
    core::{Interface, HSTRING, PCSTR},
    Win32::{
        Foundation,
        Graphics::{Direct3D, Direct3D12, Dxgi},
        System::Threading,
    },
};

use super::{
    Barrier, ClearValue, ComputePipelineDesc, ConstantBufferViewDesc, CpuDescriptor,
    DepthStencilViewDesc, DescriptorHeapType, Diagnostic, Format, GpuDescriptor,
    GraphicsPipelineDesc, HeapType, IndexBufferView, PresentFlags, PrimitiveTopology, Rect,
    RenderTargetViewDesc, ResourceDesc, ResourceDimension, ResourceFlags, ResourceStates,
    RootSignatureDesc, SamplerDesc, ShaderResourceViewDesc, Status, SwapChainDesc,
    SwapChainFlags, TextureCopyLocation, UnorderedAccessViewDesc, VertexBufferView, Viewport,
    WaitStatus, WindowAssociation,
};

trait StatusResultExt<T> {
    fn into_status(self) -> Result<T, Status>;
}

impl<T> StatusResultExt<T> for windows::core::Result<T> {
    fn into_status(self) -> Result<T, Status> {
        self.map_err(|err| Status(err.code().0))
    }
}

/// Copies an interface pointer into a native struct field without touching
/// its reference count.
///
/// # Safety
/// The returned value must not be dropped and must not outlive `src`.
unsafe fn borrow_interface_temporarily<I: Interface>(src: &I) -> mem::ManuallyDrop<Option<I>> {
    unsafe { mem::transmute_copy(src) }
}

fn blob_bytes(blob: &Direct3D::ID3DBlob) -> &[u8] {
    unsafe { std::slice::from_raw_parts(blob.GetBufferPointer().cast(), blob.GetBufferSize()) }
}

fn wide_marker(name: &str) -> (Vec<u16>, u32) {
    let mut wide = name.encode_utf16().collect::<Vec<_>>();
    wide.push(0);
    let size = (wide.len() * mem::size_of::<u16>()) as u32;
    (wide, size)
}

#[derive(Debug)]
struct DynLib {
    inner: libloading::Library,
}

impl DynLib {
    unsafe fn new(filename: &str) -> Result<Self, libloading::Error> {
        unsafe { libloading::Library::new(filename) }.map(|inner| Self { inner })
    }

    unsafe fn get<T>(&self, symbol: &[u8]) -> Result<libloading::Symbol<'_, T>, Status> {
        unsafe { self.inner.get(symbol) }.map_err(|err| {
            log::error!("Missing native entry point: {err}");
            Status::E_FAIL
        })
    }
}

#[derive(Debug)]
struct D3D12Lib {
    lib: DynLib,
}

impl D3D12Lib {
    fn new() -> Result<Self, libloading::Error> {
        unsafe { DynLib::new("d3d12.dll") }.map(|lib| Self { lib })
    }

    fn create_device(
        &self,
        adapter: &Dxgi::IDXGIAdapter1,
        feature_level: Direct3D::D3D_FEATURE_LEVEL,
    ) -> Result<Direct3D12::ID3D12Device, Status> {
        type Fun = extern "system" fn(
            padapter: *mut ffi::c_void,
            minimumfeaturelevel: Direct3D::D3D_FEATURE_LEVEL,
            riid: *const windows_core::GUID,
            ppdevice: *mut *mut ffi::c_void,
        ) -> windows_core::HRESULT;
        let func: libloading::Symbol<Fun> = unsafe { self.lib.get(b"D3D12CreateDevice\0") }?;

        let mut result__ = None;
        (func)(
            adapter.as_raw(),
            feature_level,
            &Direct3D12::ID3D12Device::IID,
            <*mut _>::cast(&mut result__),
        )
        .ok()
        .into_status()?;

        result__.ok_or(Status::E_FAIL)
    }

    fn serialize_root_signature(
        &self,
        desc: &Direct3D12::D3D12_ROOT_SIGNATURE_DESC,
    ) -> Result<Vec<u8>, Diagnostic> {
        type Fun = extern "system" fn(
            prootsignature: *const Direct3D12::D3D12_ROOT_SIGNATURE_DESC,
            version: Direct3D12::D3D_ROOT_SIGNATURE_VERSION,
            ppblob: *mut *mut ffi::c_void,
            pperrorblob: *mut *mut ffi::c_void,
        ) -> windows_core::HRESULT;
        let func: libloading::Symbol<Fun> = unsafe {
            self.lib.get(b"D3D12SerializeRootSignature\0")
        }
        .map_err(|status| Diagnostic {
            status,
            message: "D3D12SerializeRootSignature is not exported".to_string(),
        })?;

        let mut blob = None::<Direct3D::ID3DBlob>;
        let mut error = None::<Direct3D::ID3DBlob>;
        let hr = (func)(
            desc,
            Direct3D12::D3D_ROOT_SIGNATURE_VERSION_1_0,
            <*mut _>::cast(&mut blob),
            <*mut _>::cast(&mut error),
        );

        match (hr.ok(), blob) {
            (Ok(()), Some(blob)) => Ok(blob_bytes(&blob).to_vec()),
            (result, _) => {
                let status = match result {
                    Ok(()) => Status::E_FAIL,
                    Err(err) => Status(err.code().0),
                };
                let message = match error {
                    Some(ref error) => String::from_utf8_lossy(blob_bytes(error))
                        .trim_end_matches('\0')
                        .to_string(),
                    None => format!("root signature serialization failed with {status}"),
                };
                Err(Diagnostic { status, message })
            }
        }
    }

    fn debug_interface(&self) -> Result<Direct3D12::ID3D12Debug, Status> {
        type Fun = extern "system" fn(
            riid: *const windows_core::GUID,
            ppvdebug: *mut *mut ffi::c_void,
        ) -> windows_core::HRESULT;
        let func: libloading::Symbol<Fun> = unsafe { self.lib.get(b"D3D12GetDebugInterface\0") }?;

        let mut result__ = None;
        (func)(&Direct3D12::ID3D12Debug::IID, <*mut _>::cast(&mut result__))
            .ok()
            .into_status()?;

        result__.ok_or(Status::E_FAIL)
    }
}

#[derive(Debug)]
struct DxgiLib {
    lib: DynLib,
}

impl DxgiLib {
    fn new() -> Result<Self, libloading::Error> {
        unsafe { DynLib::new("dxgi.dll") }.map(|lib| Self { lib })
    }

    fn create_factory4(
        &self,
        factory_flags: Dxgi::DXGI_CREATE_FACTORY_FLAGS,
    ) -> Result<Dxgi::IDXGIFactory4, Status> {
        type Fun = extern "system" fn(
            flags: Dxgi::DXGI_CREATE_FACTORY_FLAGS,
            riid: *const windows_core::GUID,
            ppfactory: *mut *mut ffi::c_void,
        ) -> windows_core::HRESULT;
        let func: libloading::Symbol<Fun> = unsafe { self.lib.get(b"CreateDXGIFactory2\0") }?;

        let mut result__ = None;
        (func)(
            factory_flags,
            &Dxgi::IDXGIFactory4::IID,
            <*mut _>::cast(&mut result__),
        )
        .ok()
        .into_status()?;

        result__.ok_or(Status::E_FAIL)
    }
}

mod conv {
    use windows::Win32::Graphics::{Direct3D, Direct3D12, Dxgi};

    use super::super::{
        Blend, BlendOp, ComparisonFunc, CullMode, DepthStencilDesc, DescriptorHeapType,
        DescriptorRangeType, FilterType, Format, HeapType, PrimitiveTopology,
        PrimitiveTopologyType, RenderTargetBlendDesc, ResourceStates, SamplerDesc,
        ShaderVisibility, StencilOp, StencilOpDesc, TextureAddressMode,
    };

    pub fn format(format: Format) -> Dxgi::Common::DXGI_FORMAT {
        Dxgi::Common::DXGI_FORMAT(format.0 as i32)
    }

    pub fn states(states: ResourceStates) -> Direct3D12::D3D12_RESOURCE_STATES {
        Direct3D12::D3D12_RESOURCE_STATES(states.bits() as i32)
    }

    pub fn descriptor_heap_type(ty: DescriptorHeapType) -> Direct3D12::D3D12_DESCRIPTOR_HEAP_TYPE {
        match ty {
            DescriptorHeapType::CbvSrvUav => Direct3D12::D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
            DescriptorHeapType::Sampler => Direct3D12::D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
            DescriptorHeapType::Rtv => Direct3D12::D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
            DescriptorHeapType::Dsv => Direct3D12::D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
        }
    }

    pub fn heap_properties(heap: HeapType) -> Direct3D12::D3D12_HEAP_PROPERTIES {
        Direct3D12::D3D12_HEAP_PROPERTIES {
            Type: match heap {
                HeapType::Default => Direct3D12::D3D12_HEAP_TYPE_DEFAULT,
                HeapType::Upload => Direct3D12::D3D12_HEAP_TYPE_UPLOAD,
                HeapType::Readback => Direct3D12::D3D12_HEAP_TYPE_READBACK,
            },
            CPUPageProperty: Direct3D12::D3D12_CPU_PAGE_PROPERTY_UNKNOWN,
            MemoryPoolPreference: Direct3D12::D3D12_MEMORY_POOL_UNKNOWN,
            CreationNodeMask: 0,
            VisibleNodeMask: 0,
        }
    }

    fn filter_type(filter: FilterType) -> i32 {
        match filter {
            FilterType::Point => 0,
            FilterType::Linear => 1,
        }
    }

    pub fn filter(desc: &SamplerDesc) -> Direct3D12::D3D12_FILTER {
        let reduction = if desc.comparison { 1 } else { 0 };
        let mut raw = (filter_type(desc.min_filter) << 4)
            | (filter_type(desc.mag_filter) << 2)
            | filter_type(desc.mip_filter)
            | (reduction << 7);
        if desc.anisotropic {
            raw |= 0x40;
        }
        Direct3D12::D3D12_FILTER(raw)
    }

    pub fn address_mode(mode: TextureAddressMode) -> Direct3D12::D3D12_TEXTURE_ADDRESS_MODE {
        match mode {
            TextureAddressMode::Wrap => Direct3D12::D3D12_TEXTURE_ADDRESS_MODE_WRAP,
            TextureAddressMode::Mirror => Direct3D12::D3D12_TEXTURE_ADDRESS_MODE_MIRROR,
            TextureAddressMode::Clamp => Direct3D12::D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
            TextureAddressMode::Border => Direct3D12::D3D12_TEXTURE_ADDRESS_MODE_BORDER,
        }
    }

    pub fn comparison(func: ComparisonFunc) -> Direct3D12::D3D12_COMPARISON_FUNC {
        use ComparisonFunc as Cf;
        match func {
            Cf::Never => Direct3D12::D3D12_COMPARISON_FUNC_NEVER,
            Cf::Less => Direct3D12::D3D12_COMPARISON_FUNC_LESS,
            Cf::Equal => Direct3D12::D3D12_COMPARISON_FUNC_EQUAL,
            Cf::LessEqual => Direct3D12::D3D12_COMPARISON_FUNC_LESS_EQUAL,
            Cf::Greater => Direct3D12::D3D12_COMPARISON_FUNC_GREATER,
            Cf::NotEqual => Direct3D12::D3D12_COMPARISON_FUNC_NOT_EQUAL,
            Cf::GreaterEqual => Direct3D12::D3D12_COMPARISON_FUNC_GREATER_EQUAL,
            Cf::Always => Direct3D12::D3D12_COMPARISON_FUNC_ALWAYS,
        }
    }

    pub fn range_type(ty: DescriptorRangeType) -> Direct3D12::D3D12_DESCRIPTOR_RANGE_TYPE {
        match ty {
            DescriptorRangeType::Srv => Direct3D12::D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
            DescriptorRangeType::Uav => Direct3D12::D3D12_DESCRIPTOR_RANGE_TYPE_UAV,
            DescriptorRangeType::Cbv => Direct3D12::D3D12_DESCRIPTOR_RANGE_TYPE_CBV,
            DescriptorRangeType::Sampler => Direct3D12::D3D12_DESCRIPTOR_RANGE_TYPE_SAMPLER,
        }
    }

    pub fn visibility(visibility: ShaderVisibility) -> Direct3D12::D3D12_SHADER_VISIBILITY {
        match visibility {
            ShaderVisibility::All => Direct3D12::D3D12_SHADER_VISIBILITY_ALL,
            ShaderVisibility::Vertex => Direct3D12::D3D12_SHADER_VISIBILITY_VERTEX,
            ShaderVisibility::Pixel => Direct3D12::D3D12_SHADER_VISIBILITY_PIXEL,
        }
    }

    pub fn topology_type(ty: PrimitiveTopologyType) -> Direct3D12::D3D12_PRIMITIVE_TOPOLOGY_TYPE {
        match ty {
            PrimitiveTopologyType::Point => Direct3D12::D3D12_PRIMITIVE_TOPOLOGY_TYPE_POINT,
            PrimitiveTopologyType::Line => Direct3D12::D3D12_PRIMITIVE_TOPOLOGY_TYPE_LINE,
            PrimitiveTopologyType::Triangle => Direct3D12::D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
        }
    }

    pub fn topology(topology: PrimitiveTopology) -> Direct3D::D3D_PRIMITIVE_TOPOLOGY {
        match topology {
            PrimitiveTopology::PointList => Direct3D::D3D_PRIMITIVE_TOPOLOGY_POINTLIST,
            PrimitiveTopology::LineList => Direct3D::D3D_PRIMITIVE_TOPOLOGY_LINELIST,
            PrimitiveTopology::LineStrip => Direct3D::D3D_PRIMITIVE_TOPOLOGY_LINESTRIP,
            PrimitiveTopology::TriangleList => Direct3D::D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
            PrimitiveTopology::TriangleStrip => Direct3D::D3D_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
        }
    }

    fn blend(factor: Blend) -> Direct3D12::D3D12_BLEND {
        match factor {
            Blend::Zero => Direct3D12::D3D12_BLEND_ZERO,
            Blend::One => Direct3D12::D3D12_BLEND_ONE,
            Blend::SrcColor => Direct3D12::D3D12_BLEND_SRC_COLOR,
            Blend::InvSrcColor => Direct3D12::D3D12_BLEND_INV_SRC_COLOR,
            Blend::SrcAlpha => Direct3D12::D3D12_BLEND_SRC_ALPHA,
            Blend::InvSrcAlpha => Direct3D12::D3D12_BLEND_INV_SRC_ALPHA,
            Blend::DestAlpha => Direct3D12::D3D12_BLEND_DEST_ALPHA,
            Blend::InvDestAlpha => Direct3D12::D3D12_BLEND_INV_DEST_ALPHA,
            Blend::DestColor => Direct3D12::D3D12_BLEND_DEST_COLOR,
            Blend::InvDestColor => Direct3D12::D3D12_BLEND_INV_DEST_COLOR,
            Blend::SrcAlphaSat => Direct3D12::D3D12_BLEND_SRC_ALPHA_SAT,
            Blend::BlendFactor => Direct3D12::D3D12_BLEND_BLEND_FACTOR,
            Blend::InvBlendFactor => Direct3D12::D3D12_BLEND_INV_BLEND_FACTOR,
        }
    }

    fn blend_op(op: BlendOp) -> Direct3D12::D3D12_BLEND_OP {
        match op {
            BlendOp::Add => Direct3D12::D3D12_BLEND_OP_ADD,
            BlendOp::Subtract => Direct3D12::D3D12_BLEND_OP_SUBTRACT,
            BlendOp::RevSubtract => Direct3D12::D3D12_BLEND_OP_REV_SUBTRACT,
            BlendOp::Min => Direct3D12::D3D12_BLEND_OP_MIN,
            BlendOp::Max => Direct3D12::D3D12_BLEND_OP_MAX,
        }
    }

    pub fn render_targets(
        targets: &[RenderTargetBlendDesc],
    ) -> [Direct3D12::D3D12_RENDER_TARGET_BLEND_DESC;
           Direct3D12::D3D12_SIMULTANEOUS_RENDER_TARGET_COUNT as usize] {
        let dummy_target = Direct3D12::D3D12_RENDER_TARGET_BLEND_DESC {
            BlendEnable: false.into(),
            LogicOpEnable: false.into(),
            SrcBlend: Direct3D12::D3D12_BLEND_ZERO,
            DestBlend: Direct3D12::D3D12_BLEND_ZERO,
            BlendOp: Direct3D12::D3D12_BLEND_OP_ADD,
            SrcBlendAlpha: Direct3D12::D3D12_BLEND_ZERO,
            DestBlendAlpha: Direct3D12::D3D12_BLEND_ZERO,
            BlendOpAlpha: Direct3D12::D3D12_BLEND_OP_ADD,
            LogicOp: Direct3D12::D3D12_LOGIC_OP_CLEAR,
            RenderTargetWriteMask: 0,
        };
        let mut raw_targets = [dummy_target;
            Direct3D12::D3D12_SIMULTANEOUS_RENDER_TARGET_COUNT as usize];

        for (raw, target) in raw_targets.iter_mut().zip(targets) {
            raw.BlendEnable = target.blend_enable.into();
            raw.SrcBlend = blend(target.src_blend);
            raw.DestBlend = blend(target.dest_blend);
            raw.BlendOp = blend_op(target.blend_op);
            raw.SrcBlendAlpha = blend(target.src_blend_alpha);
            raw.DestBlendAlpha = blend(target.dest_blend_alpha);
            raw.BlendOpAlpha = blend_op(target.blend_op_alpha);
            raw.RenderTargetWriteMask = target.write_mask;
        }

        raw_targets
    }

    pub fn cull_mode(mode: CullMode) -> Direct3D12::D3D12_CULL_MODE {
        match mode {
            CullMode::None => Direct3D12::D3D12_CULL_MODE_NONE,
            CullMode::Front => Direct3D12::D3D12_CULL_MODE_FRONT,
            CullMode::Back => Direct3D12::D3D12_CULL_MODE_BACK,
        }
    }

    fn stencil_op(op: StencilOp) -> Direct3D12::D3D12_STENCIL_OP {
        match op {
            StencilOp::Keep => Direct3D12::D3D12_STENCIL_OP_KEEP,
            StencilOp::Zero => Direct3D12::D3D12_STENCIL_OP_ZERO,
            StencilOp::Replace => Direct3D12::D3D12_STENCIL_OP_REPLACE,
            StencilOp::IncrSat => Direct3D12::D3D12_STENCIL_OP_INCR_SAT,
            StencilOp::DecrSat => Direct3D12::D3D12_STENCIL_OP_DECR_SAT,
            StencilOp::Invert => Direct3D12::D3D12_STENCIL_OP_INVERT,
            StencilOp::Incr => Direct3D12::D3D12_STENCIL_OP_INCR,
            StencilOp::Decr => Direct3D12::D3D12_STENCIL_OP_DECR,
        }
    }

    fn stencil_face(face: &StencilOpDesc) -> Direct3D12::D3D12_DEPTH_STENCILOP_DESC {
        Direct3D12::D3D12_DEPTH_STENCILOP_DESC {
            StencilFailOp: stencil_op(face.fail_op),
            StencilDepthFailOp: stencil_op(face.depth_fail_op),
            StencilPassOp: stencil_op(face.pass_op),
            StencilFunc: comparison(face.func),
        }
    }

    pub fn depth_stencil(ds: &DepthStencilDesc) -> Direct3D12::D3D12_DEPTH_STENCIL_DESC {
        Direct3D12::D3D12_DEPTH_STENCIL_DESC {
            DepthEnable: ds.depth_enable.into(),
            DepthWriteMask: if ds.depth_write {
                Direct3D12::D3D12_DEPTH_WRITE_MASK_ALL
            } else {
                Direct3D12::D3D12_DEPTH_WRITE_MASK_ZERO
            },
            DepthFunc: comparison(ds.depth_func),
            StencilEnable: ds.stencil_enable.into(),
            StencilReadMask: ds.stencil_read_mask,
            StencilWriteMask: ds.stencil_write_mask,
            FrontFace: stencil_face(&ds.front_face),
            BackFace: stencil_face(&ds.back_face),
        }
    }
}

fn raw_resource_desc(desc: &ResourceDesc) -> Direct3D12::D3D12_RESOURCE_DESC {
    let (dimension, layout) = match desc.dimension {
        ResourceDimension::Buffer => (
            Direct3D12::D3D12_RESOURCE_DIMENSION_BUFFER,
            Direct3D12::D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
        ),
        ResourceDimension::Texture1D => (
            Direct3D12::D3D12_RESOURCE_DIMENSION_TEXTURE1D,
            Direct3D12::D3D12_TEXTURE_LAYOUT_UNKNOWN,
        ),
        ResourceDimension::Texture2D => (
            Direct3D12::D3D12_RESOURCE_DIMENSION_TEXTURE2D,
            Direct3D12::D3D12_TEXTURE_LAYOUT_UNKNOWN,
        ),
        ResourceDimension::Texture3D => (
            Direct3D12::D3D12_RESOURCE_DIMENSION_TEXTURE3D,
            Direct3D12::D3D12_TEXTURE_LAYOUT_UNKNOWN,
        ),
    };
    Direct3D12::D3D12_RESOURCE_DESC {
        Dimension: dimension,
        Alignment: 0,
        Width: desc.width,
        Height: desc.height,
        DepthOrArraySize: desc.depth_or_array_size,
        MipLevels: desc.mip_levels,
        Format: conv::format(desc.format),
        SampleDesc: Dxgi::Common::DXGI_SAMPLE_DESC {
            Count: desc.sample_count,
            Quality: 0,
        },
        Layout: layout,
        Flags: Direct3D12::D3D12_RESOURCE_FLAGS(desc.flags.bits() as i32),
    }
}

fn cpu_handle(descriptor: CpuDescriptor) -> Direct3D12::D3D12_CPU_DESCRIPTOR_HANDLE {
    Direct3D12::D3D12_CPU_DESCRIPTOR_HANDLE {
        ptr: descriptor.ptr,
    }
}

/// Binds the native call surface to `d3d12.dll` and DXGI.
#[derive(Debug)]
pub enum D3d12 {}

impl super::Native for D3d12 {
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

#[derive(Debug)]
pub struct Instance {
    factory: Dxgi::IDXGIFactory4,
    d3d12: Arc<D3D12Lib>,
    _dxgi: DxgiLib,
    supports_allow_tearing: bool,
}

unsafe impl Send for Instance {}
unsafe impl Sync for Instance {}

impl super::RawInstance<D3d12> for Instance {
    fn init(desc: &crate::InstanceDescriptor) -> Result<Self, crate::InstanceError> {
        profiling::scope!("Init DX12 Backend");
        let d3d12 = D3D12Lib::new().map_err(|e| {
            crate::InstanceError::with_source(String::from("failed to load d3d12.dll"), e)
        })?;
        let dxgi = DxgiLib::new().map_err(|e| {
            crate::InstanceError::with_source(String::from("failed to load dxgi.dll"), e)
        })?;

        let validation = desc.flags.contains(crate::InstanceFlags::VALIDATION);
        if validation {
            match d3d12.debug_interface() {
                Ok(debug) => {
                    unsafe { debug.EnableDebugLayer() };
                    log::info!("Enabled D3D12 debug layer");
                }
                Err(status) => log::warn!("Unable to enable the D3D12 debug layer: {status}"),
            }
        }

        let factory_flags = if validation {
            Dxgi::DXGI_CREATE_FACTORY_DEBUG
        } else {
            Dxgi::DXGI_CREATE_FACTORY_FLAGS::default()
        };
        let factory = dxgi.create_factory4(factory_flags).map_err(|status| {
            crate::InstanceError::new(format!("failed to create a DXGI 1.4 factory: {status}"))
        })?;

        let supports_allow_tearing = match factory.cast::<Dxgi::IDXGIFactory5>() {
            Ok(factory5) => {
                let mut allow_tearing = Foundation::FALSE;
                let hr = unsafe {
                    factory5.CheckFeatureSupport(
                        Dxgi::DXGI_FEATURE_PRESENT_ALLOW_TEARING,
                        <*mut _>::cast(&mut allow_tearing),
                        mem::size_of_val(&allow_tearing) as u32,
                    )
                };
                match hr {
                    Ok(()) => allow_tearing.as_bool(),
                    Err(err) => {
                        log::warn!("Unable to check for tearing support: {err}");
                        false
                    }
                }
            }
            Err(err) => {
                log::info!("IDXGIFactory5 is unavailable: {err}");
                false
            }
        };

        Ok(Self {
            factory,
            d3d12: Arc::new(d3d12),
            _dxgi: dxgi,
            supports_allow_tearing,
        })
    }

    fn enumerate_adapters(&self) -> Vec<Adapter> {
        let mut adapters = Vec::new();
        for index in 0u32.. {
            profiling::scope!("IDXGIFactory1::EnumAdapters1");
            let raw = match unsafe { self.factory.EnumAdapters1(index) } {
                Ok(raw) => raw,
                Err(err) if err.code() == Dxgi::DXGI_ERROR_NOT_FOUND => break,
                Err(err) => {
                    log::error!("Failed enumerating adapters: {err}");
                    break;
                }
            };
            let desc = match unsafe { raw.GetDesc1() } {
                Ok(desc) => desc,
                Err(err) => {
                    log::warn!("Skipping adapter {index}: {err}");
                    continue;
                }
            };

            // Adapters that cannot host a D3D12 device are not exposed.
            let device = match self
                .d3d12
                .create_device(&raw, Direct3D::D3D_FEATURE_LEVEL_11_0)
            {
                Ok(device) => device,
                Err(status) => {
                    log::info!("Adapter {index} has no D3D12 support: {status}");
                    continue;
                }
            };
            let info = adapter_info(&raw, &desc, &device);
            adapters.push(Adapter {
                raw,
                info,
                d3d12: Arc::clone(&self.d3d12),
            });
        }
        adapters
    }

    fn supports_allow_tearing(&self) -> bool {
        self.supports_allow_tearing
    }

    fn create_window(
        &self,
        handle: raw_window_handle::RawWindowHandle,
    ) -> Result<Window, crate::InstanceError> {
        match handle {
            raw_window_handle::RawWindowHandle::Win32(handle) => {
                Ok(Window(Foundation::HWND(handle.hwnd.get() as *mut _)))
            }
            _ => Err(crate::InstanceError::new(format!(
                "unsupported window: {handle:?}"
            ))),
        }
    }

    fn create_swap_chain_for_window(
        &self,
        queue: &Queue,
        window: &Window,
        desc: &SwapChainDesc,
    ) -> Result<SwapChain, Status> {
        let raw_desc = Dxgi::DXGI_SWAP_CHAIN_DESC1 {
            AlphaMode: Dxgi::Common::DXGI_ALPHA_MODE_IGNORE,
            BufferCount: desc.buffer_count,
            Width: desc.width,
            Height: desc.height,
            Format: conv::format(desc.format),
            Flags: desc.flags.bits(),
            BufferUsage: Dxgi::DXGI_USAGE_RENDER_TARGET_OUTPUT,
            SampleDesc: Dxgi::Common::DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Scaling: Dxgi::DXGI_SCALING_STRETCH,
            Stereo: false.into(),
            SwapEffect: Dxgi::DXGI_SWAP_EFFECT_FLIP_DISCARD,
        };
        let swap_chain1 = unsafe {
            self.factory
                .CreateSwapChainForHwnd(&queue.raw, window.0, &raw_desc, None, None)
        }
        .into_status()?;
        let raw = swap_chain1
            .cast::<Dxgi::IDXGISwapChain3>()
            .into_status()?;
        Ok(SwapChain { raw })
    }

    fn make_window_association(
        &self,
        window: &Window,
        flags: WindowAssociation,
    ) -> Result<(), Status> {
        let raw_flags = [
            (
                WindowAssociation::NO_WINDOW_CHANGES,
                Dxgi::DXGI_MWA_NO_WINDOW_CHANGES,
            ),
            (WindowAssociation::NO_ALT_ENTER, Dxgi::DXGI_MWA_NO_ALT_ENTER),
            (
                WindowAssociation::NO_PRINT_SCREEN,
                Dxgi::DXGI_MWA_NO_PRINT_SCREEN,
            ),
        ]
        .into_iter()
        .filter(|&(flag, _)| flags.contains(flag))
        .fold(Default::default(), |acc, (_, raw)| acc | raw);
        unsafe { self.factory.MakeWindowAssociation(window.0, raw_flags) }.into_status()
    }
}

fn adapter_info(
    raw: &Dxgi::IDXGIAdapter1,
    desc: &Dxgi::DXGI_ADAPTER_DESC1,
    device: &Direct3D12::ID3D12Device,
) -> crate::AdapterInfo {
    let name_len = desc
        .Description
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(desc.Description.len());
    let name = String::from_utf16_lossy(&desc.Description[..name_len]);

    let device_type = if (desc.Flags & Dxgi::DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32) != 0 {
        crate::DeviceType::Cpu
    } else {
        let mut features_architecture = Direct3D12::D3D12_FEATURE_DATA_ARCHITECTURE::default();
        let hr = unsafe {
            device.CheckFeatureSupport(
                Direct3D12::D3D12_FEATURE_ARCHITECTURE,
                <*mut _>::cast(&mut features_architecture),
                mem::size_of_val(&features_architecture) as u32,
            )
        };
        match hr {
            Ok(()) if features_architecture.UMA.as_bool() => crate::DeviceType::IntegratedGpu,
            Ok(()) => crate::DeviceType::DiscreteGpu,
            Err(err) => {
                log::warn!("Unable to query the adapter architecture: {err}");
                crate::DeviceType::Other
            }
        }
    };

    let driver_info = match unsafe { raw.CheckInterfaceSupport(&Dxgi::IDXGIDevice::IID) } {
        Ok(umd_version) => {
            let v = umd_version as u64;
            format!(
                "{}.{}.{}.{}",
                v >> 48,
                (v >> 32) & 0xFFFF,
                (v >> 16) & 0xFFFF,
                v & 0xFFFF
            )
        }
        Err(_) => String::new(),
    };

    crate::AdapterInfo {
        name,
        vendor: desc.VendorId,
        device: desc.DeviceId,
        device_type,
        driver_info,
    }
}

#[derive(Debug)]
pub struct Adapter {
    raw: Dxgi::IDXGIAdapter1,
    info: crate::AdapterInfo,
    d3d12: Arc<D3D12Lib>,
}

unsafe impl Send for Adapter {}
unsafe impl Sync for Adapter {}

impl super::RawAdapter<D3d12> for Adapter {
    fn info(&self) -> crate::AdapterInfo {
        self.info.clone()
    }

    fn create_device(&self) -> Result<Device, Status> {
        profiling::scope!("D3D12CreateDevice");
        let raw = self
            .d3d12
            .create_device(&self.raw, Direct3D::D3D_FEATURE_LEVEL_11_0)?;
        Ok(Device {
            raw,
            d3d12: Arc::clone(&self.d3d12),
        })
    }
}

#[derive(Debug)]
pub struct Device {
    raw: Direct3D12::ID3D12Device,
    d3d12: Arc<D3D12Lib>,
}

unsafe impl Send for Device {}
unsafe impl Sync for Device {}

impl super::RawDevice<D3d12> for Device {
    fn create_command_queue(&self) -> Result<Queue, Status> {
        let raw = unsafe {
            self.raw.CreateCommandQueue::<Direct3D12::ID3D12CommandQueue>(
                &Direct3D12::D3D12_COMMAND_QUEUE_DESC {
                    Type: Direct3D12::D3D12_COMMAND_LIST_TYPE_DIRECT,
                    Priority: Direct3D12::D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
                    Flags: Direct3D12::D3D12_COMMAND_QUEUE_FLAG_NONE,
                    NodeMask: 0,
                },
            )
        }
        .into_status()?;
        Ok(Queue { raw })
    }

    fn descriptor_increment_size(&self, ty: DescriptorHeapType) -> u32 {
        unsafe {
            self.raw
                .GetDescriptorHandleIncrementSize(conv::descriptor_heap_type(ty))
        }
    }

    fn create_descriptor_heap(
        &self,
        ty: DescriptorHeapType,
        count: u32,
        shader_visible: bool,
    ) -> Result<DescriptorHeap, Status> {
        let desc = Direct3D12::D3D12_DESCRIPTOR_HEAP_DESC {
            Type: conv::descriptor_heap_type(ty),
            NumDescriptors: count,
            Flags: if shader_visible {
                Direct3D12::D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
            } else {
                Direct3D12::D3D12_DESCRIPTOR_HEAP_FLAG_NONE
            },
            NodeMask: 0,
        };
        let raw = unsafe {
            self.raw
                .CreateDescriptorHeap::<Direct3D12::ID3D12DescriptorHeap>(&desc)
        }
        .into_status()?;
        Ok(DescriptorHeap { raw, shader_visible })
    }

    fn create_committed_resource(
        &self,
        heap: HeapType,
        desc: &ResourceDesc,
        initial_state: ResourceStates,
        clear_value: Option<ClearValue>,
    ) -> Result<Resource, Status> {
        let heap_properties = conv::heap_properties(heap);
        let raw_desc = raw_resource_desc(desc);
        let raw_clear = clear_value.map(|value| match value {
            ClearValue::Color(format, color) => Direct3D12::D3D12_CLEAR_VALUE {
                Format: conv::format(format),
                Anonymous: Direct3D12::D3D12_CLEAR_VALUE_0 { Color: color },
            },
            ClearValue::DepthStencil(format, depth, stencil) => Direct3D12::D3D12_CLEAR_VALUE {
                Format: conv::format(format),
                Anonymous: Direct3D12::D3D12_CLEAR_VALUE_0 {
                    DepthStencil: Direct3D12::D3D12_DEPTH_STENCIL_VALUE {
                        Depth: depth,
                        Stencil: stencil,
                    },
                },
            },
        });

        let mut resource = None::<Direct3D12::ID3D12Resource>;
        unsafe {
            self.raw.CreateCommittedResource(
                &heap_properties,
                Direct3D12::D3D12_HEAP_FLAG_NONE,
                &raw_desc,
                conv::states(initial_state),
                raw_clear.as_ref().map(ptr::from_ref),
                &mut resource,
            )
        }
        .into_status()?;
        resource.map(|raw| Resource { raw }).ok_or(Status::E_FAIL)
    }

    fn create_constant_buffer_view(&self, desc: &ConstantBufferViewDesc, dest: CpuDescriptor) {
        let raw_desc = Direct3D12::D3D12_CONSTANT_BUFFER_VIEW_DESC {
            BufferLocation: desc.buffer_location,
            SizeInBytes: desc.size_in_bytes,
        };
        unsafe {
            self.raw
                .CreateConstantBufferView(Some(&raw_desc), cpu_handle(dest))
        }
    }

    fn create_shader_resource_view(
        &self,
        resource: &Resource,
        desc: &ShaderResourceViewDesc,
        dest: CpuDescriptor,
    ) {
        use super::SrvDimension as Sd;
        let (dimension, anonymous) = match desc.dimension {
            Sd::RawBuffer {
                first_element,
                num_elements,
            } => (
                Direct3D12::D3D12_SRV_DIMENSION_BUFFER,
                Direct3D12::D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Buffer: Direct3D12::D3D12_BUFFER_SRV {
                        FirstElement: first_element,
                        NumElements: num_elements,
                        StructureByteStride: 0,
                        Flags: Direct3D12::D3D12_BUFFER_SRV_FLAG_RAW,
                    },
                },
            ),
            Sd::Texture1D {
                most_detailed_mip,
                mip_levels,
            } => (
                Direct3D12::D3D12_SRV_DIMENSION_TEXTURE1D,
                Direct3D12::D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture1D: Direct3D12::D3D12_TEX1D_SRV {
                        MostDetailedMip: most_detailed_mip,
                        MipLevels: mip_levels,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            ),
            Sd::Texture2D {
                most_detailed_mip,
                mip_levels,
            } => (
                Direct3D12::D3D12_SRV_DIMENSION_TEXTURE2D,
                Direct3D12::D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture2D: Direct3D12::D3D12_TEX2D_SRV {
                        MostDetailedMip: most_detailed_mip,
                        MipLevels: mip_levels,
                        PlaneSlice: 0,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            ),
            Sd::Texture2DArray {
                most_detailed_mip,
                mip_levels,
                first_array_slice,
                array_size,
            } => (
                Direct3D12::D3D12_SRV_DIMENSION_TEXTURE2DARRAY,
                Direct3D12::D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture2DArray: Direct3D12::D3D12_TEX2D_ARRAY_SRV {
                        MostDetailedMip: most_detailed_mip,
                        MipLevels: mip_levels,
                        FirstArraySlice: first_array_slice,
                        ArraySize: array_size,
                        PlaneSlice: 0,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            ),
            Sd::Texture2DMs => (
                Direct3D12::D3D12_SRV_DIMENSION_TEXTURE2DMS,
                Direct3D12::D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture2DMS: Direct3D12::D3D12_TEX2DMS_SRV {
                        UnusedField_NothingToDefine: 0,
                    },
                },
            ),
            Sd::TextureCube {
                most_detailed_mip,
                mip_levels,
            } => (
                Direct3D12::D3D12_SRV_DIMENSION_TEXTURECUBE,
                Direct3D12::D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    TextureCube: Direct3D12::D3D12_TEXCUBE_SRV {
                        MostDetailedMip: most_detailed_mip,
                        MipLevels: mip_levels,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            ),
            Sd::TextureCubeArray {
                most_detailed_mip,
                mip_levels,
                first_2d_array_face,
                num_cubes,
            } => (
                Direct3D12::D3D12_SRV_DIMENSION_TEXTURECUBEARRAY,
                Direct3D12::D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    TextureCubeArray: Direct3D12::D3D12_TEXCUBE_ARRAY_SRV {
                        MostDetailedMip: most_detailed_mip,
                        MipLevels: mip_levels,
                        First2DArrayFace: first_2d_array_face,
                        NumCubes: num_cubes,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            ),
            Sd::Texture3D {
                most_detailed_mip,
                mip_levels,
            } => (
                Direct3D12::D3D12_SRV_DIMENSION_TEXTURE3D,
                Direct3D12::D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture3D: Direct3D12::D3D12_TEX3D_SRV {
                        MostDetailedMip: most_detailed_mip,
                        MipLevels: mip_levels,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            ),
        };
        let raw_desc = Direct3D12::D3D12_SHADER_RESOURCE_VIEW_DESC {
            Format: conv::format(desc.format),
            ViewDimension: dimension,
            Shader4ComponentMapping: Direct3D12::D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
            Anonymous: anonymous,
        };
        unsafe {
            self.raw
                .CreateShaderResourceView(&resource.raw, Some(&raw_desc), cpu_handle(dest))
        }
    }

    fn create_unordered_access_view(
        &self,
        resource: &Resource,
        desc: &UnorderedAccessViewDesc,
        dest: CpuDescriptor,
    ) {
        use super::UavDimension as Ud;
        let (dimension, anonymous) = match desc.dimension {
            Ud::RawBuffer {
                first_element,
                num_elements,
            } => (
                Direct3D12::D3D12_UAV_DIMENSION_BUFFER,
                Direct3D12::D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Buffer: Direct3D12::D3D12_BUFFER_UAV {
                        FirstElement: first_element,
                        NumElements: num_elements,
                        StructureByteStride: 0,
                        CounterOffsetInBytes: 0,
                        Flags: Direct3D12::D3D12_BUFFER_UAV_FLAG_RAW,
                    },
                },
            ),
            Ud::Texture1D { mip_slice } => (
                Direct3D12::D3D12_UAV_DIMENSION_TEXTURE1D,
                Direct3D12::D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Texture1D: Direct3D12::D3D12_TEX1D_UAV {
                        MipSlice: mip_slice,
                    },
                },
            ),
            Ud::Texture2D { mip_slice } => (
                Direct3D12::D3D12_UAV_DIMENSION_TEXTURE2D,
                Direct3D12::D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Texture2D: Direct3D12::D3D12_TEX2D_UAV {
                        MipSlice: mip_slice,
                        PlaneSlice: 0,
                    },
                },
            ),
            Ud::Texture2DArray {
                mip_slice,
                first_array_slice,
                array_size,
            } => (
                Direct3D12::D3D12_UAV_DIMENSION_TEXTURE2DARRAY,
                Direct3D12::D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Texture2DArray: Direct3D12::D3D12_TEX2D_ARRAY_UAV {
                        MipSlice: mip_slice,
                        FirstArraySlice: first_array_slice,
                        ArraySize: array_size,
                        PlaneSlice: 0,
                    },
                },
            ),
            Ud::Texture3D {
                mip_slice,
                first_w_slice,
                w_size,
            } => (
                Direct3D12::D3D12_UAV_DIMENSION_TEXTURE3D,
                Direct3D12::D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Texture3D: Direct3D12::D3D12_TEX3D_UAV {
                        MipSlice: mip_slice,
                        FirstWSlice: first_w_slice,
                        WSize: w_size,
                    },
                },
            ),
        };
        let raw_desc = Direct3D12::D3D12_UNORDERED_ACCESS_VIEW_DESC {
            Format: conv::format(desc.format),
            ViewDimension: dimension,
            Anonymous: anonymous,
        };
        unsafe {
            self.raw.CreateUnorderedAccessView(
                &resource.raw,
                None,
                Some(&raw_desc),
                cpu_handle(dest),
            )
        }
    }

    fn create_render_target_view(
        &self,
        resource: &Resource,
        desc: Option<&RenderTargetViewDesc>,
        dest: CpuDescriptor,
    ) {
        use super::RtvDimension as Rd;
        let raw_desc = desc.map(|desc| {
            let (dimension, anonymous) = match desc.dimension {
                Rd::Texture1D { mip_slice } => (
                    Direct3D12::D3D12_RTV_DIMENSION_TEXTURE1D,
                    Direct3D12::D3D12_RENDER_TARGET_VIEW_DESC_0 {
                        Texture1D: Direct3D12::D3D12_TEX1D_RTV {
                            MipSlice: mip_slice,
                        },
                    },
                ),
                Rd::Texture2D { mip_slice } => (
                    Direct3D12::D3D12_RTV_DIMENSION_TEXTURE2D,
                    Direct3D12::D3D12_RENDER_TARGET_VIEW_DESC_0 {
                        Texture2D: Direct3D12::D3D12_TEX2D_RTV {
                            MipSlice: mip_slice,
                            PlaneSlice: 0,
                        },
                    },
                ),
                Rd::Texture2DArray {
                    mip_slice,
                    first_array_slice,
                    array_size,
                } => (
                    Direct3D12::D3D12_RTV_DIMENSION_TEXTURE2DARRAY,
                    Direct3D12::D3D12_RENDER_TARGET_VIEW_DESC_0 {
                        Texture2DArray: Direct3D12::D3D12_TEX2D_ARRAY_RTV {
                            MipSlice: mip_slice,
                            FirstArraySlice: first_array_slice,
                            ArraySize: array_size,
                            PlaneSlice: 0,
                        },
                    },
                ),
                Rd::Texture2DMs => (
                    Direct3D12::D3D12_RTV_DIMENSION_TEXTURE2DMS,
                    Direct3D12::D3D12_RENDER_TARGET_VIEW_DESC_0 {
                        Texture2DMS: Direct3D12::D3D12_TEX2DMS_RTV {
                            UnusedField_NothingToDefine: 0,
                        },
                    },
                ),
                Rd::Texture3D {
                    mip_slice,
                    first_w_slice,
                    w_size,
                } => (
                    Direct3D12::D3D12_RTV_DIMENSION_TEXTURE3D,
                    Direct3D12::D3D12_RENDER_TARGET_VIEW_DESC_0 {
                        Texture3D: Direct3D12::D3D12_TEX3D_RTV {
                            MipSlice: mip_slice,
                            FirstWSlice: first_w_slice,
                            WSize: w_size,
                        },
                    },
                ),
            };
            Direct3D12::D3D12_RENDER_TARGET_VIEW_DESC {
                Format: conv::format(desc.format),
                ViewDimension: dimension,
                Anonymous: anonymous,
            }
        });
        unsafe {
            self.raw.CreateRenderTargetView(
                &resource.raw,
                raw_desc.as_ref().map(ptr::from_ref),
                cpu_handle(dest),
            )
        }
    }

    fn create_depth_stencil_view(
        &self,
        resource: &Resource,
        desc: &DepthStencilViewDesc,
        dest: CpuDescriptor,
    ) {
        use super::DsvDimension as Dd;
        let (dimension, anonymous) = match desc.dimension {
            Dd::Texture1D { mip_slice } => (
                Direct3D12::D3D12_DSV_DIMENSION_TEXTURE1D,
                Direct3D12::D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                    Texture1D: Direct3D12::D3D12_TEX1D_DSV {
                        MipSlice: mip_slice,
                    },
                },
            ),
            Dd::Texture2D { mip_slice } => (
                Direct3D12::D3D12_DSV_DIMENSION_TEXTURE2D,
                Direct3D12::D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                    Texture2D: Direct3D12::D3D12_TEX2D_DSV {
                        MipSlice: mip_slice,
                    },
                },
            ),
            Dd::Texture2DArray {
                mip_slice,
                first_array_slice,
                array_size,
            } => (
                Direct3D12::D3D12_DSV_DIMENSION_TEXTURE2DARRAY,
                Direct3D12::D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                    Texture2DArray: Direct3D12::D3D12_TEX2D_ARRAY_DSV {
                        MipSlice: mip_slice,
                        FirstArraySlice: first_array_slice,
                        ArraySize: array_size,
                    },
                },
            ),
            Dd::Texture2DMs => (
                Direct3D12::D3D12_DSV_DIMENSION_TEXTURE2DMS,
                Direct3D12::D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                    Texture2DMS: Direct3D12::D3D12_TEX2DMS_DSV {
                        UnusedField_NothingToDefine: 0,
                    },
                },
            ),
        };
        let raw_desc = Direct3D12::D3D12_DEPTH_STENCIL_VIEW_DESC {
            Format: conv::format(desc.format),
            ViewDimension: dimension,
            Flags: Direct3D12::D3D12_DSV_FLAGS(desc.flags.bits() as i32),
            Anonymous: anonymous,
        };
        unsafe {
            self.raw
                .CreateDepthStencilView(&resource.raw, Some(&raw_desc), cpu_handle(dest))
        }
    }

    fn create_sampler(&self, desc: &SamplerDesc, dest: CpuDescriptor) {
        let raw_desc = Direct3D12::D3D12_SAMPLER_DESC {
            Filter: conv::filter(desc),
            AddressU: conv::address_mode(desc.address[0]),
            AddressV: conv::address_mode(desc.address[1]),
            AddressW: conv::address_mode(desc.address[2]),
            MipLODBias: desc.mip_lod_bias,
            MaxAnisotropy: desc.max_anisotropy,
            ComparisonFunc: conv::comparison(desc.comparison_func),
            BorderColor: desc.border_color,
            MinLOD: desc.min_lod,
            MaxLOD: desc.max_lod,
        };
        unsafe { self.raw.CreateSampler(&raw_desc, cpu_handle(dest)) }
    }

    fn copy_descriptors_simple(
        &self,
        count: u32,
        dest: CpuDescriptor,
        src: CpuDescriptor,
        ty: DescriptorHeapType,
    ) {
        unsafe {
            self.raw.CopyDescriptorsSimple(
                count,
                cpu_handle(dest),
                cpu_handle(src),
                conv::descriptor_heap_type(ty),
            )
        }
    }

    fn create_command_allocator(&self) -> Result<CommandAllocator, Status> {
        let raw = unsafe {
            self.raw
                .CreateCommandAllocator::<Direct3D12::ID3D12CommandAllocator>(
                    Direct3D12::D3D12_COMMAND_LIST_TYPE_DIRECT,
                )
        }
        .into_status()?;
        Ok(CommandAllocator { raw })
    }

    fn create_command_list(&self, allocator: &CommandAllocator) -> Result<CommandList, Status> {
        let raw = unsafe {
            self.raw
                .CreateCommandList::<_, _, Direct3D12::ID3D12GraphicsCommandList>(
                    0,
                    Direct3D12::D3D12_COMMAND_LIST_TYPE_DIRECT,
                    &allocator.raw,
                    None,
                )
        }
        .into_status()?;
        Ok(CommandList { raw })
    }

    fn create_fence(&self, initial_value: u64) -> Result<Fence, Status> {
        let raw = unsafe {
            self.raw
                .CreateFence::<Direct3D12::ID3D12Fence>(
                    initial_value,
                    Direct3D12::D3D12_FENCE_FLAG_NONE,
                )
        }
        .into_status()?;
        Ok(Fence { raw })
    }

    fn create_event(&self) -> Result<Event, Status> {
        let raw = unsafe { Threading::CreateEventA(None, false, false, None) }.into_status()?;
        Ok(Event(raw))
    }

    fn serialize_root_signature(&self, desc: &RootSignatureDesc) -> Result<Vec<u8>, Diagnostic> {
        let ranges = desc
            .parameters
            .iter()
            .map(|param| match *param {
                super::RootParameter::DescriptorTable { ref ranges, .. } => ranges
                    .iter()
                    .map(|range| Direct3D12::D3D12_DESCRIPTOR_RANGE {
                        RangeType: conv::range_type(range.ty),
                        NumDescriptors: range.count,
                        BaseShaderRegister: range.base_shader_register,
                        RegisterSpace: range.register_space,
                        OffsetInDescriptorsFromTableStart: range.offset_in_table,
                    })
                    .collect::<Vec<_>>(),
            })
            .collect::<Vec<_>>();
        let parameters = desc
            .parameters
            .iter()
            .zip(ranges.iter())
            .map(|(param, raw_ranges)| match *param {
                super::RootParameter::DescriptorTable { visibility, .. } => {
                    Direct3D12::D3D12_ROOT_PARAMETER {
                        ParameterType: Direct3D12::D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                        Anonymous: Direct3D12::D3D12_ROOT_PARAMETER_0 {
                            DescriptorTable: Direct3D12::D3D12_ROOT_DESCRIPTOR_TABLE {
                                NumDescriptorRanges: raw_ranges.len() as u32,
                                pDescriptorRanges: raw_ranges.as_ptr(),
                            },
                        },
                        ShaderVisibility: conv::visibility(visibility),
                    }
                }
            })
            .collect::<Vec<_>>();

        let raw_desc = Direct3D12::D3D12_ROOT_SIGNATURE_DESC {
            NumParameters: parameters.len() as u32,
            pParameters: if parameters.is_empty() {
                ptr::null()
            } else {
                parameters.as_ptr()
            },
            NumStaticSamplers: 0,
            pStaticSamplers: ptr::null(),
            Flags: Direct3D12::D3D12_ROOT_SIGNATURE_FLAGS(desc.flags.bits() as i32),
        };
        self.d3d12.serialize_root_signature(&raw_desc)
    }

    fn create_root_signature(&self, blob: &[u8]) -> Result<RootSignature, Status> {
        let raw = unsafe {
            self.raw
                .CreateRootSignature::<Direct3D12::ID3D12RootSignature>(0, blob)
        }
        .into_status()?;
        Ok(RootSignature { raw })
    }

    fn create_graphics_pipeline_state(
        &self,
        desc: &GraphicsPipelineDesc<'_, D3d12>,
    ) -> Result<PipelineState, Status> {
        let input_element_descs = desc
            .input_layout
            .iter()
            .map(|element| Direct3D12::D3D12_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(b"LOC\0".as_ptr()),
                SemanticIndex: element.semantic_index,
                Format: conv::format(element.format),
                InputSlot: element.input_slot,
                AlignedByteOffset: element.aligned_byte_offset,
                InputSlotClass: match element.classification {
                    super::InputClassification::PerVertex => {
                        Direct3D12::D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA
                    }
                    super::InputClassification::PerInstance => {
                        Direct3D12::D3D12_INPUT_CLASSIFICATION_PER_INSTANCE_DATA
                    }
                },
                InstanceDataStepRate: element.instance_data_step_rate,
            })
            .collect::<Vec<_>>();

        let mut rtv_formats = [Dxgi::Common::DXGI_FORMAT_UNKNOWN;
            Direct3D12::D3D12_SIMULTANEOUS_RENDER_TARGET_COUNT as usize];
        for (raw, &format) in rtv_formats.iter_mut().zip(desc.rtv_formats.iter()) {
            *raw = conv::format(format);
        }

        let raw_desc = Direct3D12::D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            pRootSignature: unsafe { borrow_interface_temporarily(&desc.root_signature.raw) },
            VS: shader_bytecode(desc.vertex_shader),
            PS: desc
                .pixel_shader
                .map_or_else(Direct3D12::D3D12_SHADER_BYTECODE::default, shader_bytecode),
            GS: Direct3D12::D3D12_SHADER_BYTECODE::default(),
            DS: Direct3D12::D3D12_SHADER_BYTECODE::default(),
            HS: Direct3D12::D3D12_SHADER_BYTECODE::default(),
            StreamOutput: Direct3D12::D3D12_STREAM_OUTPUT_DESC {
                pSODeclaration: ptr::null(),
                NumEntries: 0,
                pBufferStrides: ptr::null(),
                NumStrides: 0,
                RasterizedStream: 0,
            },
            BlendState: Direct3D12::D3D12_BLEND_DESC {
                AlphaToCoverageEnable: desc.alpha_to_coverage.into(),
                IndependentBlendEnable: true.into(),
                RenderTarget: conv::render_targets(&desc.blend),
            },
            SampleMask: desc.sample_mask,
            RasterizerState: Direct3D12::D3D12_RASTERIZER_DESC {
                FillMode: Direct3D12::D3D12_FILL_MODE_SOLID,
                CullMode: conv::cull_mode(desc.rasterizer.cull_mode),
                FrontCounterClockwise: desc.rasterizer.front_counter_clockwise.into(),
                DepthBias: desc.rasterizer.depth_bias,
                DepthBiasClamp: desc.rasterizer.depth_bias_clamp,
                SlopeScaledDepthBias: desc.rasterizer.slope_scaled_depth_bias,
                DepthClipEnable: desc.rasterizer.depth_clip_enable.into(),
                MultisampleEnable: (desc.sample_count > 1).into(),
                ForcedSampleCount: 0,
                AntialiasedLineEnable: false.into(),
                ConservativeRaster: Direct3D12::D3D12_CONSERVATIVE_RASTERIZATION_MODE_OFF,
            },
            DepthStencilState: match desc.depth_stencil {
                Some(ref ds) => conv::depth_stencil(ds),
                None => Default::default(),
            },
            InputLayout: Direct3D12::D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: if input_element_descs.is_empty() {
                    ptr::null()
                } else {
                    input_element_descs.as_ptr()
                },
                NumElements: input_element_descs.len() as u32,
            },
            IBStripCutValue: match desc.strip_cut {
                Some(crate::IndexFormat::Uint16) => {
                    Direct3D12::D3D12_INDEX_BUFFER_STRIP_CUT_VALUE_0xFFFF
                }
                Some(crate::IndexFormat::Uint32) => {
                    Direct3D12::D3D12_INDEX_BUFFER_STRIP_CUT_VALUE_0xFFFFFFFF
                }
                None => Direct3D12::D3D12_INDEX_BUFFER_STRIP_CUT_VALUE_DISABLED,
            },
            PrimitiveTopologyType: conv::topology_type(desc.primitive_topology_type),
            NumRenderTargets: desc.rtv_formats.len() as u32,
            RTVFormats: rtv_formats,
            DSVFormat: conv::format(desc.dsv_format),
            SampleDesc: Dxgi::Common::DXGI_SAMPLE_DESC {
                Count: desc.sample_count,
                Quality: 0,
            },
            NodeMask: 0,
            CachedPSO: Direct3D12::D3D12_CACHED_PIPELINE_STATE {
                pCachedBlob: ptr::null(),
                CachedBlobSizeInBytes: 0,
            },
            Flags: Direct3D12::D3D12_PIPELINE_STATE_FLAG_NONE,
        };

        let raw = {
            profiling::scope!("ID3D12Device::CreateGraphicsPipelineState");
            unsafe {
                self.raw
                    .CreateGraphicsPipelineState::<Direct3D12::ID3D12PipelineState>(&raw_desc)
            }
        }
        .into_status()?;
        if let Some(name) = desc.name {
            let _ = unsafe { raw.SetName(&HSTRING::from(name)) };
        }
        Ok(PipelineState { raw })
    }

    fn create_compute_pipeline_state(
        &self,
        desc: &ComputePipelineDesc<'_, D3d12>,
    ) -> Result<PipelineState, Status> {
        let raw_desc = Direct3D12::D3D12_COMPUTE_PIPELINE_STATE_DESC {
            pRootSignature: unsafe { borrow_interface_temporarily(&desc.root_signature.raw) },
            CS: shader_bytecode(desc.compute_shader),
            NodeMask: 0,
            CachedPSO: Direct3D12::D3D12_CACHED_PIPELINE_STATE::default(),
            Flags: Direct3D12::D3D12_PIPELINE_STATE_FLAG_NONE,
        };

        let raw = {
            profiling::scope!("ID3D12Device::CreateComputePipelineState");
            unsafe {
                self.raw
                    .CreateComputePipelineState::<Direct3D12::ID3D12PipelineState>(&raw_desc)
            }
        }
        .into_status()?;
        if let Some(name) = desc.name {
            let _ = unsafe { raw.SetName(&HSTRING::from(name)) };
        }
        Ok(PipelineState { raw })
    }

    fn removed_reason(&self) -> Status {
        match unsafe { self.raw.GetDeviceRemovedReason() } {
            Ok(()) => Status::OK,
            Err(err) => Status(err.code().0),
        }
    }
}

fn shader_bytecode(bytecode: &[u8]) -> Direct3D12::D3D12_SHADER_BYTECODE {
    Direct3D12::D3D12_SHADER_BYTECODE {
        pShaderBytecode: bytecode.as_ptr().cast(),
        BytecodeLength: bytecode.len(),
    }
}

#[derive(Clone, Debug)]
pub struct Queue {
    raw: Direct3D12::ID3D12CommandQueue,
}

unsafe impl Send for Queue {}
unsafe impl Sync for Queue {}

impl super::RawQueue<D3d12> for Queue {
    fn execute_command_lists(&self, lists: &[&CommandList]) {
        let temp_lists = lists
            .iter()
            .map(|list| Some(list.raw.clone().into()))
            .collect::<Vec<Option<Direct3D12::ID3D12CommandList>>>();
        unsafe { self.raw.ExecuteCommandLists(&temp_lists) }
    }

    fn signal(&self, fence: &Fence, value: u64) -> Result<(), Status> {
        unsafe { self.raw.Signal(&fence.raw, value) }.into_status()
    }
}

#[derive(Clone, Debug)]
pub struct Resource {
    raw: Direct3D12::ID3D12Resource,
}

unsafe impl Send for Resource {}
unsafe impl Sync for Resource {}

impl super::RawResource for Resource {
    fn desc(&self) -> ResourceDesc {
        let raw = unsafe { self.raw.GetDesc() };
        ResourceDesc {
            dimension: match raw.Dimension {
                Direct3D12::D3D12_RESOURCE_DIMENSION_TEXTURE1D => ResourceDimension::Texture1D,
                Direct3D12::D3D12_RESOURCE_DIMENSION_TEXTURE2D => ResourceDimension::Texture2D,
                Direct3D12::D3D12_RESOURCE_DIMENSION_TEXTURE3D => ResourceDimension::Texture3D,
                _ => ResourceDimension::Buffer,
            },
            width: raw.Width,
            height: raw.Height,
            depth_or_array_size: raw.DepthOrArraySize,
            mip_levels: raw.MipLevels,
            format: Format(raw.Format.0 as u32),
            sample_count: raw.SampleDesc.Count,
            flags: ResourceFlags::from_bits_truncate(raw.Flags.0 as u32),
        }
    }

    fn gpu_virtual_address(&self) -> u64 {
        unsafe { self.raw.GetGPUVirtualAddress() }
    }

    fn map(&self) -> Result<NonNull<u8>, Status> {
        let mut ptr = ptr::null_mut();
        unsafe { self.raw.Map(0, None, Some(&mut ptr)) }.into_status()?;
        NonNull::new(ptr.cast::<u8>()).ok_or(Status::E_FAIL)
    }

    fn unmap(&self) {
        unsafe { self.raw.Unmap(0, None) };
    }

    fn set_name(&self, name: &str) {
        let _ = unsafe { self.raw.SetName(&HSTRING::from(name)) };
    }
}

#[derive(Debug)]
pub struct DescriptorHeap {
    raw: Direct3D12::ID3D12DescriptorHeap,
    shader_visible: bool,
}

unsafe impl Send for DescriptorHeap {}
unsafe impl Sync for DescriptorHeap {}

impl super::RawDescriptorHeap for DescriptorHeap {
    fn cpu_start(&self) -> CpuDescriptor {
        CpuDescriptor {
            ptr: unsafe { self.raw.GetCPUDescriptorHandleForHeapStart() }.ptr,
        }
    }

    fn gpu_start(&self) -> GpuDescriptor {
        if !self.shader_visible {
            return GpuDescriptor::default();
        }
        GpuDescriptor {
            ptr: unsafe { self.raw.GetGPUDescriptorHandleForHeapStart() }.ptr,
        }
    }
}

#[derive(Debug)]
pub struct CommandAllocator {
    raw: Direct3D12::ID3D12CommandAllocator,
}

unsafe impl Send for CommandAllocator {}
unsafe impl Sync for CommandAllocator {}

impl super::RawCommandAllocator for CommandAllocator {
    fn reset(&self) -> Result<(), Status> {
        unsafe { self.raw.Reset() }.into_status()
    }
}

#[derive(Debug)]
pub struct CommandList {
    raw: Direct3D12::ID3D12GraphicsCommandList,
}

unsafe impl Send for CommandList {}
unsafe impl Sync for CommandList {}

impl super::RawCommandList<D3d12> for CommandList {
    fn reset(&self, allocator: &CommandAllocator) -> Result<(), Status> {
        unsafe { self.raw.Reset(&allocator.raw, None) }.into_status()
    }

    fn close(&self) -> Result<(), Status> {
        unsafe { self.raw.Close() }.into_status()
    }

    fn set_name(&self, name: &str) {
        let _ = unsafe { self.raw.SetName(&HSTRING::from(name)) };
    }

    fn resource_barrier(&self, barriers: &[Barrier<'_, D3d12>]) {
        if barriers.is_empty() {
            return;
        }
        let raw_barriers = barriers
            .iter()
            .map(|barrier| match *barrier {
                Barrier::Transition {
                    resource,
                    subresource,
                    before,
                    after,
                } => Direct3D12::D3D12_RESOURCE_BARRIER {
                    Type: Direct3D12::D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
                    Flags: Direct3D12::D3D12_RESOURCE_BARRIER_FLAG_NONE,
                    Anonymous: Direct3D12::D3D12_RESOURCE_BARRIER_0 {
                        Transition: mem::ManuallyDrop::new(
                            Direct3D12::D3D12_RESOURCE_TRANSITION_BARRIER {
                                pResource: unsafe { borrow_interface_temporarily(&resource.raw) },
                                Subresource: subresource,
                                StateBefore: conv::states(before),
                                StateAfter: conv::states(after),
                            },
                        ),
                    },
                },
                Barrier::Uav { resource } => Direct3D12::D3D12_RESOURCE_BARRIER {
                    Type: Direct3D12::D3D12_RESOURCE_BARRIER_TYPE_UAV,
                    Flags: Direct3D12::D3D12_RESOURCE_BARRIER_FLAG_NONE,
                    Anonymous: Direct3D12::D3D12_RESOURCE_BARRIER_0 {
                        UAV: mem::ManuallyDrop::new(Direct3D12::D3D12_RESOURCE_UAV_BARRIER {
                            pResource: unsafe { borrow_interface_temporarily(&resource.raw) },
                        }),
                    },
                },
            })
            .collect::<Vec<_>>();
        unsafe { self.raw.ResourceBarrier(&raw_barriers) }
    }

    fn copy_buffer_region(
        &self,
        dst: &Resource,
        dst_offset: u64,
        src: &Resource,
        src_offset: u64,
        size: u64,
    ) {
        unsafe {
            self.raw
                .CopyBufferRegion(&dst.raw, dst_offset, &src.raw, src_offset, size)
        }
    }

    fn copy_texture_region(
        &self,
        dst: &TextureCopyLocation<'_, D3d12>,
        dst_origin: crate::Origin3d,
        src: &TextureCopyLocation<'_, D3d12>,
        src_box: Option<&super::CopyBox>,
    ) {
        let raw_location = |location: &TextureCopyLocation<'_, D3d12>| match *location {
            TextureCopyLocation::Subresource(resource, index) => {
                Direct3D12::D3D12_TEXTURE_COPY_LOCATION {
                    pResource: unsafe { borrow_interface_temporarily(&resource.raw) },
                    Type: Direct3D12::D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
                    Anonymous: Direct3D12::D3D12_TEXTURE_COPY_LOCATION_0 {
                        SubresourceIndex: index,
                    },
                }
            }
            TextureCopyLocation::PlacedFootprint(resource, placed) => {
                Direct3D12::D3D12_TEXTURE_COPY_LOCATION {
                    pResource: unsafe { borrow_interface_temporarily(&resource.raw) },
                    Type: Direct3D12::D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
                    Anonymous: Direct3D12::D3D12_TEXTURE_COPY_LOCATION_0 {
                        PlacedFootprint: Direct3D12::D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
                            Offset: placed.offset,
                            Footprint: Direct3D12::D3D12_SUBRESOURCE_FOOTPRINT {
                                Format: conv::format(placed.footprint.format),
                                Width: placed.footprint.width,
                                Height: placed.footprint.height,
                                Depth: placed.footprint.depth,
                                RowPitch: placed.footprint.row_pitch,
                            },
                        },
                    },
                }
            }
        };
        let dst_location = raw_location(dst);
        let src_location = raw_location(src);
        let raw_box = src_box.map(|b| Direct3D12::D3D12_BOX {
            left: b.left,
            top: b.top,
            front: b.front,
            right: b.right,
            bottom: b.bottom,
            back: b.back,
        });
        unsafe {
            self.raw.CopyTextureRegion(
                &dst_location,
                dst_origin.x,
                dst_origin.y,
                dst_origin.z,
                &src_location,
                raw_box.as_ref().map(ptr::from_ref),
            )
        }
    }

    fn clear_render_target_view(&self, rtv: CpuDescriptor, color: [f32; 4]) {
        unsafe { self.raw.ClearRenderTargetView(cpu_handle(rtv), &color, None) }
    }

    fn clear_depth_stencil_view(&self, dsv: CpuDescriptor, depth: Option<f32>, stencil: Option<u8>) {
        let mut flags = Direct3D12::D3D12_CLEAR_FLAGS::default();
        if depth.is_some() {
            flags |= Direct3D12::D3D12_CLEAR_FLAG_DEPTH;
        }
        if stencil.is_some() {
            flags |= Direct3D12::D3D12_CLEAR_FLAG_STENCIL;
        }
        if flags.0 == 0 {
            return;
        }
        unsafe {
            self.raw.ClearDepthStencilView(
                cpu_handle(dsv),
                flags,
                depth.unwrap_or(0.0),
                stencil.unwrap_or(0),
                &[],
            )
        }
    }

    fn om_set_render_targets(&self, rtvs: &[CpuDescriptor], dsv: Option<CpuDescriptor>) {
        let raw_rtvs = rtvs.iter().map(|&rtv| cpu_handle(rtv)).collect::<Vec<_>>();
        let raw_dsv = dsv.map(cpu_handle);
        unsafe {
            self.raw.OMSetRenderTargets(
                raw_rtvs.len() as u32,
                if raw_rtvs.is_empty() {
                    None
                } else {
                    Some(raw_rtvs.as_ptr())
                },
                false,
                raw_dsv.as_ref().map(ptr::from_ref),
            )
        }
    }

    fn rs_set_viewports(&self, viewports: &[Viewport]) {
        let raw_viewports = viewports
            .iter()
            .map(|vp| Direct3D12::D3D12_VIEWPORT {
                TopLeftX: vp.top_left_x,
                TopLeftY: vp.top_left_y,
                Width: vp.width,
                Height: vp.height,
                MinDepth: vp.min_depth,
                MaxDepth: vp.max_depth,
            })
            .collect::<Vec<_>>();
        unsafe { self.raw.RSSetViewports(&raw_viewports) }
    }

    fn rs_set_scissor_rects(&self, rects: &[Rect]) {
        let raw_rects = rects
            .iter()
            .map(|rect| Foundation::RECT {
                left: rect.left,
                top: rect.top,
                right: rect.right,
                bottom: rect.bottom,
            })
            .collect::<Vec<_>>();
        unsafe { self.raw.RSSetScissorRects(&raw_rects) }
    }

    fn om_set_blend_factor(&self, factor: [f32; 4]) {
        unsafe { self.raw.OMSetBlendFactor(Some(&factor)) }
    }

    fn om_set_stencil_ref(&self, value: u32) {
        unsafe { self.raw.OMSetStencilRef(value) }
    }

    fn set_descriptor_heaps(&self, heaps: &[&DescriptorHeap]) {
        let raw_heaps = heaps
            .iter()
            .map(|heap| Some(heap.raw.clone()))
            .collect::<Vec<_>>();
        unsafe { self.raw.SetDescriptorHeaps(&raw_heaps) }
    }

    fn set_graphics_root_signature(&self, signature: &RootSignature) {
        unsafe { self.raw.SetGraphicsRootSignature(&signature.raw) }
    }

    fn set_compute_root_signature(&self, signature: &RootSignature) {
        unsafe { self.raw.SetComputeRootSignature(&signature.raw) }
    }

    fn set_graphics_root_descriptor_table(&self, index: u32, base: GpuDescriptor) {
        unsafe {
            self.raw.SetGraphicsRootDescriptorTable(
                index,
                Direct3D12::D3D12_GPU_DESCRIPTOR_HANDLE { ptr: base.ptr },
            )
        }
    }

    fn set_compute_root_descriptor_table(&self, index: u32, base: GpuDescriptor) {
        unsafe {
            self.raw.SetComputeRootDescriptorTable(
                index,
                Direct3D12::D3D12_GPU_DESCRIPTOR_HANDLE { ptr: base.ptr },
            )
        }
    }

    fn set_pipeline_state(&self, pipeline: &PipelineState) {
        unsafe { self.raw.SetPipelineState(&pipeline.raw) }
    }

    fn ia_set_primitive_topology(&self, topology: PrimitiveTopology) {
        unsafe { self.raw.IASetPrimitiveTopology(conv::topology(topology)) }
    }

    fn ia_set_vertex_buffers(&self, start_slot: u32, views: &[VertexBufferView]) {
        let raw_views = views
            .iter()
            .map(|view| Direct3D12::D3D12_VERTEX_BUFFER_VIEW {
                BufferLocation: view.buffer_location,
                SizeInBytes: view.size_in_bytes,
                StrideInBytes: view.stride_in_bytes,
            })
            .collect::<Vec<_>>();
        unsafe {
            self.raw
                .IASetVertexBuffers(start_slot, Some(raw_views.as_slice()))
        }
    }

    fn ia_set_index_buffer(&self, view: &IndexBufferView) {
        let raw_view = Direct3D12::D3D12_INDEX_BUFFER_VIEW {
            BufferLocation: view.buffer_location,
            SizeInBytes: view.size_in_bytes,
            Format: conv::format(view.format),
        };
        unsafe { self.raw.IASetIndexBuffer(Some(&raw_view)) }
    }

    fn draw_instanced(
        &self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) {
        unsafe {
            self.raw
                .DrawInstanced(vertex_count, instance_count, start_vertex, start_instance)
        }
    }

    fn draw_indexed_instanced(
        &self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        unsafe {
            self.raw.DrawIndexedInstanced(
                index_count,
                instance_count,
                start_index,
                base_vertex,
                start_instance,
            )
        }
    }

    fn dispatch(&self, x: u32, y: u32, z: u32) {
        unsafe { self.raw.Dispatch(x, y, z) }
    }

    fn begin_event(&self, name: &str) {
        let (wide, size) = wide_marker(name);
        unsafe { self.raw.BeginEvent(0, Some(wide.as_ptr().cast()), size) }
    }

    fn end_event(&self) {
        unsafe { self.raw.EndEvent() }
    }

    fn set_marker(&self, name: &str) {
        let (wide, size) = wide_marker(name);
        unsafe { self.raw.SetMarker(0, Some(wide.as_ptr().cast()), size) }
    }
}

#[derive(Debug)]
pub struct Fence {
    raw: Direct3D12::ID3D12Fence,
}

unsafe impl Send for Fence {}
unsafe impl Sync for Fence {}

impl super::RawFence<D3d12> for Fence {
    fn completed_value(&self) -> u64 {
        unsafe { self.raw.GetCompletedValue() }
    }

    fn set_event_on_completion(&self, value: u64, event: &Event) -> Result<(), Status> {
        unsafe { self.raw.SetEventOnCompletion(value, event.0) }.into_status()
    }
}

/// Auto-reset Win32 event.
#[derive(Debug)]
pub struct Event(Foundation::HANDLE);

unsafe impl Send for Event {}
unsafe impl Sync for Event {}

impl super::RawEvent for Event {
    fn wait(&self, timeout_ms: u32) -> WaitStatus {
        match unsafe { Threading::WaitForSingleObject(self.0, timeout_ms) } {
            Foundation::WAIT_OBJECT_0 => WaitStatus::Signaled,
            Foundation::WAIT_TIMEOUT => WaitStatus::Timeout,
            other => {
                log::error!("Unexpected wait status: 0x{:x}", other.0);
                WaitStatus::Failed
            }
        }
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        if let Err(err) = unsafe { Foundation::CloseHandle(self.0) } {
            log::warn!("Closing an event handle failed: {err}");
        }
    }
}

#[derive(Debug)]
pub struct RootSignature {
    raw: Direct3D12::ID3D12RootSignature,
}

unsafe impl Send for RootSignature {}
unsafe impl Sync for RootSignature {}

#[derive(Debug)]
pub struct PipelineState {
    raw: Direct3D12::ID3D12PipelineState,
}

unsafe impl Send for PipelineState {}
unsafe impl Sync for PipelineState {}

#[derive(Debug)]
pub struct SwapChain {
    raw: Dxgi::IDXGISwapChain3,
}

unsafe impl Send for SwapChain {}
unsafe impl Sync for SwapChain {}

impl super::RawSwapChain<D3d12> for SwapChain {
    fn buffer(&self, index: u32) -> Result<Resource, Status> {
        let raw = unsafe { self.raw.GetBuffer::<Direct3D12::ID3D12Resource>(index) }
            .into_status()?;
        Ok(Resource { raw })
    }

    fn current_back_buffer_index(&self) -> u32 {
        unsafe { self.raw.GetCurrentBackBufferIndex() }
    }

    fn resize_buffers(
        &self,
        buffer_count: u32,
        width: u32,
        height: u32,
        format: Format,
        flags: SwapChainFlags,
    ) -> Result<(), Status> {
        unsafe {
            self.raw.ResizeBuffers(
                buffer_count,
                width,
                height,
                conv::format(format),
                Dxgi::DXGI_SWAP_CHAIN_FLAG(flags.bits() as i32),
            )
        }
        .into_status()
    }

    fn present(&self, sync_interval: u32, flags: PresentFlags) -> Status {
        let hr = unsafe { self.raw.Present(sync_interval, Dxgi::DXGI_PRESENT(flags.bits())) };
        Status(hr.0)
    }
}

/// Win32 window a swapchain presents to.
#[derive(Debug)]
pub struct Window(Foundation::HWND);

unsafe impl Send for Window {}
unsafe impl Sync for Window {}
