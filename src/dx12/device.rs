use std::{
    num::NonZeroU32,
    ptr::NonNull,
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};

use arrayvec::ArrayVec;
use fxhash::FxHashMap;
use parking_lot::Mutex;

use super::{conv, descriptor, shader_compilation, DescriptorSlot, MappedPtr};
use crate::native::{
    self, DescriptorHeapType, DescriptorRange, DescriptorRangeType, Native, NativeResultExt as _,
    RawDevice as _, RawEvent as _, RawFence as _, RawResource as _, RootParameter,
};

/// Diagnostic snapshot of the device's descriptor heaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapReport {
    pub views: descriptor::HeapUsage,
    pub samplers: descriptor::HeapUsage,
    pub render_targets: descriptor::HeapUsage,
    pub depth_stencils: descriptor::HeapUsage,
    pub view_staging: descriptor::HeapUsage,
    pub sampler_staging: descriptor::HeapUsage,
}

/// A validated bind group entry waiting for its heap slot.
enum PendingWrite<'a, N: Native> {
    Sampler(native::CpuDescriptor),
    Constant(native::ConstantBufferViewDesc),
    ShaderResource(&'a N::Resource, native::ShaderResourceViewDesc),
    UnorderedAccess(&'a N::Resource, native::UnorderedAccessViewDesc),
    /// Copied from a staging descriptor.
    View(native::CpuDescriptor),
}

/// Root parameters derived from a list of bind group layouts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootLayout {
    pub parameters: Vec<RootParameter>,
    pub bind_group_infos: ArrayVec<super::BindGroupInfo, { crate::MAX_BIND_GROUPS }>,
}

/// Builds the root signature layout of a pipeline layout.
///
/// Every bind group contributes up to two descriptor tables, in this order:
///   1. CBV/SRV/UAV entries, if any
///   2. samplers, if any
///
/// Ranges land in `register_space = group index`, with the binding number as
/// the base register, and are appended in binding order. A table is visible
/// to a single stage when all of its entries are.
pub fn derive_root_layout(
    bind_group_layouts: &[&super::BindGroupLayout],
) -> Result<RootLayout, crate::DeviceError> {
    if bind_group_layouts.len() > crate::MAX_BIND_GROUPS {
        return Err(crate::DeviceError::InvalidArgument(format!(
            "{} bind groups, the limit is {}",
            bind_group_layouts.len(),
            crate::MAX_BIND_GROUPS
        )));
    }

    let mut parameters = Vec::new();
    let mut bind_group_infos = ArrayVec::new();
    for (index, bgl) in bind_group_layouts.iter().enumerate() {
        let space = index as u32;
        let mut info = super::BindGroupInfo::default();

        let mut ranges = Vec::new();
        let mut visibility = crate::ShaderStages::empty();
        for entry in bgl.entries.iter().filter(|entry| !entry.ty.is_sampler()) {
            ranges.push(DescriptorRange {
                ty: conv::map_binding_type(&entry.ty),
                count: 1,
                base_shader_register: entry.binding,
                register_space: space,
                offset_in_table: native::DESCRIPTOR_RANGE_OFFSET_APPEND,
            });
            visibility |= entry.visibility;
        }
        if !ranges.is_empty() {
            info.view_root_index = Some(parameters.len() as super::RootIndex);
            parameters.push(RootParameter::DescriptorTable {
                ranges,
                visibility: conv::map_visibility(visibility),
            });
        }

        let mut ranges = Vec::new();
        let mut visibility = crate::ShaderStages::empty();
        for entry in bgl.entries.iter().filter(|entry| entry.ty.is_sampler()) {
            ranges.push(DescriptorRange {
                ty: DescriptorRangeType::Sampler,
                count: 1,
                base_shader_register: entry.binding,
                register_space: space,
                offset_in_table: native::DESCRIPTOR_RANGE_OFFSET_APPEND,
            });
            visibility |= entry.visibility;
        }
        if !ranges.is_empty() {
            info.sampler_root_index = Some(parameters.len() as super::RootIndex);
            parameters.push(RootParameter::DescriptorTable {
                ranges,
                visibility: conv::map_visibility(visibility),
            });
        }

        bind_group_infos.push(info);
    }

    Ok(RootLayout {
        parameters,
        bind_group_infos,
    })
}

impl<N: Native> super::Device<N> {
    pub(super) fn new(
        shared: Arc<super::DeviceShared<N>>,
        flags: crate::InstanceFlags,
        shader_compiler: Option<Arc<dyn crate::ShaderCompiler>>,
    ) -> Self {
        Self {
            shared,
            empty_root_signature: Mutex::new(None),
            flags,
            shader_compiler,
            counters: Default::default(),
        }
    }

    pub fn raw(&self) -> &N::Device {
        &self.shared.raw
    }

    pub fn counters(&self) -> &crate::HalCounters {
        &self.counters
    }

    pub fn is_lost(&self) -> bool {
        self.shared.lost.load(Ordering::Acquire)
    }

    pub fn heap_report(&self) -> HeapReport {
        HeapReport {
            views: self.shared.heap_views.usage(),
            samplers: self.shared.heap_samplers.usage(),
            render_targets: self.shared.rtv_heap.usage(),
            depth_stencils: self.shared.dsv_heap.usage(),
            view_staging: self.shared.view_staging.usage(),
            sampler_staging: self.shared.sampler_staging.usage(),
        }
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_for_gpu(&self) -> Result<(), crate::DeviceError> {
        self.shared.wait_for_gpu()
    }

    fn set_name(&self, resource: &N::Resource, label: crate::Label) {
        if let Some(label) = label {
            if self.flags.contains(crate::InstanceFlags::DEBUG) {
                resource.set_name(label);
            }
        }
    }

    pub fn create_buffer(
        &self,
        desc: &crate::BufferDescriptor,
    ) -> Result<super::Buffer<N>, crate::DeviceError> {
        if desc.size == 0 {
            return Err(crate::DeviceError::InvalidArgument(
                "zero-sized buffer".to_string(),
            ));
        }
        let heap = conv::map_buffer_heap(desc.usage, desc.mapped_at_creation).ok_or_else(|| {
            crate::DeviceError::InvalidArgument(
                "MAP_READ and MAP_WRITE are mutually exclusive".to_string(),
            )
        })?;

        let mut size = desc.size;
        if desc.usage.contains(crate::BufferUses::UNIFORM) {
            size = conv::align_to_256(size).ok_or_else(|| {
                crate::DeviceError::InvalidArgument(format!(
                    "uniform buffer of {size} bytes cannot be padded to 256"
                ))
            })?;
        }

        let raw_desc = native::ResourceDesc::buffer(
            size,
            conv::map_buffer_usage_to_resource_flags(desc.usage),
        );
        let resource = {
            profiling::scope!("ID3D12Device::CreateCommittedResource");
            self.shared.raw.create_committed_resource(
                heap,
                &raw_desc,
                conv::map_heap_initial_state(heap),
                None,
            )
        }
        .into_device_result("Buffer creation")?;
        self.set_name(&resource, desc.label);

        let gpu_address = resource.gpu_virtual_address();
        let mapped = if desc.mapped_at_creation {
            let ptr = resource.map().into_device_result("Map buffer")?;
            Some(MappedPtr(ptr))
        } else {
            None
        };

        log::trace!(
            "Created buffer {:?} of {} bytes in {heap:?}",
            desc.label,
            desc.size
        );
        self.counters.buffers.add(1);
        self.counters.buffer_memory.add(size as isize);

        Ok(super::Buffer {
            resource,
            size: desc.size,
            allocated_size: size,
            usage: desc.usage,
            heap,
            gpu_address,
            mapped: Mutex::new(mapped),
        })
    }

    pub fn destroy_buffer(&self, buffer: super::Buffer<N>) {
        self.counters.buffer_memory.sub(buffer.allocated_size as isize);
        self.counters.buffers.sub(1);
        drop(buffer);
    }

    /// Maps an upload or readback buffer.
    ///
    /// Returns the address of `range.start`. The mapping stays valid until
    /// [`Self::unmap_buffer`] or until the buffer is dropped.
    pub fn map_buffer(
        &self,
        buffer: &super::Buffer<N>,
        range: crate::MemoryRange,
    ) -> Result<crate::BufferMapping, crate::DeviceError> {
        if buffer.heap == native::HeapType::Default {
            return Err(crate::DeviceError::InvalidArgument(
                "only upload and readback buffers can be mapped".to_string(),
            ));
        }
        if range.start > range.end || range.end > buffer.size {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "map range {range:?} outside of a {}-byte buffer",
                buffer.size
            )));
        }

        let mut mapped = buffer.mapped.lock();
        let base = match *mapped {
            Some(MappedPtr(ptr)) => ptr,
            None => {
                let ptr = buffer.resource.map().into_device_result("Map buffer")?;
                *mapped = Some(MappedPtr(ptr));
                ptr
            }
        };
        // `range.end <= size`, so the offset stays inside the mapped resource.
        let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(range.start as usize)) };
        Ok(crate::BufferMapping {
            ptr,
            is_coherent: true,
        })
    }

    pub fn unmap_buffer(&self, buffer: &super::Buffer<N>) {
        if buffer.mapped.lock().take().is_some() {
            buffer.resource.unmap();
        }
    }

    pub fn create_texture(
        &self,
        desc: &crate::TextureDescriptor,
    ) -> Result<super::Texture<N>, crate::DeviceError> {
        if desc.size.width == 0
            || desc.size.height == 0
            || desc.size.depth_or_array_layers == 0
            || desc.mip_level_count == 0
            || desc.sample_count == 0
        {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "degenerate texture {:?} with {} mips and {} samples",
                desc.size, desc.mip_level_count, desc.sample_count
            )));
        }

        let (Ok(depth_or_array_size), Ok(mip_levels)) = (
            u16::try_from(desc.size.depth_or_array_layers),
            u16::try_from(desc.mip_level_count),
        ) else {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "texture {:?} with {} mips exceeds the 16-bit native limits",
                desc.size, desc.mip_level_count
            )));
        };

        let raw_desc = native::ResourceDesc {
            dimension: conv::map_texture_dimension(desc.dimension),
            width: desc.size.width as u64,
            height: desc.size.height,
            depth_or_array_size,
            mip_levels,
            format: conv::map_texture_format_for_resource(desc.format, desc.usage),
            sample_count: desc.sample_count,
            flags: conv::map_texture_usage_to_resource_flags(desc.usage),
        };

        let resource = {
            profiling::scope!("ID3D12Device::CreateCommittedResource");
            self.shared.raw.create_committed_resource(
                native::HeapType::Default,
                &raw_desc,
                native::ResourceStates::COMMON,
                None,
            )
        }
        .into_device_result("Texture creation")?;
        self.set_name(&resource, desc.label);

        log::trace!(
            "Created texture {:?} {:?} {:?}",
            desc.label,
            desc.format,
            desc.size
        );
        self.counters.textures.add(1);

        Ok(super::Texture {
            resource,
            format: desc.format,
            dimension: desc.dimension,
            size: desc.size,
            mip_level_count: desc.mip_level_count,
            sample_count: desc.sample_count,
            usage: desc.usage,
            is_external: false,
        })
    }

    pub fn destroy_texture(&self, texture: super::Texture<N>) {
        if !texture.is_external {
            self.counters.textures.sub(1);
        }
        drop(texture);
    }

    pub fn create_texture_view(
        &self,
        texture: &super::Texture<N>,
        desc: &crate::TextureViewDescriptor,
    ) -> Result<super::TextureView<N>, crate::DeviceError> {
        if !texture.usage.contains(desc.usage) {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "view usage {:?} is not a subset of texture usage {:?}",
                desc.usage, texture.usage
            )));
        }
        let view_desc = desc.to_internal(texture)?;
        let raw = &self.shared.raw;

        let handle_srv = if desc.usage.intersects(crate::TextureUses::RESOURCE) {
            let slot = DescriptorSlot::new(&self.shared.view_staging)?;
            raw.create_shader_resource_view(&texture.resource, &view_desc.to_srv(), slot.raw());
            Some(slot)
        } else {
            None
        };
        let handle_uav = if desc
            .usage
            .intersects(crate::TextureUses::STORAGE_READ | crate::TextureUses::STORAGE_READ_WRITE)
        {
            let slot = DescriptorSlot::new(&self.shared.view_staging)?;
            raw.create_unordered_access_view(&texture.resource, &view_desc.to_uav(), slot.raw());
            Some(slot)
        } else {
            None
        };
        let handle_rtv = if desc.usage.intersects(crate::TextureUses::COLOR_TARGET) {
            let slot = DescriptorSlot::new(&self.shared.rtv_heap)?;
            raw.create_render_target_view(
                &texture.resource,
                Some(&view_desc.to_rtv()),
                slot.raw(),
            );
            Some(Arc::new(slot))
        } else {
            None
        };
        let handle_dsv_ro = if desc
            .usage
            .intersects(crate::TextureUses::DEPTH_STENCIL_READ)
        {
            let slot = DescriptorSlot::new(&self.shared.dsv_heap)?;
            raw.create_depth_stencil_view(&texture.resource, &view_desc.to_dsv(true), slot.raw());
            Some(slot)
        } else {
            None
        };
        let handle_dsv_rw = if desc
            .usage
            .intersects(crate::TextureUses::DEPTH_STENCIL_WRITE)
        {
            let slot = DescriptorSlot::new(&self.shared.dsv_heap)?;
            raw.create_depth_stencil_view(&texture.resource, &view_desc.to_dsv(false), slot.raw());
            Some(slot)
        } else {
            None
        };

        let mut extent = texture
            .size
            .mip_level_size(view_desc.mip_levels.start, texture.dimension);
        if texture.dimension != crate::TextureDimension::D3 {
            extent.depth_or_array_layers = view_desc.array_layers.end - view_desc.array_layers.start;
        }

        self.counters.texture_views.add(1);

        Ok(super::TextureView {
            format: desc.format,
            raw_format: view_desc.rtv_dsv_format,
            aspects: view_desc.aspects,
            dimension: desc.dimension,
            mip_levels: view_desc.mip_levels,
            array_layers: view_desc.array_layers,
            extent,
            sample_count: texture.sample_count,
            handle_srv,
            handle_uav,
            handle_rtv,
            handle_dsv_ro,
            handle_dsv_rw,
        })
    }

    pub fn destroy_texture_view(&self, view: super::TextureView<N>) {
        self.counters.texture_views.sub(1);
        drop(view);
    }

    pub fn create_sampler(
        &self,
        desc: &crate::SamplerDescriptor,
    ) -> Result<super::Sampler<N>, crate::DeviceError> {
        if desc.lod_clamp.start > desc.lod_clamp.end {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "inverted LOD clamp {:?}",
                desc.lod_clamp
            )));
        }
        let handle = DescriptorSlot::new(&self.shared.sampler_staging)?;
        self.shared
            .raw
            .create_sampler(&conv::map_sampler(desc), handle.raw());

        self.counters.samplers.add(1);

        Ok(super::Sampler { handle })
    }

    pub fn destroy_sampler(&self, sampler: super::Sampler<N>) {
        self.counters.samplers.sub(1);
        drop(sampler);
    }

    pub fn create_command_encoder(&self) -> Result<super::CommandEncoder<N>, crate::DeviceError> {
        let allocator = self
            .shared
            .raw
            .create_command_allocator()
            .into_device_result("Command allocator creation")?;

        self.counters.command_encoders.add(1);

        Ok(super::CommandEncoder {
            allocator,
            shared: Arc::clone(&self.shared),
            list: None,
            free_lists: Vec::new(),
            state: super::EncoderState::Idle,
            pass: super::PassState::new(),
        })
    }

    pub fn destroy_command_encoder(&self, encoder: super::CommandEncoder<N>) {
        self.counters.command_encoders.sub(1);
        drop(encoder);
    }

    pub fn create_bind_group_layout(
        &self,
        desc: &crate::BindGroupLayoutDescriptor,
    ) -> Result<super::BindGroupLayout, crate::DeviceError> {
        let mut entries = desc.entries.to_vec();
        entries.sort_by_key(|entry| entry.binding);
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].binding == pair[1].binding) {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "binding {} appears twice in {:?}",
                pair[0].binding, desc.label
            )));
        }
        if let Some(entry) = entries.iter().find(|entry| entry.visibility.is_empty()) {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "binding {} is not visible to any stage",
                entry.binding
            )));
        }

        let sampler_count = entries.iter().filter(|entry| entry.ty.is_sampler()).count() as u32;
        let view_count = entries.len() as u32 - sampler_count;

        self.counters.bind_group_layouts.add(1);

        Ok(super::BindGroupLayout {
            entries,
            view_count,
            sampler_count,
        })
    }

    pub fn destroy_bind_group_layout(&self, bg_layout: super::BindGroupLayout) {
        self.counters.bind_group_layouts.sub(1);
        drop(bg_layout);
    }

    fn create_root_signature(
        &self,
        parameters: Vec<RootParameter>,
    ) -> Result<N::RootSignature, crate::DeviceError> {
        let desc = native::RootSignatureDesc {
            parameters,
            flags: native::RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
        };
        let blob = {
            profiling::scope!("D3D12SerializeRootSignature");
            self.shared.raw.serialize_root_signature(&desc)
        }
        .map_err(|diagnostic| {
            log::error!(
                "Root signature serialization failed ({}): {}",
                diagnostic.status,
                diagnostic.message
            );
            crate::DeviceError::RootSignature {
                status: diagnostic.status,
                message: diagnostic.message,
            }
        })?;
        profiling::scope!("ID3D12Device::CreateRootSignature");
        self.shared
            .raw
            .create_root_signature(&blob)
            .into_device_result("Root signature creation")
    }

    /// Shared root signature of pipelines created without a layout.
    fn empty_root_signature(&self) -> Result<Arc<N::RootSignature>, crate::DeviceError> {
        let mut guard = self.empty_root_signature.lock();
        if let Some(ref signature) = *guard {
            return Ok(Arc::clone(signature));
        }
        let signature = Arc::new(self.create_root_signature(Vec::new())?);
        *guard = Some(Arc::clone(&signature));
        Ok(signature)
    }

    pub fn create_pipeline_layout(
        &self,
        desc: &crate::PipelineLayoutDescriptor,
    ) -> Result<super::PipelineLayout<N>, crate::DeviceError> {
        let root_layout = derive_root_layout(desc.bind_group_layouts)?;
        let total_root_elements = root_layout.parameters.len() as super::RootIndex;
        log::debug!(
            "Pipeline layout {:?}: {total_root_elements} root parameters for {} groups",
            desc.label,
            desc.bind_group_layouts.len()
        );
        let raw = self.create_root_signature(root_layout.parameters)?;

        self.counters.pipeline_layouts.add(1);

        Ok(super::PipelineLayout {
            raw: Arc::new(raw),
            total_root_elements,
            bind_group_infos: root_layout.bind_group_infos,
        })
    }

    pub fn destroy_pipeline_layout(&self, pipeline_layout: super::PipelineLayout<N>) {
        self.counters.pipeline_layouts.sub(1);
        drop(pipeline_layout);
    }

    pub fn create_bind_group(
        &self,
        desc: &crate::BindGroupDescriptor<N>,
    ) -> Result<super::BindGroup, crate::DeviceError> {
        let layout = desc.layout;
        let invalid = |message: String| {
            log::error!("Bind group {:?}: {message}", desc.label);
            crate::DeviceError::InvalidArgument(message)
        };

        if desc.entries.len() != layout.entries.len() {
            return Err(invalid(format!(
                "{} entries for a layout of {}",
                desc.entries.len(),
                layout.entries.len()
            )));
        }
        // Resolve each layout entry to its single resource entry.
        let mut resolved = Vec::with_capacity(layout.entries.len());
        for layout_entry in layout.entries.iter() {
            let mut matching = desc
                .entries
                .iter()
                .filter(|entry| entry.binding == layout_entry.binding);
            match (matching.next(), matching.next()) {
                (Some(entry), None) => resolved.push((layout_entry, entry.resource_index as usize)),
                (None, _) => {
                    return Err(invalid(format!("binding {} is missing", layout_entry.binding)))
                }
                (Some(_), Some(_)) => {
                    return Err(invalid(format!(
                        "binding {} is provided more than once",
                        layout_entry.binding
                    )))
                }
            }
        }

        // Validate every entry before touching the shader-visible heaps.
        let mut writes: Vec<PendingWrite<'_, N>> = Vec::with_capacity(resolved.len());
        for (layout_entry, resource_index) in resolved {
            use crate::BindingType as Bt;
            let write = match layout_entry.ty {
                Bt::Sampler(_) => {
                    let sampler = desc.samplers.get(resource_index).ok_or_else(|| {
                        invalid(format!("sampler index {resource_index} out of range"))
                    })?;
                    PendingWrite::Sampler(sampler.raw())
                }
                Bt::Buffer { ty, min_binding_size } => {
                    let binding = desc.buffers.get(resource_index).ok_or_else(|| {
                        invalid(format!("buffer index {resource_index} out of range"))
                    })?;
                    let size = binding.resolve_size();
                    let end = binding.offset.checked_add(size);
                    if size == 0 || end.map_or(true, |end| end > binding.buffer.size) {
                        return Err(invalid(format!(
                            "binding {} covers {} bytes at {} of a {}-byte buffer",
                            layout_entry.binding, size, binding.offset, binding.buffer.size
                        )));
                    }
                    if let Some(min) = min_binding_size {
                        if size < min.get() {
                            return Err(invalid(format!(
                                "binding {} is {size} bytes, at least {min} are required",
                                layout_entry.binding
                            )));
                        }
                    }
                    match ty {
                        crate::BufferBindingType::Uniform => {
                            if !binding.buffer.usage.contains(crate::BufferUses::UNIFORM) {
                                return Err(invalid(format!(
                                    "binding {} needs a UNIFORM buffer",
                                    layout_entry.binding
                                )));
                            }
                            if binding.offset % 256 != 0 {
                                return Err(invalid(format!(
                                    "uniform offset {} is not 256-byte aligned",
                                    binding.offset
                                )));
                            }
                            let aligned = conv::align_to_256(size)
                                .filter(|&aligned| {
                                    binding.offset + aligned <= binding.buffer.allocated_size
                                })
                                .and_then(|aligned| u32::try_from(aligned).ok())
                                .ok_or_else(|| {
                                    invalid(format!(
                                        "uniform binding {} overruns the buffer",
                                        layout_entry.binding
                                    ))
                                })?;
                            PendingWrite::Constant(native::ConstantBufferViewDesc {
                                buffer_location: binding.resolve_address(),
                                size_in_bytes: aligned,
                            })
                        }
                        crate::BufferBindingType::Storage { read_only } => {
                            let required = if read_only {
                                crate::BufferUses::STORAGE_READ
                                    | crate::BufferUses::STORAGE_READ_WRITE
                            } else {
                                crate::BufferUses::STORAGE_READ_WRITE
                            };
                            if !binding.buffer.usage.intersects(required) {
                                return Err(invalid(format!(
                                    "binding {} needs a storage buffer",
                                    layout_entry.binding
                                )));
                            }
                            if binding.offset % 4 != 0 || size % 4 != 0 {
                                return Err(invalid(format!(
                                    "storage binding {} is not 4-byte aligned",
                                    layout_entry.binding
                                )));
                            }
                            let first_element = binding.offset / 4;
                            let num_elements = u32::try_from(size / 4).map_err(|_| {
                                invalid(format!(
                                    "storage binding {} is too large",
                                    layout_entry.binding
                                ))
                            })?;
                            if read_only {
                                PendingWrite::ShaderResource(
                                    &binding.buffer.resource,
                                    native::ShaderResourceViewDesc {
                                        format: native::Format::R32_TYPELESS,
                                        dimension: native::SrvDimension::RawBuffer {
                                            first_element,
                                            num_elements,
                                        },
                                    },
                                )
                            } else {
                                PendingWrite::UnorderedAccess(
                                    &binding.buffer.resource,
                                    native::UnorderedAccessViewDesc {
                                        format: native::Format::R32_TYPELESS,
                                        dimension: native::UavDimension::RawBuffer {
                                            first_element,
                                            num_elements,
                                        },
                                    },
                                )
                            }
                        }
                    }
                }
                Bt::Texture { .. } => {
                    let data = desc.textures.get(resource_index).ok_or_else(|| {
                        invalid(format!("texture index {resource_index} out of range"))
                    })?;
                    PendingWrite::View(data.view.srv().ok_or_else(|| {
                        invalid(format!(
                            "binding {} needs a view with RESOURCE usage",
                            layout_entry.binding
                        ))
                    })?)
                }
                Bt::StorageTexture { .. } => {
                    let data = desc.textures.get(resource_index).ok_or_else(|| {
                        invalid(format!("texture index {resource_index} out of range"))
                    })?;
                    PendingWrite::View(data.view.uav().ok_or_else(|| {
                        invalid(format!(
                            "binding {} needs a view with storage usage",
                            layout_entry.binding
                        ))
                    })?)
                }
            };
            writes.push(write);
        }

        let handle_views = match layout.view_count {
            0 => None,
            count => Some(self.shared.heap_views.allocate_gpu(count)?),
        };
        let handle_samplers = match layout.sampler_count {
            0 => None,
            count => match self.shared.heap_samplers.allocate_gpu(count) {
                Ok(range) => Some(range),
                Err(err) => {
                    if let Some(ref range) = handle_views {
                        self.shared.heap_views.rewind(range);
                    }
                    return Err(err);
                }
            },
        };

        let raw = &self.shared.raw;
        let mut view_offset = 0;
        let mut sampler_offset = 0;
        for write in writes {
            if let PendingWrite::Sampler(src) = write {
                if let Some(ref range) = handle_samplers {
                    let dest = self
                        .shared
                        .heap_samplers
                        .cpu_descriptor_at(range.index + sampler_offset);
                    raw.copy_descriptors_simple(1, dest, src, DescriptorHeapType::Sampler);
                }
                sampler_offset += 1;
                continue;
            }
            let Some(ref range) = handle_views else {
                continue;
            };
            let dest = self.shared.heap_views.cpu_descriptor_at(range.index + view_offset);
            view_offset += 1;
            match write {
                PendingWrite::Constant(ref raw_desc) => {
                    raw.create_constant_buffer_view(raw_desc, dest)
                }
                PendingWrite::ShaderResource(resource, ref raw_desc) => {
                    raw.create_shader_resource_view(resource, raw_desc, dest)
                }
                PendingWrite::UnorderedAccess(resource, ref raw_desc) => {
                    raw.create_unordered_access_view(resource, raw_desc, dest)
                }
                PendingWrite::View(src) => {
                    raw.copy_descriptors_simple(1, dest, src, DescriptorHeapType::CbvSrvUav)
                }
                PendingWrite::Sampler(_) => {}
            }
        }

        self.counters.bind_groups.add(1);

        Ok(super::BindGroup {
            handle_views,
            handle_samplers,
        })
    }

    /// Shader-visible descriptors are never recycled, so this only updates the counters.
    pub fn destroy_bind_group(&self, group: super::BindGroup) {
        self.counters.bind_groups.sub(1);
        drop(group);
    }

    pub fn create_shader_module(
        &self,
        desc: &crate::ShaderModuleDescriptor,
    ) -> Result<super::ShaderModule, crate::ShaderError> {
        let mut entry_points = FxHashMap::default();
        match desc.source {
            crate::ShaderSource::Hlsl(source) => {
                let compiler = self.shader_compiler.as_deref().ok_or_else(|| {
                    crate::ShaderError::Compilation {
                        entry_point: desc
                            .entry_points
                            .first()
                            .map_or_else(String::new, |&(name, _)| name.to_string()),
                        message: "the device has no HLSL compiler".to_string(),
                    }
                })?;
                for &(name, stage) in desc.entry_points {
                    let compiled =
                        shader_compilation::compile_entry_point(compiler, source, name, stage)?;
                    entry_points.insert(name.to_string(), (stage, compiled));
                }
            }
            crate::ShaderSource::Bytecode(blobs) => {
                for &(name, stage) in desc.entry_points {
                    let bytecode = blobs
                        .iter()
                        .find(|&&(blob_name, _)| blob_name == name)
                        .map(|&(_, bytes)| bytes)
                        .filter(|bytes| !bytes.is_empty())
                        .ok_or_else(|| crate::ShaderError::Compilation {
                            entry_point: name.to_string(),
                            message: "no bytecode for this entry point".to_string(),
                        })?;
                    entry_points.insert(
                        name.to_string(),
                        (stage, crate::CompiledShader::new(bytecode.to_vec())),
                    );
                }
            }
        }

        log::debug!(
            "Shader module {:?} with {} entry points",
            desc.label,
            entry_points.len()
        );
        self.counters.shader_modules.add(1);

        Ok(super::ShaderModule { entry_points })
    }

    pub fn destroy_shader_module(&self, module: super::ShaderModule) {
        self.counters.shader_modules.sub(1);
        drop(module);
    }

    fn pipeline_signature(
        &self,
        layout: Option<&super::PipelineLayout<N>>,
    ) -> Result<(Arc<N::RootSignature>, super::RootIndex), crate::DeviceError> {
        match layout {
            Some(layout) => Ok((Arc::clone(&layout.raw), layout.total_root_elements)),
            None => Ok((self.empty_root_signature()?, 0)),
        }
    }

    pub fn create_render_pipeline(
        &self,
        desc: &crate::RenderPipelineDescriptor<N>,
    ) -> Result<super::RenderPipeline<N>, crate::PipelineError> {
        let vertex_shader = load_stage(&desc.vertex_stage, crate::ShaderStages::VERTEX)?;
        let pixel_shader = desc
            .fragment_stage
            .as_ref()
            .map(|stage| load_stage(stage, crate::ShaderStages::FRAGMENT))
            .transpose()?;

        if desc.vertex_buffers.len() > crate::MAX_VERTEX_BUFFERS {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "{} vertex buffers, the limit is {}",
                desc.vertex_buffers.len(),
                crate::MAX_VERTEX_BUFFERS
            ))
            .into());
        }
        if desc.color_targets.len() > crate::MAX_COLOR_ATTACHMENTS {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "{} color targets, the limit is {}",
                desc.color_targets.len(),
                crate::MAX_COLOR_ATTACHMENTS
            ))
            .into());
        }

        let mut vertex_strides = [None; crate::MAX_VERTEX_BUFFERS];
        let mut input_layout = Vec::new();
        for (i, (stride, vbuf)) in vertex_strides
            .iter_mut()
            .zip(desc.vertex_buffers)
            .enumerate()
        {
            *stride = NonZeroU32::new(vbuf.array_stride as u32);
            let (classification, instance_data_step_rate) = conv::map_step_mode(vbuf.step_mode);
            for attribute in vbuf.attributes {
                input_layout.push(native::InputElement {
                    semantic_index: attribute.shader_location,
                    format: conv::map_vertex_format(attribute.format),
                    input_slot: i as u32,
                    aligned_byte_offset: attribute.offset as u32,
                    classification,
                    instance_data_step_rate,
                });
            }
        }

        let (topology_type, topology) = conv::map_topology(desc.primitive.topology);
        let strip_cut = match desc.primitive.topology {
            crate::PrimitiveTopology::LineStrip | crate::PrimitiveTopology::TriangleStrip => {
                desc.primitive.strip_index_format
            }
            _ => None,
        };
        let rtv_formats = desc
            .color_targets
            .iter()
            .map(|ct| {
                ct.as_ref()
                    .map_or(native::Format::UNKNOWN, |ct| conv::map_texture_format(ct.format))
            })
            .collect();
        let bias = desc
            .depth_stencil
            .as_ref()
            .map_or_else(crate::DepthBiasState::default, |ds| ds.bias);

        let (signature, total_root_elements) = self.pipeline_signature(desc.layout)?;
        let raw_desc = native::GraphicsPipelineDesc::<N> {
            root_signature: &signature,
            vertex_shader: vertex_shader.bytecode(),
            pixel_shader: pixel_shader.map(crate::CompiledShader::bytecode),
            input_layout,
            primitive_topology_type: topology_type,
            strip_cut,
            rasterizer: conv::map_rasterizer(&desc.primitive, bias),
            blend: conv::map_render_targets(desc.color_targets),
            alpha_to_coverage: desc.multisample.alpha_to_coverage_enabled,
            depth_stencil: desc.depth_stencil.as_ref().map(conv::map_depth_stencil),
            rtv_formats,
            dsv_format: desc
                .depth_stencil
                .as_ref()
                .map_or(native::Format::UNKNOWN, |ds| {
                    conv::map_texture_format_for_dsv(ds.format)
                }),
            sample_count: desc.multisample.count,
            sample_mask: desc.multisample.mask as u32,
            name: desc.label,
        };

        let raw = {
            profiling::scope!("ID3D12Device::CreateGraphicsPipelineState");
            self.shared.raw.create_graphics_pipeline_state(&raw_desc)
        }
        .into_device_result("Graphics pipeline creation")?;

        self.counters.render_pipelines.add(1);

        Ok(super::RenderPipeline {
            raw,
            signature: Arc::downgrade(&signature),
            total_root_elements,
            topology,
            vertex_strides,
        })
    }

    pub fn destroy_render_pipeline(&self, pipeline: super::RenderPipeline<N>) {
        self.counters.render_pipelines.sub(1);
        drop(pipeline);
    }

    pub fn create_compute_pipeline(
        &self,
        desc: &crate::ComputePipelineDescriptor<N>,
    ) -> Result<super::ComputePipeline<N>, crate::PipelineError> {
        let compute_shader = load_stage(&desc.stage, crate::ShaderStages::COMPUTE)?;
        let (signature, total_root_elements) = self.pipeline_signature(desc.layout)?;

        let raw = {
            profiling::scope!("ID3D12Device::CreateComputePipelineState");
            self.shared
                .raw
                .create_compute_pipeline_state(&native::ComputePipelineDesc {
                    root_signature: &signature,
                    compute_shader: compute_shader.bytecode(),
                    name: desc.label,
                })
        }
        .into_device_result("Compute pipeline creation")?;

        self.counters.compute_pipelines.add(1);

        Ok(super::ComputePipeline {
            raw,
            signature: Arc::downgrade(&signature),
            total_root_elements,
        })
    }

    pub fn destroy_compute_pipeline(&self, pipeline: super::ComputePipeline<N>) {
        self.counters.compute_pipelines.sub(1);
        drop(pipeline);
    }

    pub fn create_fence(&self) -> Result<super::Fence<N>, crate::DeviceError> {
        let raw = self
            .shared
            .raw
            .create_fence(0)
            .into_device_result("Fence creation")?;
        let event = self
            .shared
            .raw
            .create_event()
            .into_device_result("Event creation")?;

        self.counters.fences.add(1);

        Ok(super::Fence {
            raw,
            event: Mutex::new(event),
        })
    }

    pub fn destroy_fence(&self, fence: super::Fence<N>) {
        self.counters.fences.sub(1);
        drop(fence);
    }
}

fn load_stage<'a>(
    stage: &crate::ProgrammableStage<'a>,
    expected: crate::ShaderStages,
) -> Result<&'a crate::CompiledShader, crate::PipelineError> {
    let (found, shader) = stage
        .module
        .entry_point(stage.entry_point)
        .ok_or_else(|| crate::PipelineError::EntryPoint(stage.entry_point.to_string()))?;
    if found != expected {
        return Err(crate::PipelineError::Linkage(
            expected,
            format!("`{}` is a {found:?} entry point", stage.entry_point),
        ));
    }
    Ok(shader)
}

impl<N: Native> super::Fence<N> {
    /// Asks `queue` to set the fence to `value` once prior work completes.
    pub fn signal(&self, queue: &super::Queue<N>, value: crate::FenceValue) -> Result<(), crate::DeviceError> {
        queue.signal(self, value)
    }

    /// Last value the GPU has reached.
    pub fn value(&self) -> Result<crate::FenceValue, crate::DeviceError> {
        match self.raw.completed_value() {
            u64::MAX => Err(crate::DeviceError::Lost),
            value => Ok(value),
        }
    }

    /// Fences are monotonic, there is nothing to reset.
    pub fn reset(&self) {}

    /// Waits until the fence reaches `value`. `None` waits forever.
    ///
    /// Returns `Ok(false)` if the timeout elapses first.
    pub fn wait(
        &self,
        value: crate::FenceValue,
        timeout: Option<Duration>,
    ) -> Result<bool, crate::DeviceError> {
        let mut fence_value = self.value()?;
        if fence_value >= value {
            return Ok(true);
        }

        let event = self.event.lock();
        self.raw
            .set_event_on_completion(value, &event)
            .into_device_result("Set event")?;

        let start_time = Instant::now();

        // The event fires for any completion at or past `value`, but a wakeup
        // does not by itself prove the value was reached; re-check and loop.
        loop {
            let timeout_ms = match timeout {
                None => native::INFINITE,
                Some(timeout) => match timeout.checked_sub(start_time.elapsed()) {
                    Some(remaining) => remaining.as_millis().min(native::INFINITE as u128 - 1) as u32,
                    None => {
                        log::trace!("Timeout elapsed in between waits!");
                        break Ok(false);
                    }
                },
            };

            log::trace!("Waiting for fence value {value} for {timeout_ms} ms");

            match event.wait(timeout_ms) {
                native::WaitStatus::Signaled => {}
                native::WaitStatus::Failed => {
                    log::error!("Wait failed!");
                    break Err(crate::DeviceError::Lost);
                }
                native::WaitStatus::Timeout => {
                    log::trace!("Wait timed out!");
                    break Ok(false);
                }
            }

            fence_value = self.value()?;
            log::trace!("Wait complete! Fence actual value: {fence_value}");

            if fence_value >= value {
                break Ok(true);
            }
        }
    }
}
