use std::{num::NonZeroU32, ops::Range, sync::Arc};

use arrayvec::ArrayVec;

use super::{conv, EncoderState, PassKind, RootElement};
use crate::native::{
    self, Barrier, CopyBox, CpuDescriptor, Native, NativeResultExt as _,
    RawCommandAllocator as _, RawCommandList as _, RawDevice as _, TextureCopyLocation,
};

fn make_box(origin: &crate::Origin3d, size: &crate::CopyExtent) -> CopyBox {
    CopyBox {
        left: origin.x,
        top: origin.y,
        right: origin.x + size.width,
        bottom: origin.y + size.height,
        front: origin.z,
        back: origin.z + size.depth,
    }
}

/// Size of an index or vertex buffer view, which the native API keeps in 32 bits.
fn binding_view_size<N: Native>(
    binding: &crate::BufferBinding<'_, N>,
) -> Result<u32, crate::DeviceError> {
    let size = binding.resolve_size();
    binding
        .offset
        .checked_add(size)
        .filter(|&end| end <= binding.buffer.size)
        .and_then(|_| u32::try_from(size).ok())
        .ok_or_else(|| {
            crate::DeviceError::InvalidArgument(format!(
                "buffer binding of {size} bytes at {} does not fit a view",
                binding.offset
            ))
        })
}

/// Placed footprint of a buffer region holding texels of `texture`.
fn make_footprint<N: Native>(
    texture: &super::Texture<N>,
    copy: &crate::BufferTextureCopy,
) -> Result<native::PlacedFootprint, crate::DeviceError> {
    let layout = &copy.buffer_layout;
    let row_bytes = copy
        .size
        .width
        .checked_mul(texture.format.block_size())
        .ok_or_else(|| {
            crate::DeviceError::InvalidArgument(format!(
                "a row of {} texels is too wide",
                copy.size.width
            ))
        })?;
    let row_pitch = match layout.bytes_per_row {
        Some(pitch) if pitch < row_bytes => {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "bytes_per_row {pitch} is smaller than a row of {row_bytes} bytes"
            )))
        }
        Some(pitch) => pitch,
        None => conv::align_to_256(row_bytes as u64)
            .and_then(|pitch| u32::try_from(pitch).ok())
            .ok_or_else(|| {
                crate::DeviceError::InvalidArgument(format!(
                    "a row of {row_bytes} bytes has no valid pitch"
                ))
            })?,
    };
    if row_pitch % native::TEXTURE_DATA_PITCH_ALIGNMENT != 0 {
        return Err(crate::DeviceError::InvalidArgument(format!(
            "bytes_per_row {row_pitch} is not a multiple of {}",
            native::TEXTURE_DATA_PITCH_ALIGNMENT
        )));
    }
    if layout.offset % native::TEXTURE_DATA_PLACEMENT_ALIGNMENT != 0 {
        return Err(crate::DeviceError::InvalidArgument(format!(
            "buffer offset {} is not a multiple of {}",
            layout.offset,
            native::TEXTURE_DATA_PLACEMENT_ALIGNMENT
        )));
    }
    Ok(native::PlacedFootprint {
        offset: layout.offset,
        footprint: native::SubresourceFootprint {
            format: conv::map_texture_format(texture.format),
            width: copy.size.width,
            height: layout.rows_per_image.unwrap_or(copy.size.height),
            depth: copy.size.depth,
            row_pitch,
        },
    })
}

impl<N: Native> super::PassState<N> {
    /// Binds the two shader-visible heaps, once per pass.
    fn bind_heaps(&mut self, list: &N::CommandList, shared: &super::DeviceShared<N>) {
        if !self.heaps_bound {
            list.set_descriptor_heaps(&[shared.heap_views.raw(), shared.heap_samplers.raw()]);
            self.heaps_bound = true;
        }
    }

    /// Switches to `signature` if it is not the current one.
    ///
    /// Tables beyond `total_root_elements` are forgotten, the rest are marked
    /// dirty so they get re-applied on the next draw or dispatch.
    fn reset_signature(
        &mut self,
        list: &N::CommandList,
        signature: &Arc<N::RootSignature>,
        total_root_elements: super::RootIndex,
    ) {
        if let Some(ref current) = self.signature {
            if Arc::ptr_eq(current, signature) {
                return;
            }
        }
        match self.kind {
            PassKind::Render => list.set_graphics_root_signature(signature),
            PassKind::Compute => list.set_compute_root_signature(signature),
            PassKind::Transfer => {}
        }
        self.signature = Some(Arc::clone(signature));
        self.dirty_root_elements = 0;
        for (index, element) in self.root_elements.iter_mut().enumerate() {
            if index as super::RootIndex >= total_root_elements {
                *element = RootElement::Empty;
            } else if let RootElement::Table(_) = *element {
                self.dirty_root_elements |= 1u64 << index;
            }
        }
    }

    fn set_bind_group(
        &mut self,
        list: &N::CommandList,
        shared: &super::DeviceShared<N>,
        layout: &super::PipelineLayout<N>,
        index: u32,
        group: &super::BindGroup,
    ) -> Result<(), crate::DeviceError> {
        let info = layout
            .bind_group_infos
            .get(index as usize)
            .copied()
            .ok_or_else(|| {
                crate::DeviceError::InvalidArgument(format!(
                    "bind group index {index} is out of the layout's {} groups",
                    layout.bind_group_infos.len()
                ))
            })?;
        let views = match (info.view_root_index, group.handle_views) {
            (Some(root_index), Some(range)) => Some((root_index, range.gpu)),
            (None, None) => None,
            _ => {
                return Err(crate::DeviceError::InvalidArgument(format!(
                    "bind group {index} does not match the layout's view table"
                )))
            }
        };
        let samplers = match (info.sampler_root_index, group.handle_samplers) {
            (Some(root_index), Some(range)) => Some((root_index, range.gpu)),
            (None, None) => None,
            _ => {
                return Err(crate::DeviceError::InvalidArgument(format!(
                    "bind group {index} does not match the layout's sampler table"
                )))
            }
        };

        self.bind_heaps(list, shared);
        self.reset_signature(list, &layout.raw, layout.total_root_elements);

        for (root_index, gpu) in views.into_iter().chain(samplers) {
            let Some(gpu) = gpu else {
                log::error!("Bind group {index} was allocated without GPU handles");
                continue;
            };
            self.root_elements[root_index as usize] = RootElement::Table(gpu);
            self.dirty_root_elements |= 1u64 << root_index;
        }
        Ok(())
    }

    fn update_root_elements(&mut self, list: &N::CommandList) {
        while self.dirty_root_elements != 0 {
            let index = self.dirty_root_elements.trailing_zeros();
            self.dirty_root_elements ^= 1 << index;

            match self.root_elements[index as usize] {
                RootElement::Empty => log::error!("Root index {index} is not bound"),
                RootElement::Table(descriptor) => match self.kind {
                    PassKind::Render => list.set_graphics_root_descriptor_table(index, descriptor),
                    PassKind::Compute => list.set_compute_root_descriptor_table(index, descriptor),
                    PassKind::Transfer => {}
                },
            }
        }
    }

    fn prepare_draw(&mut self, list: &N::CommandList) {
        while self.dirty_vertex_buffers != 0 {
            let index = self.dirty_vertex_buffers.trailing_zeros();
            self.dirty_vertex_buffers ^= 1 << index;
            list.ia_set_vertex_buffers(
                index,
                &self.vertex_buffers[index as usize..][..1],
            );
        }
        self.update_root_elements(list);
    }

    fn begin_pass(&mut self, list: &N::CommandList, kind: PassKind, label: crate::Label) {
        self.clear();
        self.kind = kind;
        if let Some(label) = label {
            list.begin_event(label);
            self.has_label = true;
        }
    }

    fn end_pass(&mut self, list: &N::CommandList) {
        if self.has_label {
            list.end_event();
        }
        self.clear();
    }
}

impl<N: Native> super::CommandEncoder<N> {
    pub fn is_recording(&self) -> bool {
        self.state == EncoderState::Recording
    }

    fn list(&self) -> Result<&N::CommandList, crate::DeviceError> {
        match (self.state, self.list.as_ref()) {
            (EncoderState::Recording, Some(list)) => Ok(list),
            _ => Err(crate::DeviceError::NotRecording),
        }
    }

    pub fn begin_encoding(&mut self, label: crate::Label) -> Result<(), crate::DeviceError> {
        if self.state == EncoderState::Recording {
            return Err(crate::DeviceError::AlreadyRecording);
        }

        self.allocator
            .reset()
            .into_device_result("Command allocator reset")?;

        let list = match self.free_lists.pop() {
            Some(list) => {
                if let Err(err) = list
                    .reset(&self.allocator)
                    .into_device_result("Command list reset")
                {
                    self.free_lists.push(list);
                    return Err(err);
                }
                list
            }
            None => {
                profiling::scope!("ID3D12Device::CreateCommandList");
                self.shared
                    .raw
                    .create_command_list(&self.allocator)
                    .into_device_result("Create command list")?
            }
        };

        if let Some(label) = label {
            list.set_name(label);
        }

        self.list = Some(list);
        self.pass.clear();
        self.state = EncoderState::Recording;
        Ok(())
    }

    pub fn discard_encoding(&mut self) -> Result<(), crate::DeviceError> {
        if self.state != EncoderState::Recording {
            return Err(crate::DeviceError::NotRecording);
        }
        self.state = EncoderState::Discarded;
        if let Some(list) = self.list.take() {
            match list.close() {
                Ok(()) => self.free_lists.push(list),
                Err(status) => log::error!("Dropping a command list that failed to close: {status}"),
            }
        }
        Ok(())
    }

    pub fn end_encoding(&mut self) -> Result<super::CommandBuffer<N>, crate::DeviceError> {
        if self.state != EncoderState::Recording {
            return Err(crate::DeviceError::NotRecording);
        }
        let raw = self.list.take().ok_or(crate::DeviceError::NotRecording)?;
        self.state = EncoderState::Idle;
        raw.close().into_device_result("Close command list")?;
        Ok(super::CommandBuffer { raw })
    }

    /// Takes back command buffers the GPU is done with.
    pub fn reset_all<I>(&mut self, command_buffers: I)
    where
        I: IntoIterator<Item = super::CommandBuffer<N>>,
    {
        for cmd_buf in command_buffers {
            self.free_lists.push(cmd_buf.raw);
        }
    }

    pub fn transition_buffers<'a, T>(&mut self, barriers: T) -> Result<(), crate::DeviceError>
    where
        T: IntoIterator<Item = crate::BufferBarrier<'a, N>>,
    {
        let list = self.list()?;
        let mut raw_barriers = Vec::new();

        for barrier in barriers {
            let s0 = conv::map_buffer_usage_to_state(barrier.usage.start);
            let s1 = conv::map_buffer_usage_to_state(barrier.usage.end);
            if s0 != s1 {
                raw_barriers.push(Barrier::Transition {
                    resource: &barrier.buffer.resource,
                    subresource: native::ALL_SUBRESOURCES,
                    before: s0,
                    after: s1,
                });
            } else if barrier.usage.start.contains(crate::BufferUses::STORAGE_STORE) {
                raw_barriers.push(Barrier::Uav {
                    resource: &barrier.buffer.resource,
                });
            }
        }

        if !raw_barriers.is_empty() {
            profiling::scope!("ID3D12GraphicsCommandList::ResourceBarrier");
            list.resource_barrier(&raw_barriers);
        }
        Ok(())
    }

    pub fn transition_textures<'a, T>(&mut self, barriers: T) -> Result<(), crate::DeviceError>
    where
        T: IntoIterator<Item = crate::TextureBarrier<'a, N>>,
    {
        let list = self.list()?;
        let mut raw_barriers = Vec::new();

        for barrier in barriers {
            let texture = barrier.texture;
            let s0 = conv::map_texture_usage_to_state(barrier.usage.start);
            let s1 = conv::map_texture_usage_to_state(barrier.usage.end);
            let (mip_levels, array_layers) = texture.resolve_range(&barrier.range)?;
            if s0 != s1 {
                if mip_levels == (0..texture.mip_level_count)
                    && array_layers == (0..texture.array_layer_count())
                {
                    // Only one barrier if it affects the whole image.
                    raw_barriers.push(Barrier::Transition {
                        resource: &texture.resource,
                        subresource: native::ALL_SUBRESOURCES,
                        before: s0,
                        after: s1,
                    });
                } else {
                    // Generate barrier for each layer/level combination.
                    let planes = if texture.format.has_stencil() { 0..2 } else { 0..1 };
                    for plane in planes {
                        for mip_level in mip_levels.clone() {
                            for array_layer in array_layers.clone() {
                                raw_barriers.push(Barrier::Transition {
                                    resource: &texture.resource,
                                    subresource: texture.calc_subresource(
                                        mip_level,
                                        array_layer,
                                        plane,
                                    ),
                                    before: s0,
                                    after: s1,
                                });
                            }
                        }
                    }
                }
            } else if barrier.usage.start.contains(crate::TextureUses::STORAGE_STORE) {
                raw_barriers.push(Barrier::Uav {
                    resource: &texture.resource,
                });
            }
        }

        if !raw_barriers.is_empty() {
            profiling::scope!("ID3D12GraphicsCommandList::ResourceBarrier");
            list.resource_barrier(&raw_barriers);
        }
        Ok(())
    }

    pub fn copy_buffer_to_buffer<T>(
        &mut self,
        src: &super::Buffer<N>,
        dst: &super::Buffer<N>,
        regions: T,
    ) -> Result<(), crate::DeviceError>
    where
        T: IntoIterator<Item = crate::BufferCopy>,
    {
        let list = self.list()?;
        let regions: Vec<_> = regions.into_iter().collect();
        let fits = |offset: u64, size: u64, total: u64| {
            offset.checked_add(size).map_or(false, |end| end <= total)
        };
        for r in regions.iter() {
            if !fits(r.src_offset, r.size.get(), src.size)
                || !fits(r.dst_offset, r.size.get(), dst.size)
            {
                return Err(crate::DeviceError::InvalidArgument(format!(
                    "copy of {} bytes from {} to {} overruns a buffer",
                    r.size, r.src_offset, r.dst_offset
                )));
            }
        }
        for r in regions {
            list.copy_buffer_region(
                &dst.resource,
                r.dst_offset,
                &src.resource,
                r.src_offset,
                r.size.get(),
            );
        }
        Ok(())
    }

    pub fn copy_texture_to_texture<T>(
        &mut self,
        src: &super::Texture<N>,
        dst: &super::Texture<N>,
        regions: T,
    ) -> Result<(), crate::DeviceError>
    where
        T: IntoIterator<Item = crate::TextureCopy>,
    {
        let list = self.list()?;
        for r in regions {
            let src_box = make_box(&r.src_base.origin, &r.size);
            let src_location = TextureCopyLocation::<N>::Subresource(
                &src.resource,
                src.calc_subresource_for_copy(&r.src_base),
            );
            let dst_location = TextureCopyLocation::<N>::Subresource(
                &dst.resource,
                dst.calc_subresource_for_copy(&r.dst_base),
            );
            list.copy_texture_region(
                &dst_location,
                r.dst_base.origin,
                &src_location,
                Some(&src_box),
            );
        }
        Ok(())
    }

    pub fn copy_buffer_to_texture<T>(
        &mut self,
        src: &super::Buffer<N>,
        dst: &super::Texture<N>,
        regions: T,
    ) -> Result<(), crate::DeviceError>
    where
        T: IntoIterator<Item = crate::BufferTextureCopy>,
    {
        let list = self.list()?;
        let regions = regions
            .into_iter()
            .map(|r| Ok((make_footprint(dst, &r)?, r)))
            .collect::<Result<Vec<_>, crate::DeviceError>>()?;

        for (footprint, r) in regions {
            let src_box = make_box(&crate::Origin3d::ZERO, &r.size);
            let src_location = TextureCopyLocation::<N>::PlacedFootprint(&src.resource, footprint);
            let dst_location = TextureCopyLocation::<N>::Subresource(
                &dst.resource,
                dst.calc_subresource_for_copy(&r.texture_base),
            );
            list.copy_texture_region(
                &dst_location,
                r.texture_base.origin,
                &src_location,
                Some(&src_box),
            );
        }
        Ok(())
    }

    pub fn copy_texture_to_buffer<T>(
        &mut self,
        src: &super::Texture<N>,
        dst: &super::Buffer<N>,
        regions: T,
    ) -> Result<(), crate::DeviceError>
    where
        T: IntoIterator<Item = crate::BufferTextureCopy>,
    {
        let list = self.list()?;
        let regions = regions
            .into_iter()
            .map(|r| Ok((make_footprint(src, &r)?, r)))
            .collect::<Result<Vec<_>, crate::DeviceError>>()?;

        for (footprint, r) in regions {
            let src_box = make_box(&r.texture_base.origin, &r.size);
            let src_location = TextureCopyLocation::<N>::Subresource(
                &src.resource,
                src.calc_subresource_for_copy(&r.texture_base),
            );
            let dst_location = TextureCopyLocation::<N>::PlacedFootprint(&dst.resource, footprint);
            list.copy_texture_region(
                &dst_location,
                crate::Origin3d::ZERO,
                &src_location,
                Some(&src_box),
            );
        }
        Ok(())
    }

    pub fn insert_debug_marker(&mut self, label: &str) -> Result<(), crate::DeviceError> {
        self.list()?.set_marker(label);
        Ok(())
    }

    pub fn begin_debug_marker(&mut self, group_label: &str) -> Result<(), crate::DeviceError> {
        self.list()?.begin_event(group_label);
        Ok(())
    }

    pub fn end_debug_marker(&mut self) -> Result<(), crate::DeviceError> {
        self.list()?.end_event();
        Ok(())
    }

    pub fn begin_render_pass(
        &mut self,
        desc: &crate::RenderPassDescriptor<N>,
    ) -> Result<RenderPass<'_, N>, crate::DeviceError> {
        let Self {
            ref list,
            ref mut pass,
            ref shared,
            state,
            ..
        } = *self;
        let list = match (state, list.as_ref()) {
            (EncoderState::Recording, Some(list)) => list,
            _ => return Err(crate::DeviceError::NotRecording),
        };

        // Resolve every handle before touching the list.
        let color_count = desc
            .color_attachments
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |last| last + 1);
        let mut color_views = ArrayVec::<CpuDescriptor, { crate::MAX_COLOR_ATTACHMENTS }>::new();
        for (i, cat) in desc.color_attachments[..color_count].iter().enumerate() {
            let cat = cat.as_ref().ok_or_else(|| {
                crate::DeviceError::InvalidArgument(format!(
                    "color attachment {i} is empty but a later one is set"
                ))
            })?;
            let rtv = cat.target.rtv().ok_or_else(|| {
                crate::DeviceError::InvalidArgument(format!(
                    "color attachment {i} has no render target view"
                ))
            })?;
            color_views.try_push(rtv).map_err(|_| {
                crate::DeviceError::InvalidArgument(format!(
                    "more than {} color attachments",
                    crate::MAX_COLOR_ATTACHMENTS
                ))
            })?;
        }
        let ds_view = match desc.depth_stencil_attachment {
            Some(ref ds) => {
                let writes = !(ds.depth_ops & ds.stencil_ops).contains(crate::AttachmentOps::LOAD)
                    || (ds.depth_ops | ds.stencil_ops).contains(crate::AttachmentOps::STORE);
                let handle = if writes {
                    ds.target.dsv(false)
                } else {
                    ds.target.dsv(true).or_else(|| ds.target.dsv(false))
                };
                Some(handle.ok_or_else(|| {
                    crate::DeviceError::InvalidArgument(
                        "depth-stencil attachment has no suitable depth-stencil view".to_string(),
                    )
                })?)
            }
            None => None,
        };
        let extent = desc
            .color_attachments
            .iter()
            .flatten()
            .map(|cat| cat.target.extent)
            .chain(desc.depth_stencil_attachment.as_ref().map(|ds| ds.target.extent))
            .next()
            .ok_or_else(|| {
                crate::DeviceError::InvalidArgument("render pass has no attachments".to_string())
            })?;

        pass.begin_pass(list, PassKind::Render, desc.label);

        for (cat, &rtv) in desc.color_attachments.iter().flatten().zip(color_views.iter()) {
            if !cat.ops.contains(crate::AttachmentOps::LOAD) {
                list.clear_render_target_view(rtv, conv::map_color(cat.clear_value));
            }
        }
        if let (Some(ds), Some(dsv)) = (desc.depth_stencil_attachment.as_ref(), ds_view) {
            let (depth, stencil) = ds.clear_value;
            let clear_depth = (!ds.depth_ops.contains(crate::AttachmentOps::LOAD)
                && ds.target.aspects.contains(crate::FormatAspects::DEPTH))
            .then_some(depth);
            let clear_stencil = (!ds.stencil_ops.contains(crate::AttachmentOps::LOAD)
                && ds.target.aspects.contains(crate::FormatAspects::STENCIL))
            .then_some(stencil as u8);
            if clear_depth.is_some() || clear_stencil.is_some() {
                list.clear_depth_stencil_view(dsv, clear_depth, clear_stencil);
            }
        }

        list.om_set_render_targets(&color_views, ds_view);

        let raw_vp = native::Viewport {
            top_left_x: 0.0,
            top_left_y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let raw_rect = native::Rect {
            left: 0,
            top: 0,
            right: extent.width as i32,
            bottom: extent.height as i32,
        };
        list.rs_set_viewports(&[raw_vp]);
        list.rs_set_scissor_rects(&[raw_rect]);

        Ok(RenderPass { list, pass, shared })
    }

    pub fn begin_compute_pass(
        &mut self,
        desc: &crate::ComputePassDescriptor,
    ) -> Result<ComputePass<'_, N>, crate::DeviceError> {
        let Self {
            ref list,
            ref mut pass,
            ref shared,
            state,
            ..
        } = *self;
        let list = match (state, list.as_ref()) {
            (EncoderState::Recording, Some(list)) => list,
            _ => return Err(crate::DeviceError::NotRecording),
        };
        pass.begin_pass(list, PassKind::Compute, desc.label);
        Ok(ComputePass { list, pass, shared })
    }
}

/// A render pass being recorded. Ends when dropped.
pub struct RenderPass<'a, N: Native> {
    list: &'a N::CommandList,
    pass: &'a mut super::PassState<N>,
    shared: &'a super::DeviceShared<N>,
}

impl<N: Native> RenderPass<'_, N> {
    pub fn set_bind_group(
        &mut self,
        layout: &super::PipelineLayout<N>,
        index: u32,
        group: &super::BindGroup,
    ) -> Result<(), crate::DeviceError> {
        self.pass
            .set_bind_group(self.list, self.shared, layout, index, group)
    }

    pub fn set_pipeline(
        &mut self,
        pipeline: &super::RenderPipeline<N>,
    ) -> Result<(), crate::DeviceError> {
        let signature = pipeline.signature.upgrade().ok_or_else(|| {
            crate::DeviceError::InvalidArgument(
                "the pipeline's layout has been destroyed".to_string(),
            )
        })?;
        self.pass
            .reset_signature(self.list, &signature, pipeline.total_root_elements);

        self.list.set_pipeline_state(&pipeline.raw);
        self.list.ia_set_primitive_topology(pipeline.topology);

        for (index, (vb, &stride)) in self
            .pass
            .vertex_buffers
            .iter_mut()
            .zip(pipeline.vertex_strides.iter())
            .enumerate()
        {
            if let Some(stride) = stride {
                if vb.stride_in_bytes != stride.get() {
                    vb.stride_in_bytes = stride.get();
                    self.pass.dirty_vertex_buffers |= 1 << index;
                }
            }
        }
        self.pass.vertex_strides = pipeline.vertex_strides;
        Ok(())
    }

    pub fn set_index_buffer(
        &mut self,
        binding: crate::BufferBinding<'_, N>,
        format: crate::IndexFormat,
    ) -> Result<(), crate::DeviceError> {
        self.list.ia_set_index_buffer(&native::IndexBufferView {
            buffer_location: binding.resolve_address(),
            size_in_bytes: binding_view_size(&binding)?,
            format: conv::map_index_format(format),
        });
        Ok(())
    }

    pub fn set_vertex_buffer(
        &mut self,
        index: u32,
        binding: crate::BufferBinding<'_, N>,
    ) -> Result<(), crate::DeviceError> {
        let slot = index as usize;
        let vb = self.pass.vertex_buffers.get_mut(slot).ok_or_else(|| {
            crate::DeviceError::InvalidArgument(format!(
                "vertex buffer slot {index} exceeds {}",
                crate::MAX_VERTEX_BUFFERS
            ))
        })?;
        let size_in_bytes = binding_view_size(&binding)?;
        vb.buffer_location = binding.resolve_address();
        vb.size_in_bytes = size_in_bytes;
        vb.stride_in_bytes = self.pass.vertex_strides[slot].map_or(0, NonZeroU32::get);
        self.pass.dirty_vertex_buffers |= 1 << slot;
        Ok(())
    }

    pub fn set_viewport(&mut self, rect: &crate::Rect<f32>, depth_range: Range<f32>) {
        let raw_vp = native::Viewport {
            top_left_x: rect.x,
            top_left_y: rect.y,
            width: rect.w,
            height: rect.h,
            min_depth: depth_range.start,
            max_depth: depth_range.end,
        };
        self.list.rs_set_viewports(&[raw_vp]);
    }

    pub fn set_scissor_rect(
        &mut self,
        rect: &crate::Rect<u32>,
    ) -> Result<(), crate::DeviceError> {
        let edge = |start: u32, extent: u32| {
            start
                .checked_add(extent)
                .and_then(|end| i32::try_from(end).ok())
        };
        let (Some(right), Some(bottom)) = (edge(rect.x, rect.w), edge(rect.y, rect.h)) else {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "scissor rect {rect:?} is out of range"
            )));
        };
        let raw_rect = native::Rect {
            left: rect.x as i32,
            top: rect.y as i32,
            right,
            bottom,
        };
        self.list.rs_set_scissor_rects(&[raw_rect]);
        Ok(())
    }

    pub fn set_stencil_reference(&mut self, value: u32) {
        self.list.om_set_stencil_ref(value);
    }

    pub fn set_blend_constants(&mut self, color: &crate::Color) {
        self.list.om_set_blend_factor(conv::map_color(*color));
    }

    pub fn draw(
        &mut self,
        first_vertex: u32,
        vertex_count: u32,
        first_instance: u32,
        instance_count: u32,
    ) {
        self.pass.prepare_draw(self.list);
        self.list
            .draw_instanced(vertex_count, instance_count, first_vertex, first_instance);
    }

    pub fn draw_indexed(
        &mut self,
        first_index: u32,
        index_count: u32,
        base_vertex: i32,
        first_instance: u32,
        instance_count: u32,
    ) {
        self.pass.prepare_draw(self.list);
        self.list.draw_indexed_instanced(
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        );
    }

    pub fn insert_debug_marker(&mut self, label: &str) {
        self.list.set_marker(label);
    }

    pub fn begin_debug_marker(&mut self, group_label: &str) {
        self.list.begin_event(group_label);
    }

    pub fn end_debug_marker(&mut self) {
        self.list.end_event();
    }
}

impl<N: Native> Drop for RenderPass<'_, N> {
    fn drop(&mut self) {
        self.pass.end_pass(self.list);
    }
}

/// A compute pass being recorded. Ends when dropped.
pub struct ComputePass<'a, N: Native> {
    list: &'a N::CommandList,
    pass: &'a mut super::PassState<N>,
    shared: &'a super::DeviceShared<N>,
}

impl<N: Native> ComputePass<'_, N> {
    pub fn set_bind_group(
        &mut self,
        layout: &super::PipelineLayout<N>,
        index: u32,
        group: &super::BindGroup,
    ) -> Result<(), crate::DeviceError> {
        self.pass
            .set_bind_group(self.list, self.shared, layout, index, group)
    }

    pub fn set_pipeline(
        &mut self,
        pipeline: &super::ComputePipeline<N>,
    ) -> Result<(), crate::DeviceError> {
        let signature = pipeline.signature.upgrade().ok_or_else(|| {
            crate::DeviceError::InvalidArgument(
                "the pipeline's layout has been destroyed".to_string(),
            )
        })?;
        self.pass
            .reset_signature(self.list, &signature, pipeline.total_root_elements);
        self.list.set_pipeline_state(&pipeline.raw);
        Ok(())
    }

    pub fn dispatch(&mut self, count: [u32; 3]) {
        self.pass.update_root_elements(self.list);
        self.list.dispatch(count[0], count[1], count[2]);
    }

    pub fn insert_debug_marker(&mut self, label: &str) {
        self.list.set_marker(label);
    }

    pub fn begin_debug_marker(&mut self, group_label: &str) {
        self.list.begin_event(group_label);
    }

    pub fn end_debug_marker(&mut self) {
        self.list.end_event();
    }
}

impl<N: Native> Drop for ComputePass<'_, N> {
    fn drop(&mut self) {
        self.pass.end_pass(self.list);
    }
}

impl<N: Native> Drop for super::CommandEncoder<N> {
    fn drop(&mut self) {
        if let Some(list) = self.list.take() {
            if let Err(status) = list.close() {
                log::warn!("Dropping a recording command list: {status}");
            }
        }
    }
}
