use std::ptr;

use super::{conv, MappedPtr};
use crate::native::{
    self, HeapType, Native, NativeResultExt as _, RawCommandAllocator as _,
    RawCommandList as _, RawDevice as _, RawQueue as _, RawResource as _, RawSwapChain as _,
    TextureCopyLocation,
};

impl<N: Native> super::Queue<N> {
    pub fn raw(&self) -> &N::Queue {
        &self.raw
    }

    pub(super) fn signal(
        &self,
        fence: &super::Fence<N>,
        value: crate::FenceValue,
    ) -> Result<(), crate::DeviceError> {
        self.raw
            .signal(&fence.raw, value)
            .into_device_result("Signal fence")
            .inspect_err(|err| {
                if *err == crate::DeviceError::Lost {
                    self.shared.mark_lost();
                }
            })
    }

    /// Executes `command_buffers` in order, then signals `signal` if given.
    pub fn submit(
        &self,
        command_buffers: &[&super::CommandBuffer<N>],
        signal: Option<(&super::Fence<N>, crate::FenceValue)>,
    ) -> Result<(), crate::DeviceError> {
        let lists = command_buffers
            .iter()
            .map(|cmd_buf| &cmd_buf.raw)
            .collect::<Vec<_>>();
        {
            profiling::scope!("ID3D12CommandQueue::ExecuteCommandLists");
            self.raw.execute_command_lists(&lists);
        }

        if let Some((fence, value)) = signal {
            self.signal(fence, value)?;
        }

        self.shared.check_removed()
    }

    /// Writes `data` at `offset` into `buffer`.
    ///
    /// Upload buffers are written through a mapping. Default-heap buffers go
    /// through a staging copy that is waited on before returning, so the
    /// buffer must not be in a state other than `COMMON` or `COPY_DEST`.
    pub fn write_buffer(
        &self,
        buffer: &super::Buffer<N>,
        offset: crate::BufferAddress,
        data: &[u8],
    ) -> Result<(), crate::DeviceError> {
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > buffer.size) {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "write of {} bytes at {offset} overruns a {}-byte buffer",
                data.len(),
                buffer.size
            )));
        }
        if data.is_empty() {
            return Ok(());
        }

        match buffer.heap {
            HeapType::Upload => {
                let mapped = buffer.mapped.lock();
                match *mapped {
                    Some(MappedPtr(base)) => unsafe {
                        ptr::copy_nonoverlapping(
                            data.as_ptr(),
                            base.as_ptr().add(offset as usize),
                            data.len(),
                        );
                    },
                    None => {
                        let base = buffer.resource.map().into_device_result("Map buffer")?;
                        unsafe {
                            ptr::copy_nonoverlapping(
                                data.as_ptr(),
                                base.as_ptr().add(offset as usize),
                                data.len(),
                            );
                        }
                        buffer.resource.unmap();
                    }
                }
                Ok(())
            }
            HeapType::Default => {
                let staging = self.create_staging(data.len() as u64)?;
                fill_staging::<N>(&staging, |dst| dst.copy_from_slice(data))?;
                self.run_transfer(|list| {
                    list.copy_buffer_region(
                        &buffer.resource,
                        offset,
                        &staging,
                        0,
                        data.len() as u64,
                    );
                })
            }
            HeapType::Readback => Err(crate::DeviceError::InvalidArgument(
                "readback buffers cannot be written from the CPU".to_string(),
            )),
        }
    }

    /// Uploads `data`, laid out as `layout` describes, into a region of `texture`.
    ///
    /// Rows are repacked to the native pitch alignment in a staging buffer and
    /// copied with a placed footprint. Waits for the copy before returning.
    pub fn write_texture(
        &self,
        texture: &super::Texture<N>,
        base: &crate::TextureCopyBase,
        data: &[u8],
        layout: crate::ImageDataLayout,
        size: crate::CopyExtent,
    ) -> Result<(), crate::DeviceError> {
        if size.width == 0 || size.height == 0 || size.depth == 0 {
            return Ok(());
        }
        let row_bytes = size
            .width
            .checked_mul(texture.format.block_size())
            .ok_or_else(|| {
                crate::DeviceError::InvalidArgument(format!(
                    "a row of {} texels is too wide",
                    size.width
                ))
            })? as usize;
        let src_pitch = layout.bytes_per_row.map_or(row_bytes, |pitch| pitch as usize);
        let src_rows_per_image = layout.rows_per_image.unwrap_or(size.height) as usize;
        if src_pitch < row_bytes || src_rows_per_image < size.height as usize {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "data layout {layout:?} is too small for a {}x{} region",
                size.width, size.height
            )));
        }
        let required = (size.depth as usize - 1)
            .checked_mul(src_rows_per_image)
            .and_then(|rows| rows.checked_add(size.height as usize - 1))
            .and_then(|rows| rows.checked_mul(src_pitch))
            .and_then(|bytes| bytes.checked_add(row_bytes))
            .and_then(|bytes| bytes.checked_add(layout.offset as usize));
        match required {
            Some(required) if data.len() >= required => {}
            _ => {
                return Err(crate::DeviceError::InvalidArgument(format!(
                    "texture data has {} bytes, {required:?} are needed",
                    data.len()
                )))
            }
        }

        let row_pitch = conv::align_to_256(row_bytes as u64).ok_or_else(|| {
            crate::DeviceError::InvalidArgument(format!("a row of {row_bytes} bytes is too wide"))
        })? as usize;
        let height = size.height as usize;
        let staging = self.create_staging((row_pitch * height * size.depth as usize) as u64)?;
        fill_staging::<N>(&staging, |dst| {
            for z in 0..size.depth as usize {
                for y in 0..height {
                    let src = layout.offset as usize + (z * src_rows_per_image + y) * src_pitch;
                    let dst_start = (z * height + y) * row_pitch;
                    dst[dst_start..dst_start + row_bytes]
                        .copy_from_slice(&data[src..src + row_bytes]);
                }
            }
        })?;

        let footprint = native::PlacedFootprint {
            offset: 0,
            footprint: native::SubresourceFootprint {
                format: conv::map_texture_format(texture.format),
                width: size.width,
                height: size.height,
                depth: size.depth,
                row_pitch: row_pitch as u32,
            },
        };
        let src_box = native::CopyBox {
            right: size.width,
            bottom: size.height,
            back: size.depth,
            ..Default::default()
        };
        self.run_transfer(|list| {
            let src_location = TextureCopyLocation::<N>::PlacedFootprint(&staging, footprint);
            let dst_location = TextureCopyLocation::<N>::Subresource(
                &texture.resource,
                texture.calc_subresource_for_copy(base),
            );
            list.copy_texture_region(&dst_location, base.origin, &src_location, Some(&src_box));
        })
    }

    /// Presents the back buffer behind `texture`.
    pub fn present(
        &self,
        surface: &super::Surface<N>,
        texture: super::SurfaceTexture<N>,
    ) -> Result<(), crate::SurfaceError> {
        let mut swap_chain = surface.swap_chain.write();
        let sc = swap_chain
            .as_mut()
            .ok_or(crate::SurfaceError::NotConfigured)?;
        if !std::sync::Arc::ptr_eq(&sc.device, &self.shared) {
            return Err(crate::SurfaceError::Other(
                "surface is configured for another device",
            ));
        }
        sc.acquired_count = sc.acquired_count.saturating_sub(1);
        drop(texture);

        let (interval, flags) = conv::map_present_mode(sc.present_mode, sc.tearing_allowed);
        log::trace!("Presenting with interval {interval} and {flags:?}");
        let status = {
            profiling::scope!("IDXGISwapchain3::Present");
            sc.raw.present(interval, flags)
        };
        if status.is_device_lost() {
            self.shared.mark_lost();
            return Err(crate::SurfaceError::Lost);
        }
        status
            .ok()
            .into_device_result("Present")
            .map_err(super::surface::surface_error)?;

        self.shared
            .wait_for_gpu()
            .map_err(super::surface::surface_error)
    }

    fn create_staging(&self, size: u64) -> Result<N::Resource, crate::DeviceError> {
        profiling::scope!("ID3D12Device::CreateCommittedResource");
        self.shared
            .raw
            .create_committed_resource(
                HeapType::Upload,
                &native::ResourceDesc::buffer(size, native::ResourceFlags::empty()),
                conv::map_heap_initial_state(HeapType::Upload),
                None,
            )
            .into_device_result("Staging buffer creation")
    }

    /// Records one copy on the transfer list, executes it and waits for it.
    fn run_transfer(
        &self,
        record: impl FnOnce(&N::CommandList),
    ) -> Result<(), crate::DeviceError> {
        let mut transfer = self.transfer.lock();
        let super::Transfer {
            ref allocator,
            ref mut list,
        } = *transfer;

        allocator
            .reset()
            .into_device_result("Transfer allocator reset")?;
        let raw_list = match list.take() {
            Some(raw_list) => {
                raw_list
                    .reset(allocator)
                    .into_device_result("Transfer list reset")?;
                raw_list
            }
            None => self
                .shared
                .raw
                .create_command_list(allocator)
                .into_device_result("Transfer list creation")?,
        };

        record(&raw_list);
        raw_list.close().into_device_result("Close transfer list")?;
        {
            profiling::scope!("ID3D12CommandQueue::ExecuteCommandLists");
            self.raw.execute_command_lists(&[&raw_list]);
        }
        *list = Some(raw_list);

        self.shared.wait_for_gpu()?;
        self.shared.check_removed()
    }
}

fn fill_staging<N: Native>(
    staging: &N::Resource,
    fill: impl FnOnce(&mut [u8]),
) -> Result<(), crate::DeviceError> {
    let size = staging.desc().width as usize;
    let ptr = staging.map().into_device_result("Map staging buffer")?;
    // The staging resource is a fresh upload buffer of `size` bytes.
    let bytes = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), size) };
    fill(bytes);
    staging.unmap();
    Ok(())
}
