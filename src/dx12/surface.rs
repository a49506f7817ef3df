use std::sync::Arc;

use super::{conv, BackBuffer, DescriptorSlot, SwapChain};
use crate::native::{
    self, Native, NativeResultExt as _, RawDevice as _, RawInstance as _, RawSwapChain as _,
    SwapChainFlags, WindowAssociation,
};

const SWAP_CHAIN_SIZES: std::ops::RangeInclusive<u32> = 2..=16;

/// A back buffer handed out by [`super::Surface::acquire_texture`].
///
/// Give it back with [`super::Queue::present`] or
/// [`super::Surface::discard_texture`].
#[derive(Debug)]
pub struct SurfaceTexture<N: Native> {
    texture: super::Texture<N>,
    view: super::TextureView<N>,
    index: u32,
}

impl<N: Native> SurfaceTexture<N> {
    pub fn texture(&self) -> &super::Texture<N> {
        &self.texture
    }

    /// Render target view over the whole back buffer.
    pub fn view(&self) -> &super::TextureView<N> {
        &self.view
    }

    /// Index of the back buffer in the swapchain.
    pub fn index(&self) -> u32 {
        self.index
    }
}

pub(super) fn surface_error(err: crate::DeviceError) -> crate::SurfaceError {
    match err {
        crate::DeviceError::Lost => crate::SurfaceError::Lost,
        other => crate::SurfaceError::Device(other),
    }
}

impl<N: Native> SwapChain<N> {
    fn fetch_back_buffers(&mut self, buffer_count: u32) -> Result<(), crate::SurfaceError> {
        let rtv_desc = native::RenderTargetViewDesc {
            format: conv::map_texture_format(self.format),
            dimension: native::RtvDimension::Texture2D { mip_slice: 0 },
        };
        let mut back_buffers = Vec::with_capacity(buffer_count as usize);
        for i in 0..buffer_count {
            let resource = self
                .raw
                .buffer(i)
                .into_device_result("Failed to get swapchain buffer")
                .map_err(surface_error)?;
            let rtv = DescriptorSlot::new(&self.device.rtv_heap).map_err(surface_error)?;
            self.device
                .raw
                .create_render_target_view(&resource, Some(&rtv_desc), rtv.raw());
            back_buffers.push(BackBuffer {
                resource,
                rtv: Arc::new(rtv),
            });
        }
        self.back_buffers = back_buffers;
        Ok(())
    }
}

impl<N: Native> super::Surface<N> {
    pub fn supports_allow_tearing(&self) -> bool {
        self.supports_allow_tearing
    }

    pub fn is_configured(&self) -> bool {
        self.swap_chain.read().is_some()
    }

    pub fn get_capabilities(&self) -> crate::SurfaceCapabilities {
        let mut present_modes = vec![crate::PresentMode::Fifo, crate::PresentMode::Mailbox];
        if self.supports_allow_tearing {
            present_modes.push(crate::PresentMode::Immediate);
        }
        let current_extent = self.swap_chain.read().as_ref().map(|sc| sc.size);

        crate::SurfaceCapabilities {
            formats: vec![
                crate::TextureFormat::Bgra8UnormSrgb,
                crate::TextureFormat::Bgra8Unorm,
                crate::TextureFormat::Rgba8UnormSrgb,
                crate::TextureFormat::Rgba8Unorm,
                crate::TextureFormat::Rgb10a2Unorm,
                crate::TextureFormat::Rgba16Float,
            ],
            swap_chain_sizes: SWAP_CHAIN_SIZES,
            current_extent,
            usage: crate::TextureUses::COLOR_TARGET
                | crate::TextureUses::COPY_SRC
                | crate::TextureUses::COPY_DST,
            present_modes,
        }
    }

    /// Creates or resizes the swapchain of this surface.
    ///
    /// The swapchain is resized in place when it already belongs to `device`
    /// and the tearing flag stays the same, otherwise it is recreated.
    pub fn configure(
        &self,
        device: &super::Device<N>,
        config: &crate::SurfaceConfiguration,
    ) -> Result<(), crate::SurfaceError> {
        if !SWAP_CHAIN_SIZES.contains(&config.swap_chain_size) {
            return Err(crate::SurfaceError::Device(
                crate::DeviceError::InvalidArgument(format!(
                    "swapchain size {} is outside of {SWAP_CHAIN_SIZES:?}",
                    config.swap_chain_size
                )),
            ));
        }
        if config.extent.width == 0 || config.extent.height == 0 {
            return Err(crate::SurfaceError::Device(
                crate::DeviceError::InvalidArgument(format!(
                    "surface extent {}x{} is empty",
                    config.extent.width, config.extent.height
                )),
            ));
        }
        if config.format.is_depth_stencil() {
            return Err(crate::SurfaceError::Device(
                crate::DeviceError::InvalidArgument(format!(
                    "{:?} cannot be presented",
                    config.format
                )),
            ));
        }

        let tearing_allowed =
            config.present_mode == crate::PresentMode::Immediate && self.supports_allow_tearing;
        let flags = if tearing_allowed {
            SwapChainFlags::ALLOW_TEARING
        } else {
            SwapChainFlags::empty()
        };
        let non_srgb_format = conv::map_texture_format_nosrgb(config.format);
        let size = crate::Extent3d {
            width: config.extent.width,
            height: config.extent.height,
            depth_or_array_layers: 1,
        };

        let mut swap_chain = self.swap_chain.write();
        let reusable = match *swap_chain {
            Some(ref sc) => {
                Arc::ptr_eq(&sc.device, &device.shared) && sc.tearing_allowed == tearing_allowed
            }
            None => false,
        };
        if reusable {
            if let Some(ref sc) = *swap_chain {
                if sc.acquired_count != 0 {
                    return Err(crate::SurfaceError::Other(
                        "surface textures are still acquired",
                    ));
                }
            }
        }

        let mut sc = match swap_chain.take() {
            Some(mut sc) if reusable => {
                sc.device.wait_for_gpu().map_err(surface_error)?;
                // Releases the buffer references and their RTV slots.
                sc.back_buffers.clear();
                let result = {
                    profiling::scope!("IDXGISwapChain3::ResizeBuffers");
                    sc.raw.resize_buffers(
                        config.swap_chain_size,
                        config.extent.width,
                        config.extent.height,
                        non_srgb_format,
                        flags,
                    )
                };
                if let Err(status) = result {
                    log::error!("ResizeBuffers failed: {status}");
                    return Err(crate::SurfaceError::Other("window is in use"));
                }
                sc.present_mode = config.present_mode;
                sc.format = config.format;
                sc.usage = config.usage;
                sc.size = size;
                sc
            }
            old => {
                if let Some(old) = old {
                    log::debug!("Recreating the swapchain");
                    if let Err(err) = old.device.wait_for_gpu() {
                        log::warn!("Draining the previous device failed: {err}");
                    }
                    drop(old);
                }

                let desc = native::SwapChainDesc {
                    width: config.extent.width,
                    height: config.extent.height,
                    format: non_srgb_format,
                    buffer_count: config.swap_chain_size,
                    flags,
                };
                let raw = {
                    profiling::scope!("IDXGIFactory2::CreateSwapChainForHwnd");
                    self.instance.create_swap_chain_for_window(
                        &device.shared.present_queue,
                        &self.window,
                        &desc,
                    )
                }
                .map_err(|status| {
                    log::error!("SwapChain creation error: {status}");
                    crate::SurfaceError::Other("swapchain creation")
                })?;

                // Disable automatic Alt+Enter handling by DXGI.
                self.instance
                    .make_window_association(
                        &self.window,
                        WindowAssociation::NO_WINDOW_CHANGES | WindowAssociation::NO_ALT_ENTER,
                    )
                    .into_device_result("MakeWindowAssociation")?;

                SwapChain {
                    raw,
                    device: Arc::clone(&device.shared),
                    back_buffers: Vec::new(),
                    acquired_count: 0,
                    present_mode: config.present_mode,
                    format: config.format,
                    usage: config.usage,
                    size,
                    tearing_allowed,
                }
            }
        };

        sc.fetch_back_buffers(config.swap_chain_size)?;
        log::debug!(
            "Configured a {}x{} {:?} swapchain with {} buffers, {:?}",
            size.width,
            size.height,
            config.format,
            config.swap_chain_size,
            config.present_mode
        );
        *swap_chain = Some(sc);
        Ok(())
    }

    /// Drains the swapchain's device and drops the swapchain.
    pub fn unconfigure(&self) {
        if let Some(sc) = self.swap_chain.write().take() {
            // Device loss is not an error here, the swapchain goes away regardless.
            if let Err(err) = sc.device.wait_for_gpu() {
                log::warn!("Unconfiguring a surface: {err}");
            }
        }
    }

    pub fn acquire_texture(&self) -> Result<SurfaceTexture<N>, crate::SurfaceError> {
        let mut swap_chain = self.swap_chain.write();
        let sc = swap_chain
            .as_mut()
            .ok_or(crate::SurfaceError::NotConfigured)?;
        if sc.device.lost.load(std::sync::atomic::Ordering::Acquire) {
            return Err(crate::SurfaceError::Lost);
        }
        if sc.acquired_count >= sc.back_buffers.len() {
            return Err(crate::SurfaceError::Other("all back buffers are acquired"));
        }

        let base_index = sc.raw.current_back_buffer_index() as usize;
        let index = (base_index + sc.acquired_count) % sc.back_buffers.len();
        sc.acquired_count += 1;
        let back_buffer = &sc.back_buffers[index];

        let texture = super::Texture {
            resource: back_buffer.resource.clone(),
            format: sc.format,
            dimension: crate::TextureDimension::D2,
            size: sc.size,
            mip_level_count: 1,
            sample_count: 1,
            usage: sc.usage,
            is_external: true,
        };
        let view = super::TextureView {
            format: sc.format,
            raw_format: conv::map_texture_format(sc.format),
            aspects: crate::FormatAspects::COLOR,
            dimension: crate::TextureViewDimension::D2,
            mip_levels: 0..1,
            array_layers: 0..1,
            extent: sc.size,
            sample_count: 1,
            handle_srv: None,
            handle_uav: None,
            handle_rtv: Some(Arc::clone(&back_buffer.rtv)),
            handle_dsv_ro: None,
            handle_dsv_rw: None,
        };
        log::trace!("Acquired back buffer {index}");
        Ok(SurfaceTexture {
            texture,
            view,
            index: index as u32,
        })
    }

    /// Returns an acquired texture without presenting it.
    pub fn discard_texture(&self, texture: SurfaceTexture<N>) {
        if let Some(ref mut sc) = *self.swap_chain.write() {
            sc.acquired_count = sc.acquired_count.saturating_sub(1);
        }
        drop(texture);
    }
}
