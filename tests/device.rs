use d3d12_hal::{
    BufferDescriptor, BufferUses, DeviceError, DeviceType, Extent3d, PresentMode,
    SurfaceConfiguration, SurfaceError, TextureDescriptor, TextureDimension, TextureFormat,
    TextureUses,
};

use crate::common::{initialize_test, window_handle};

#[test]
fn soft_adapter_is_exposed() {
    let ctx = initialize_test();
    assert_eq!(ctx.info.name, "Soft Reference Device");
    assert_eq!(ctx.info.device_type, DeviceType::Cpu);

    let caps = &ctx.capabilities;
    assert!(caps.tearing);
    assert_eq!(caps.alignments.buffer_copy_pitch.get(), 256);
    assert_eq!(caps.alignments.buffer_copy_offset.get(), 512);
    assert_eq!(caps.alignments.uniform_buffer_offset.get(), 256);
    assert_eq!(caps.limits.max_bind_groups, 8);
    assert_eq!(caps.limits.max_color_attachments, 8);
}

#[test]
fn textures_are_counted() {
    let ctx = initialize_test();
    let texture = ctx
        .device
        .create_texture(&TextureDescriptor {
            label: Some("mipped"),
            size: Extent3d {
                width: 16,
                height: 8,
                depth_or_array_layers: 3,
            },
            mip_level_count: 4,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUses::RESOURCE | TextureUses::COPY_DST,
        })
        .unwrap();
    assert_eq!(texture.mip_level_count(), 4);
    assert_eq!(texture.array_layer_count(), 3);
    assert_eq!(texture.calc_subresource(1, 2, 0), 1 + 2 * 4);
    assert!(!texture.is_external());
    assert_eq!(texture.raw().name().as_deref(), Some("mipped"));
    assert_eq!(ctx.device.counters().textures.read(), 1);

    ctx.device.destroy_texture(texture);
    assert_eq!(ctx.device.counters().textures.read(), 0);
}

#[test]
fn degenerate_textures_are_rejected() {
    let ctx = initialize_test();
    let result = ctx.device.create_texture(&TextureDescriptor {
        label: None,
        size: Extent3d {
            width: 0,
            height: 4,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUses::RESOURCE,
    });
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
    assert_eq!(ctx.device.counters().textures.read(), 0);
}

#[test]
fn textures_beyond_native_limits_are_rejected() {
    let ctx = initialize_test();
    let desc = |layers: u32, mips: u32| TextureDescriptor {
        label: None,
        size: Extent3d {
            width: 4,
            height: 4,
            depth_or_array_layers: layers,
        },
        mip_level_count: mips,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUses::RESOURCE,
    };
    for (layers, mips) in [(70_000, 1), (1, 70_000)] {
        let result = ctx.device.create_texture(&desc(layers, mips));
        assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
    }
    assert_eq!(ctx.device.counters().textures.read(), 0);
}

#[test]
fn removal_is_reported_as_loss() {
    let ctx = initialize_test();
    let surface = ctx.instance.create_surface(window_handle()).unwrap();
    surface
        .configure(
            &ctx.device,
            &SurfaceConfiguration {
                swap_chain_size: 2,
                present_mode: PresentMode::Fifo,
                format: TextureFormat::Bgra8Unorm,
                extent: Extent3d {
                    width: 64,
                    height: 64,
                    depth_or_array_layers: 1,
                },
                usage: TextureUses::COLOR_TARGET,
            },
        )
        .unwrap();
    let fence = ctx.device.create_fence().unwrap();
    assert!(!ctx.device.is_lost());

    ctx.device.raw().simulate_removed();
    assert_eq!(ctx.queue.submit(&[], None), Err(DeviceError::Lost));
    assert!(ctx.device.is_lost());

    assert_eq!(fence.value(), Err(DeviceError::Lost));
    assert_eq!(ctx.device.wait_for_gpu(), Err(DeviceError::Lost));
    let buffer = ctx.device.create_buffer(&BufferDescriptor {
        label: None,
        size: 16,
        usage: BufferUses::MAP_WRITE,
        mapped_at_creation: false,
    });
    assert!(matches!(buffer, Err(DeviceError::Lost)));
    assert!(matches!(surface.acquire_texture(), Err(SurfaceError::Lost)));

    // Unconfiguring a lost surface still succeeds.
    surface.unconfigure();
    assert!(!surface.is_configured());
}
