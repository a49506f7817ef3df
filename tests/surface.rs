use d3d12_hal::{
    dx12,
    native::{
        soft::{JournalEntry, Soft},
        Format, PresentFlags, SwapChainDesc, SwapChainFlags, WindowAssociation,
    },
    DeviceError, Extent3d, PresentMode, SurfaceConfiguration, SurfaceError, TextureFormat,
    TextureUses,
};

use crate::common::{initialize_test, window_handle, TestingContext};

fn config(width: u32, height: u32, present_mode: PresentMode) -> SurfaceConfiguration {
    SurfaceConfiguration {
        swap_chain_size: 2,
        present_mode,
        format: TextureFormat::Bgra8UnormSrgb,
        extent: Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        usage: TextureUses::COLOR_TARGET,
    }
}

fn configured(ctx: &TestingContext, present_mode: PresentMode) -> dx12::Surface<Soft> {
    let surface = ctx.instance.create_surface(window_handle()).unwrap();
    surface
        .configure(&ctx.device, &config(800, 600, present_mode))
        .unwrap();
    surface
}

#[test]
fn capabilities_follow_tearing_support() {
    let ctx = initialize_test();
    let surface = ctx.instance.create_surface(window_handle()).unwrap();
    let caps = surface.get_capabilities();
    assert!(surface.supports_allow_tearing());
    assert_eq!(
        caps.present_modes,
        vec![PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate]
    );
    assert_eq!(caps.swap_chain_sizes, 2..=16);
    assert!(caps.current_extent.is_none());
    assert!(caps.formats.contains(&TextureFormat::Bgra8UnormSrgb));

    ctx.instance.raw().set_tearing_support(false);
    let surface = ctx.instance.create_surface(window_handle()).unwrap();
    assert!(!surface.supports_allow_tearing());
    assert_eq!(
        surface.get_capabilities().present_modes,
        vec![PresentMode::Fifo, PresentMode::Mailbox]
    );
}

#[test]
fn first_configure_creates_the_swapchain() {
    let ctx = initialize_test();
    ctx.device.raw().clear_journal();
    let surface = configured(&ctx, PresentMode::Fifo);

    assert!(surface.is_configured());
    assert_eq!(
        ctx.device.raw().journal(),
        vec![
            JournalEntry::CreateSwapChain(SwapChainDesc {
                width: 800,
                height: 600,
                format: Format::B8G8R8A8_UNORM,
                buffer_count: 2,
                flags: SwapChainFlags::empty(),
            }),
            JournalEntry::MakeWindowAssociation(
                WindowAssociation::NO_WINDOW_CHANGES | WindowAssociation::NO_ALT_ENTER
            ),
        ]
    );
    assert_eq!(
        surface.get_capabilities().current_extent,
        Some(Extent3d {
            width: 800,
            height: 600,
            depth_or_array_layers: 1,
        })
    );
    assert_eq!(ctx.device.heap_report().render_targets.next_free, 2);
}

#[test]
fn reconfiguring_resizes_in_place() {
    let ctx = initialize_test();
    let surface = configured(&ctx, PresentMode::Fifo);

    // Present a frame so a surface texture has shared the back buffer's RTV.
    let frame = surface.acquire_texture().unwrap();
    let first_rtv = frame.view().rtv().expect("back buffer RTV");
    ctx.queue.present(&surface, frame).unwrap();

    let rtvs_before = ctx.device.heap_report().render_targets;
    ctx.device.raw().clear_journal();

    surface
        .configure(&ctx.device, &config(1920, 1080, PresentMode::Fifo))
        .unwrap();

    let journal = ctx.device.raw().journal();
    match journal.as_slice() {
        [JournalEntry::Signal { value }, JournalEntry::SetEventOnCompletion { value: waited }, JournalEntry::ResizeBuffers {
            buffer_count: 2,
            width: 1920,
            height: 1080,
            format: Format::B8G8R8A8_UNORM,
        }] => assert_eq!(value, waited),
        other => panic!("unexpected journal {other:?}"),
    }
    assert_eq!(ctx.device.heap_report().render_targets, rtvs_before);

    let frame = surface.acquire_texture().unwrap();
    assert_eq!(frame.index(), 0);
    assert_eq!(frame.view().rtv(), Some(first_rtv));
    assert_eq!(
        frame.texture().size(),
        Extent3d {
            width: 1920,
            height: 1080,
            depth_or_array_layers: 1,
        }
    );
    surface.discard_texture(frame);
}

#[test]
fn acquire_and_present_cycle_through_back_buffers() {
    let ctx = initialize_test();
    let surface = configured(&ctx, PresentMode::Fifo);
    ctx.device.raw().clear_journal();

    let frame = surface.acquire_texture().unwrap();
    assert_eq!(frame.index(), 0);
    assert!(frame.texture().is_external());
    assert!(frame.view().rtv().is_some());
    ctx.queue.present(&surface, frame).unwrap();
    assert_eq!(
        ctx.device.raw().journal().first(),
        Some(&JournalEntry::Present {
            sync_interval: 1,
            flags: PresentFlags::empty(),
        })
    );

    let frame = surface.acquire_texture().unwrap();
    assert_eq!(frame.index(), 1);
    ctx.queue.present(&surface, frame).unwrap();
    assert_eq!(surface.acquire_texture().unwrap().index(), 0);
}

#[test]
fn acquiring_past_the_swapchain_fails() {
    let ctx = initialize_test();
    let surface = configured(&ctx, PresentMode::Mailbox);

    let first = surface.acquire_texture().unwrap();
    let second = surface.acquire_texture().unwrap();
    assert_eq!((first.index(), second.index()), (0, 1));
    assert!(matches!(
        surface.acquire_texture(),
        Err(SurfaceError::Other(_))
    ));

    surface.discard_texture(second);
    let again = surface.acquire_texture().unwrap();
    assert_eq!(again.index(), 1);

    // Reconfiguring while textures are out is refused.
    assert!(matches!(
        surface.configure(&ctx.device, &config(640, 480, PresentMode::Mailbox)),
        Err(SurfaceError::Other(_))
    ));

    ctx.device.raw().clear_journal();
    ctx.queue.present(&surface, first).unwrap();
    assert_eq!(
        ctx.device.raw().journal().first(),
        Some(&JournalEntry::Present {
            sync_interval: 0,
            flags: PresentFlags::empty(),
        })
    );
    surface.discard_texture(again);
}

#[test]
fn unconfigured_surfaces_have_no_textures() {
    let ctx = initialize_test();
    let surface = ctx.instance.create_surface(window_handle()).unwrap();
    assert!(!surface.is_configured());
    assert!(matches!(
        surface.acquire_texture(),
        Err(SurfaceError::NotConfigured)
    ));
}

#[test]
fn invalid_configurations_are_rejected() {
    let ctx = initialize_test();
    let surface = ctx.instance.create_surface(window_handle()).unwrap();

    let too_short = SurfaceConfiguration {
        swap_chain_size: 1,
        ..config(800, 600, PresentMode::Fifo)
    };
    assert!(matches!(
        surface.configure(&ctx.device, &too_short),
        Err(SurfaceError::Device(DeviceError::InvalidArgument(_)))
    ));
    assert!(matches!(
        surface.configure(&ctx.device, &config(0, 600, PresentMode::Fifo)),
        Err(SurfaceError::Device(DeviceError::InvalidArgument(_)))
    ));
    let depth = SurfaceConfiguration {
        format: TextureFormat::Depth32Float,
        ..config(800, 600, PresentMode::Fifo)
    };
    assert!(matches!(
        surface.configure(&ctx.device, &depth),
        Err(SurfaceError::Device(DeviceError::InvalidArgument(_)))
    ));
    assert!(!surface.is_configured());
}

#[test]
fn immediate_mode_allows_tearing() {
    let ctx = initialize_test();
    ctx.device.raw().clear_journal();
    let surface = configured(&ctx, PresentMode::Immediate);
    match ctx.device.raw().journal().first() {
        Some(JournalEntry::CreateSwapChain(desc)) => {
            assert_eq!(desc.flags, SwapChainFlags::ALLOW_TEARING)
        }
        other => panic!("unexpected journal entry {other:?}"),
    }

    ctx.device.raw().clear_journal();
    let frame = surface.acquire_texture().unwrap();
    ctx.queue.present(&surface, frame).unwrap();
    assert_eq!(
        ctx.device.raw().journal().first(),
        Some(&JournalEntry::Present {
            sync_interval: 0,
            flags: PresentFlags::ALLOW_TEARING,
        })
    );
}

#[test]
fn changing_the_tearing_flag_recreates_the_swapchain() {
    let ctx = initialize_test();
    let surface = configured(&ctx, PresentMode::Fifo);
    ctx.device.raw().clear_journal();

    surface
        .configure(&ctx.device, &config(800, 600, PresentMode::Immediate))
        .unwrap();
    let journal = ctx.device.raw().journal();
    assert!(!journal
        .iter()
        .any(|entry| matches!(entry, JournalEntry::ResizeBuffers { .. })));
    assert!(journal.iter().any(|entry| matches!(
        entry,
        JournalEntry::CreateSwapChain(desc) if desc.flags == SwapChainFlags::ALLOW_TEARING
    )));
    // The old back buffers gave their render target slots back.
    assert_eq!(ctx.device.heap_report().render_targets.next_free, 2);
}

#[test]
fn unconfigure_drops_the_swapchain() {
    let ctx = initialize_test();
    let surface = configured(&ctx, PresentMode::Fifo);
    surface.unconfigure();
    assert!(!surface.is_configured());
    assert!(surface.get_capabilities().current_extent.is_none());
    assert_eq!(ctx.device.heap_report().render_targets.next_free, 0);
    assert!(matches!(
        surface.acquire_texture(),
        Err(SurfaceError::NotConfigured)
    ));
}
