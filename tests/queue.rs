use d3d12_hal::{
    native::soft::JournalEntry, CopyExtent, DeviceError, Extent3d, FormatAspects,
    ImageDataLayout, Origin3d, TextureCopyBase, TextureDescriptor, TextureDimension,
    TextureFormat, TextureUses,
};

use crate::common::initialize_test;

const COPY_BASE: TextureCopyBase = TextureCopyBase {
    mip_level: 0,
    array_layer: 0,
    origin: Origin3d::ZERO,
    aspect: FormatAspects::COLOR,
};

fn texels(count: usize) -> Vec<u8> {
    (0..count * 4).map(|i| i as u8).collect()
}

#[test]
fn whole_texture_upload() {
    let ctx = initialize_test();
    let texture = ctx.texture_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUses::COPY_DST);
    let data = texels(16);

    ctx.queue
        .write_texture(
            &texture,
            &COPY_BASE,
            &data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(16),
                rows_per_image: None,
            },
            CopyExtent {
                width: 4,
                height: 4,
                depth: 1,
            },
        )
        .unwrap();

    assert_eq!(texture.raw().read_subresource(0), data);
    assert_eq!(ctx.device.raw().stats().copies, 1);
}

#[test]
fn sub_region_upload_keeps_the_rest() {
    let ctx = initialize_test();
    let texture = ctx.texture_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUses::COPY_DST);
    // Two rows of two texels with a loose source pitch.
    let data = [[1u8; 8], [2u8; 8]].concat();

    ctx.queue
        .write_texture(
            &texture,
            &TextureCopyBase {
                origin: Origin3d { x: 1, y: 1, z: 0 },
                ..COPY_BASE
            },
            &data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(8),
                rows_per_image: None,
            },
            CopyExtent {
                width: 2,
                height: 2,
                depth: 1,
            },
        )
        .unwrap();

    let contents = texture.raw().read_subresource(0);
    let texel = |x: usize, y: usize| &contents[(y * 4 + x) * 4..][..4];
    assert_eq!(texel(0, 0), [0; 4]);
    assert_eq!(texel(1, 1), [1; 4]);
    assert_eq!(texel(2, 1), [1; 4]);
    assert_eq!(texel(1, 2), [2; 4]);
    assert_eq!(texel(2, 2), [2; 4]);
    assert_eq!(texel(3, 3), [0; 4]);
}

#[test]
fn upload_into_a_mip_level() {
    let ctx = initialize_test();
    let texture = ctx
        .device
        .create_texture(&TextureDescriptor {
            label: None,
            size: Extent3d {
                width: 4,
                height: 4,
                depth_or_array_layers: 1,
            },
            mip_level_count: 2,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUses::COPY_DST,
        })
        .unwrap();
    let data = texels(4);

    ctx.queue
        .write_texture(
            &texture,
            &TextureCopyBase {
                mip_level: 1,
                ..COPY_BASE
            },
            &data,
            ImageDataLayout::default(),
            CopyExtent {
                width: 2,
                height: 2,
                depth: 1,
            },
        )
        .unwrap();

    assert_eq!(texture.raw().read_subresource(1), data);
    assert!(texture.raw().read_subresource(0).iter().all(|&b| b == 0));
}

#[test]
fn short_texture_data_is_rejected() {
    let ctx = initialize_test();
    let texture = ctx.texture_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUses::COPY_DST);
    let extent = CopyExtent {
        width: 4,
        height: 4,
        depth: 1,
    };

    let result = ctx.queue.write_texture(
        &texture,
        &COPY_BASE,
        &texels(15),
        ImageDataLayout::default(),
        extent,
    );
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));

    // A pitch narrower than a row is rejected as well.
    let result = ctx.queue.write_texture(
        &texture,
        &COPY_BASE,
        &texels(16),
        ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(8),
            rows_per_image: None,
        },
        extent,
    );
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
    assert_eq!(ctx.device.raw().stats().copies, 0);
}

#[test]
fn empty_uploads_do_nothing() {
    let ctx = initialize_test();
    let texture = ctx.texture_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUses::COPY_DST);
    ctx.device.raw().clear_journal();

    ctx.queue
        .write_texture(
            &texture,
            &COPY_BASE,
            &[],
            ImageDataLayout::default(),
            CopyExtent {
                width: 0,
                height: 4,
                depth: 1,
            },
        )
        .unwrap();
    assert!(ctx.device.raw().journal().is_empty());
}

#[test]
fn empty_submissions_still_reach_the_queue() {
    let ctx = initialize_test();
    ctx.device.raw().clear_journal();
    ctx.queue.submit(&[], None).unwrap();
    assert_eq!(
        ctx.device.raw().journal(),
        vec![JournalEntry::ExecuteCommandLists { count: 0 }]
    );
}
