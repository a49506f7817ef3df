use std::{num::NonZeroU64, time::Duration};

use d3d12_hal::{
    native::HeapType, BufferBarrier, BufferCopy, BufferDescriptor, BufferUses, DeviceError,
};

use crate::common::initialize_test;

#[test]
fn upload_buffer_round_trip() {
    let ctx = initialize_test();
    let buffer = ctx.buffer(256, BufferUses::MAP_WRITE | BufferUses::COPY_SRC);
    assert_eq!(buffer.heap(), HeapType::Upload);

    ctx.queue.write_buffer(&buffer, 0, &[0xAB; 256]).unwrap();

    let mapping = ctx.device.map_buffer(&buffer, 0..256).unwrap();
    assert!(mapping.is_coherent);
    let contents = unsafe { std::slice::from_raw_parts(mapping.ptr.as_ptr(), 256) };
    assert!(contents.iter().all(|&byte| byte == 0xAB));
    ctx.device.unmap_buffer(&buffer);
    assert!(!buffer.is_mapped());
}

#[test]
fn mapped_at_creation_round_trip_through_readback() {
    let ctx = initialize_test();
    let upload = ctx
        .device
        .create_buffer(&BufferDescriptor {
            label: Some("source"),
            size: 256,
            usage: BufferUses::COPY_SRC,
            mapped_at_creation: true,
        })
        .unwrap();
    let readback = ctx.buffer(256, BufferUses::MAP_READ | BufferUses::COPY_DST);

    let mapping = ctx.device.map_buffer(&upload, 0..256).unwrap();
    unsafe { std::ptr::write_bytes(mapping.ptr.as_ptr(), 0xAB, 256) };
    ctx.device.unmap_buffer(&upload);
    assert!(!upload.is_mapped());

    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();
    encoder
        .copy_buffer_to_buffer(
            &upload,
            &readback,
            [BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: NonZeroU64::new(256).unwrap(),
            }],
        )
        .unwrap();
    let cmd_buf = encoder.end_encoding().unwrap();

    let fence = ctx.device.create_fence().unwrap();
    ctx.queue.submit(&[&cmd_buf], Some((&fence, 1))).unwrap();
    assert!(fence.wait(1, Some(Duration::from_secs(5))).unwrap());

    assert_eq!(ctx.read_buffer(&readback, 256), vec![0xAB; 256]);
}

#[test]
fn default_buffer_reaches_readback_through_a_copy() {
    let ctx = initialize_test();
    let data = (0..64u8).collect::<Vec<_>>();

    let gpu = ctx.buffer(64, BufferUses::COPY_SRC | BufferUses::COPY_DST);
    assert_eq!(gpu.heap(), HeapType::Default);
    ctx.queue.write_buffer(&gpu, 0, &data).unwrap();

    let readback = ctx.buffer(64, BufferUses::MAP_READ | BufferUses::COPY_DST);
    assert_eq!(readback.heap(), HeapType::Readback);

    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(Some("readback")).unwrap();
    encoder
        .transition_buffers([BufferBarrier {
            buffer: &gpu,
            usage: BufferUses::empty()..BufferUses::COPY_SRC,
        }])
        .unwrap();
    encoder
        .copy_buffer_to_buffer(
            &gpu,
            &readback,
            [BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: NonZeroU64::new(64).unwrap(),
            }],
        )
        .unwrap();
    let cmd_buf = encoder.end_encoding().unwrap();

    let fence = ctx.device.create_fence().unwrap();
    ctx.queue.submit(&[&cmd_buf], Some((&fence, 1))).unwrap();
    assert_eq!(fence.value().unwrap(), 1);

    assert_eq!(ctx.read_buffer(&readback, 64), data);
    let stats = ctx.device.raw().stats();
    assert_eq!(stats.barrier_mismatches, 0);
    assert_eq!(stats.copies, 2);
}

#[test]
fn partial_write_keeps_surrounding_bytes() {
    let ctx = initialize_test();
    let buffer = ctx.buffer(16, BufferUses::MAP_WRITE);
    ctx.queue.write_buffer(&buffer, 0, &[1; 16]).unwrap();
    ctx.queue.write_buffer(&buffer, 4, &[9; 4]).unwrap();

    let mapping = ctx.device.map_buffer(&buffer, 0..16).unwrap();
    let contents = unsafe { std::slice::from_raw_parts(mapping.ptr.as_ptr(), 16) };
    assert_eq!(&contents[..4], &[1; 4]);
    assert_eq!(&contents[4..8], &[9; 4]);
    assert_eq!(&contents[8..], &[1; 8]);
}

#[test]
fn map_offsets_the_pointer() {
    let ctx = initialize_test();
    let buffer = ctx.buffer(32, BufferUses::MAP_WRITE);
    let base = ctx.device.map_buffer(&buffer, 0..32).unwrap();
    let tail = ctx.device.map_buffer(&buffer, 16..32).unwrap();
    assert_eq!(tail.ptr.as_ptr() as usize - base.ptr.as_ptr() as usize, 16);
    assert!(buffer.is_mapped());
    assert!(buffer.raw().is_mapped());
}

#[test]
fn mapped_at_creation_lands_in_the_upload_heap() {
    let ctx = initialize_test();
    let buffer = ctx
        .device
        .create_buffer(&BufferDescriptor {
            label: Some("initial data"),
            size: 128,
            usage: BufferUses::VERTEX,
            mapped_at_creation: true,
        })
        .unwrap();
    assert_eq!(buffer.heap(), HeapType::Upload);
    assert!(buffer.is_mapped());
    assert_eq!(buffer.raw().name().as_deref(), Some("initial data"));

    ctx.device.unmap_buffer(&buffer);
    assert!(!buffer.is_mapped());
    assert!(!buffer.raw().is_mapped());
}

#[test]
fn conflicting_map_usages_are_rejected() {
    let ctx = initialize_test();
    let result = ctx.device.create_buffer(&BufferDescriptor {
        label: None,
        size: 64,
        usage: BufferUses::MAP_READ | BufferUses::MAP_WRITE,
        mapped_at_creation: false,
    });
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
}

#[test]
fn zero_sized_buffers_are_rejected() {
    let ctx = initialize_test();
    let result = ctx.device.create_buffer(&BufferDescriptor {
        label: None,
        size: 0,
        usage: BufferUses::COPY_DST,
        mapped_at_creation: false,
    });
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
}

#[test]
fn uniform_buffers_are_padded_to_256_bytes() {
    let ctx = initialize_test();
    let buffer = ctx.buffer(100, BufferUses::UNIFORM | BufferUses::COPY_DST);
    assert_eq!(buffer.size(), 100);
    assert_eq!(buffer.allocated_size(), 256);
    assert_eq!(ctx.device.counters().buffers.read(), 1);
    assert_eq!(ctx.device.counters().buffer_memory.read(), 256);

    ctx.device.destroy_buffer(buffer);
    assert_eq!(ctx.device.counters().buffers.read(), 0);
    assert_eq!(ctx.device.counters().buffer_memory.read(), 0);
}

#[test]
fn default_buffers_cannot_be_mapped() {
    let ctx = initialize_test();
    let buffer = ctx.buffer(64, BufferUses::STORAGE_READ_WRITE);
    let result = ctx.device.map_buffer(&buffer, 0..64);
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
}

#[test]
fn map_range_past_the_end_is_rejected() {
    let ctx = initialize_test();
    let buffer = ctx.buffer(64, BufferUses::MAP_READ);
    let result = ctx.device.map_buffer(&buffer, 32..65);
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
}

#[test]
fn overrunning_writes_are_rejected() {
    let ctx = initialize_test();
    let buffer = ctx.buffer(16, BufferUses::MAP_WRITE);
    let result = ctx.queue.write_buffer(&buffer, 8, &[0; 9]);
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));

    let readback = ctx.buffer(16, BufferUses::MAP_READ);
    let result = ctx.queue.write_buffer(&readback, 0, &[0; 4]);
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
}

#[test]
fn copy_regions_are_validated_before_recording() {
    let ctx = initialize_test();
    let src = ctx.buffer(16, BufferUses::COPY_SRC);
    let dst = ctx.buffer(64, BufferUses::COPY_DST);

    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();
    let result = encoder.copy_buffer_to_buffer(
        &src,
        &dst,
        [
            BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: NonZeroU64::new(8).unwrap(),
            },
            BufferCopy {
                src_offset: 12,
                dst_offset: 0,
                size: NonZeroU64::new(8).unwrap(),
            },
        ],
    );
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));

    let cmd_buf = encoder.end_encoding().unwrap();
    assert!(cmd_buf.raw().commands().is_empty());
}

#[test]
fn oversized_uniform_buffers_are_rejected() {
    let ctx = initialize_test();
    let result = ctx.device.create_buffer(&BufferDescriptor {
        label: None,
        size: u64::MAX - 10,
        usage: BufferUses::UNIFORM,
        mapped_at_creation: false,
    });
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
    assert_eq!(ctx.device.counters().buffers.read(), 0);
}

#[test]
fn wrapping_copy_offsets_are_rejected() {
    let ctx = initialize_test();
    let src = ctx.buffer(16, BufferUses::COPY_SRC);
    let dst = ctx.buffer(16, BufferUses::COPY_DST);

    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();
    let result = encoder.copy_buffer_to_buffer(
        &src,
        &dst,
        [BufferCopy {
            src_offset: u64::MAX - 4,
            dst_offset: 0,
            size: NonZeroU64::new(8).unwrap(),
        }],
    );
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
    let cmd_buf = encoder.end_encoding().unwrap();
    assert!(cmd_buf.raw().commands().is_empty());
}
