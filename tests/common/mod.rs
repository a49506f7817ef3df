//! Shared setup for the tests: a soft instance, its adapter and an open device.

use std::num::NonZeroIsize;

use d3d12_hal::{
    dx12, native::soft::Soft, BufferDescriptor, BufferUses, DeviceDescriptor, Extent3d,
    HeapCapacities, InstanceDescriptor, InstanceFlags, TextureDescriptor, TextureDimension,
    TextureFormat, TextureUses,
};
use raw_window_handle::{RawWindowHandle, Win32WindowHandle};

/// Heaps small enough that leaks and exhaustion show up quickly.
pub const TEST_HEAPS: HeapCapacities = HeapCapacities {
    views: 256,
    samplers: 32,
    render_targets: 16,
    depth_stencils: 8,
    view_staging: 64,
    sampler_staging: 16,
};

pub struct TestingContext {
    pub instance: dx12::Instance<Soft>,
    pub adapter: dx12::Adapter<Soft>,
    pub info: d3d12_hal::AdapterInfo,
    pub capabilities: d3d12_hal::Capabilities,
    pub device: dx12::Device<Soft>,
    pub queue: dx12::Queue<Soft>,
}

pub fn initialize_test() -> TestingContext {
    initialize_test_with(TEST_HEAPS)
}

pub fn initialize_test_with(heap_capacities: HeapCapacities) -> TestingContext {
    let _ = env_logger::builder().is_test(true).try_init();

    let instance = dx12::Instance::<Soft>::init(&InstanceDescriptor {
        name: "d3d12-hal tests",
        flags: InstanceFlags::DEBUG | InstanceFlags::VALIDATION,
    })
    .expect("soft instance");
    let exposed = instance
        .enumerate_adapters()
        .into_iter()
        .next()
        .expect("the soft instance exposes an adapter");
    let open = exposed
        .adapter
        .open(&DeviceDescriptor {
            label: Some("test device"),
            heap_capacities,
            ..Default::default()
        })
        .expect("soft device");

    TestingContext {
        instance,
        adapter: exposed.adapter,
        info: exposed.info,
        capabilities: exposed.capabilities,
        device: open.device,
        queue: open.queue,
    }
}

impl TestingContext {
    pub fn buffer(&self, size: u64, usage: BufferUses) -> dx12::Buffer<Soft> {
        self.device
            .create_buffer(&BufferDescriptor {
                label: Some("test buffer"),
                size,
                usage,
                mapped_at_creation: false,
            })
            .expect("buffer creation")
    }

    pub fn texture_2d(
        &self,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUses,
    ) -> dx12::Texture<Soft> {
        self.device
            .create_texture(&TextureDescriptor {
                label: Some("test texture"),
                size: Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: TextureDimension::D2,
                format,
                usage,
            })
            .expect("texture creation")
    }

    /// Submits `command_buffers` and blocks until the queue reaches them.
    pub fn submit_and_wait(&self, command_buffers: &[&dx12::CommandBuffer<Soft>]) {
        let fence = self.device.create_fence().expect("fence creation");
        self.queue
            .submit(command_buffers, Some((&fence, 1)))
            .expect("submission");
        assert!(fence.wait(1, None).expect("fence wait"));
        self.device.destroy_fence(fence);
    }

    /// Copies the first `len` bytes out of a mappable buffer.
    pub fn read_buffer(&self, buffer: &dx12::Buffer<Soft>, len: usize) -> Vec<u8> {
        let mapping = self
            .device
            .map_buffer(buffer, 0..len as u64)
            .expect("buffer mapping");
        let bytes = unsafe { std::slice::from_raw_parts(mapping.ptr.as_ptr(), len) }.to_vec();
        self.device.unmap_buffer(buffer);
        bytes
    }
}

pub fn window_handle() -> RawWindowHandle {
    RawWindowHandle::Win32(Win32WindowHandle::new(
        NonZeroIsize::new(0x1000).expect("non-zero window handle"),
    ))
}
