use std::{
    num::NonZeroU64,
    sync::{atomic::AtomicBool, Arc},
};

use parking_lot::Mutex;

use super::DescriptorHeap;
use crate::native::{
    DescriptorHeapType, Native, NativeResultExt as _, RawAdapter as _, RawDevice as _,
    RawInstance as _,
};

/// Storage bindings are addressed with signed 32-bit offsets.
const MAX_I32_BINDING_SIZE: u32 = (1 << 31) - 1;

fn limits() -> crate::Limits {
    crate::Limits {
        max_texture_dimension_1d: 16384,
        max_texture_dimension_2d: 16384,
        max_texture_dimension_3d: 2048,
        max_texture_array_layers: 2048,
        max_bind_groups: crate::MAX_BIND_GROUPS as u32,
        max_vertex_buffers: crate::MAX_VERTEX_BUFFERS as u32,
        max_vertex_attributes: 32,
        max_color_attachments: crate::MAX_COLOR_ATTACHMENTS as u32,
        // 4096 constants of 16 bytes.
        max_uniform_buffer_binding_size: 4096 * 16,
        max_storage_buffer_binding_size: MAX_I32_BINDING_SIZE,
        max_compute_workgroups_per_dimension: 65535,
    }
}

const fn alignment(value: u64) -> NonZeroU64 {
    match NonZeroU64::new(value) {
        Some(value) => value,
        None => panic!("alignments are never zero"),
    }
}

fn alignments() -> crate::Alignments {
    crate::Alignments {
        buffer_copy_offset: alignment(crate::native::TEXTURE_DATA_PLACEMENT_ALIGNMENT),
        buffer_copy_pitch: alignment(crate::native::TEXTURE_DATA_PITCH_ALIGNMENT as u64),
        uniform_buffer_offset: alignment(256),
    }
}

impl<N: Native> super::Adapter<N> {
    pub(super) fn expose(
        raw: N::Adapter,
        instance: &Arc<N::Instance>,
        flags: crate::InstanceFlags,
    ) -> crate::ExposedAdapter<N> {
        let info = raw.info();
        log::debug!("Exposing adapter {:?} ({:?})", info.name, info.device_type);
        let capabilities = crate::Capabilities {
            limits: limits(),
            alignments: alignments(),
            tearing: instance.supports_allow_tearing(),
        };
        crate::ExposedAdapter {
            adapter: Self {
                raw,
                _instance: Arc::clone(instance),
                flags,
            },
            info,
            capabilities,
        }
    }

    pub fn raw(&self) -> &N::Adapter {
        &self.raw
    }

    /// Creates the device with its direct queue, idle fence and descriptor heaps.
    pub fn open(
        &self,
        desc: &crate::DeviceDescriptor,
    ) -> Result<crate::OpenDevice<N>, crate::DeviceError> {
        let raw = {
            profiling::scope!("D3D12CreateDevice");
            self.raw.create_device()
        }
        .into_device_result("Device creation")?;

        let queue = {
            profiling::scope!("ID3D12Device::CreateCommandQueue");
            raw.create_command_queue()
        }
        .into_device_result("Queue creation")?;

        let idle_fence = raw.create_fence(0).into_device_result("Idle fence creation")?;
        let idle_event = raw.create_event().into_device_result("Idle event creation")?;
        let transfer_allocator = raw
            .create_command_allocator()
            .into_device_result("Transfer allocator creation")?;

        let capacities = desc.heap_capacities;
        let heap = |kind, capacity, shader_visible| {
            DescriptorHeap::<N>::new(&raw, kind, capacity, shader_visible).map(Arc::new)
        };
        let heap_views = heap(DescriptorHeapType::CbvSrvUav, capacities.views, true)?;
        let heap_samplers = heap(DescriptorHeapType::Sampler, capacities.samplers, true)?;
        let rtv_heap = heap(DescriptorHeapType::Rtv, capacities.render_targets, false)?;
        let dsv_heap = heap(DescriptorHeapType::Dsv, capacities.depth_stencils, false)?;
        let view_staging = heap(DescriptorHeapType::CbvSrvUav, capacities.view_staging, false)?;
        let sampler_staging =
            heap(DescriptorHeapType::Sampler, capacities.sampler_staging, false)?;

        let shared = Arc::new(super::DeviceShared {
            raw,
            present_queue: queue.clone(),
            idler: super::Idler {
                fence: idle_fence,
                state: Mutex::new((idle_event, 0)),
            },
            heap_views,
            heap_samplers,
            rtv_heap,
            dsv_heap,
            view_staging,
            sampler_staging,
            lost: AtomicBool::new(false),
        });

        log::info!(
            "Opened device {:?} with heaps {capacities:?}",
            desc.label.unwrap_or("")
        );

        let device = super::Device::new(
            Arc::clone(&shared),
            self.flags,
            desc.shader_compiler.clone(),
        );
        Ok(crate::OpenDevice {
            device,
            queue: super::Queue {
                raw: queue,
                shared,
                transfer: Mutex::new(super::Transfer {
                    allocator: transfer_allocator,
                    list: None,
                }),
            },
        })
    }
}
