use std::num::NonZeroU64;

use d3d12_hal::{
    dx12::{BindGroupLayout, Buffer},
    native::{
        soft::{Soft, SoftDescriptor}, DescriptorHeapType, GpuDescriptor, RawDevice as _, SrvDimension,
        UavDimension,
    },
    BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BindingType, BufferBinding, BufferBindingType, BufferUses, DeviceError, HeapCapacities,
    SamplerBindingType,
    SamplerDescriptor, ShaderStages, TextureBinding, TextureFormat, TextureSampleType,
    TextureUses, TextureViewDescriptor, TextureViewDimension,
};

use crate::common::{initialize_test, initialize_test_with, TEST_HEAPS};

fn layout_entries() -> [BindGroupLayoutEntry; 4] {
    [
        BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStages::VERTEX,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                min_binding_size: None,
            },
        },
        BindGroupLayoutEntry {
            binding: 1,
            visibility: ShaderStages::FRAGMENT,
            ty: BindingType::Texture {
                sample_type: TextureSampleType::Float { filterable: true },
                view_dimension: TextureViewDimension::D2,
                multisampled: false,
            },
        },
        BindGroupLayoutEntry {
            binding: 2,
            visibility: ShaderStages::FRAGMENT,
            ty: BindingType::Sampler(SamplerBindingType::Filtering),
        },
        BindGroupLayoutEntry {
            binding: 3,
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only: false },
                min_binding_size: NonZeroU64::new(16),
            },
        },
    ]
}

const ENTRIES: &[BindGroupEntry] = &[
    BindGroupEntry {
        binding: 0,
        resource_index: 0,
    },
    BindGroupEntry {
        binding: 1,
        resource_index: 0,
    },
    BindGroupEntry {
        binding: 2,
        resource_index: 0,
    },
    BindGroupEntry {
        binding: 3,
        resource_index: 1,
    },
];

#[test]
fn descriptors_land_in_the_shader_visible_heaps() {
    let ctx = initialize_test();
    let layout = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("mixed"),
            entries: &layout_entries(),
        })
        .unwrap();
    assert_eq!((layout.view_count(), layout.sampler_count()), (3, 1));

    let uniform = ctx.buffer(256, BufferUses::UNIFORM);
    let storage = ctx.buffer(64, BufferUses::STORAGE_READ_WRITE);
    let texture = ctx.texture_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUses::RESOURCE);
    let view = ctx
        .device
        .create_texture_view(
            &texture,
            &TextureViewDescriptor {
                label: None,
                format: TextureFormat::Rgba8Unorm,
                dimension: TextureViewDimension::D2,
                usage: TextureUses::RESOURCE,
                range: Default::default(),
            },
        )
        .unwrap();
    let sampler = ctx
        .device
        .create_sampler(&SamplerDescriptor::default())
        .unwrap();

    let group = ctx
        .device
        .create_bind_group(&BindGroupDescriptor {
            label: Some("mixed"),
            layout: &layout,
            buffers: &[
                BufferBinding {
                    buffer: &uniform,
                    offset: 0,
                    size: None,
                },
                BufferBinding {
                    buffer: &storage,
                    offset: 16,
                    size: NonZeroU64::new(32),
                },
            ],
            samplers: &[&sampler],
            textures: &[TextureBinding {
                view: &view,
                usage: TextureUses::RESOURCE,
            }],
            entries: ENTRIES,
        })
        .unwrap();

    let views = group.views().expect("view table");
    assert_eq!(views.count, 3);
    let samplers = group.samplers().expect("sampler table");
    assert_eq!(samplers.count, 1);

    let soft = ctx.device.raw();
    let stride = soft.descriptor_increment_size(DescriptorHeapType::CbvSrvUav) as u64;
    let base = views.gpu.expect("shader visible");
    let at = |index: u64| {
        soft.descriptor_at_gpu(GpuDescriptor {
            ptr: base.ptr + index * stride,
        })
    };

    match at(0) {
        Some(SoftDescriptor::ConstantBuffer(desc)) => {
            assert_eq!(desc.buffer_location, uniform.gpu_address());
            assert_eq!(desc.size_in_bytes, 256);
        }
        other => panic!("expected a constant buffer view, found {other:?}"),
    }
    match at(1) {
        Some(SoftDescriptor::ShaderResource { resource, desc }) => {
            assert_eq!(resource.id(), texture.raw().id());
            assert!(matches!(desc.dimension, SrvDimension::Texture2D { .. }));
        }
        other => panic!("expected a shader resource view, found {other:?}"),
    }
    match at(2) {
        Some(SoftDescriptor::UnorderedAccess { resource, desc }) => {
            assert_eq!(resource.id(), storage.raw().id());
            assert_eq!(
                desc.dimension,
                UavDimension::RawBuffer {
                    first_element: 4,
                    num_elements: 8,
                }
            );
        }
        other => panic!("expected an unordered access view, found {other:?}"),
    }
    assert!(matches!(
        soft.descriptor_at_gpu(samplers.gpu.expect("shader visible")),
        Some(SoftDescriptor::Sampler(_))
    ));

    assert_eq!(ctx.device.counters().bind_groups.read(), 1);
    ctx.device.destroy_bind_group(group);
    assert_eq!(ctx.device.counters().bind_groups.read(), 0);
}

#[test]
fn bind_groups_must_cover_the_layout() {
    let ctx = initialize_test();
    let layout = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &layout_entries()[..1],
        })
        .unwrap();
    let uniform = ctx.buffer(256, BufferUses::UNIFORM);
    let buffers = [BufferBinding {
        buffer: &uniform,
        offset: 0,
        size: None,
    }];

    let missing = ctx.device.create_bind_group(&BindGroupDescriptor {
        label: None,
        layout: &layout,
        buffers: &buffers,
        samplers: &[],
        textures: &[],
        entries: &[BindGroupEntry {
            binding: 7,
            resource_index: 0,
        }],
    });
    assert!(matches!(missing, Err(DeviceError::InvalidArgument(_))));

    let out_of_range = ctx.device.create_bind_group(&BindGroupDescriptor {
        label: None,
        layout: &layout,
        buffers: &buffers,
        samplers: &[],
        textures: &[],
        entries: &[BindGroupEntry {
            binding: 0,
            resource_index: 3,
        }],
    });
    assert!(matches!(out_of_range, Err(DeviceError::InvalidArgument(_))));
}

#[test]
fn buffer_bindings_are_validated() {
    let ctx = initialize_test();
    let entries = layout_entries();
    let uniform_layout = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &entries[..1],
        })
        .unwrap();
    let storage_layout = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &entries[3..],
        })
        .unwrap();
    let uniform = ctx.buffer(512, BufferUses::UNIFORM);
    let storage = ctx.buffer(64, BufferUses::STORAGE_READ_WRITE);

    let bind = |layout: &BindGroupLayout,
                buffer: &Buffer<Soft>,
                offset: u64,
                size: u64,
                binding: u32| {
        ctx.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout,
            buffers: &[BufferBinding {
                buffer,
                offset,
                size: NonZeroU64::new(size),
            }],
            samplers: &[],
            textures: &[],
            entries: &[BindGroupEntry {
                binding,
                resource_index: 0,
            }],
        })
    };

    // Uniform offsets must be 256-byte aligned.
    assert!(matches!(
        bind(&uniform_layout, &uniform, 128, 64, 0),
        Err(DeviceError::InvalidArgument(_))
    ));
    assert!(bind(&uniform_layout, &uniform, 256, 64, 0).is_ok());
    // A storage buffer cannot back a uniform binding.
    assert!(matches!(
        bind(&uniform_layout, &storage, 0, 64, 0),
        Err(DeviceError::InvalidArgument(_))
    ));
    // Smaller than `min_binding_size`.
    assert!(matches!(
        bind(&storage_layout, &storage, 0, 8, 3),
        Err(DeviceError::InvalidArgument(_))
    ));
    // Past the end of the buffer.
    assert!(matches!(
        bind(&storage_layout, &storage, 48, 32, 3),
        Err(DeviceError::InvalidArgument(_))
    ));
    assert!(bind(&storage_layout, &storage, 48, 16, 3).is_ok());
}

#[test]
fn textures_need_a_matching_view() {
    let ctx = initialize_test();
    let entries = layout_entries();
    let layout = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &entries[1..2],
        })
        .unwrap();
    let texture = ctx.texture_2d(
        4,
        4,
        TextureFormat::Rgba8Unorm,
        TextureUses::COLOR_TARGET | TextureUses::RESOURCE,
    );
    let target_only = ctx
        .device
        .create_texture_view(
            &texture,
            &TextureViewDescriptor {
                label: None,
                format: TextureFormat::Rgba8Unorm,
                dimension: TextureViewDimension::D2,
                usage: TextureUses::COLOR_TARGET,
                range: Default::default(),
            },
        )
        .unwrap();

    let result = ctx.device.create_bind_group(&BindGroupDescriptor {
        label: None,
        layout: &layout,
        buffers: &[],
        samplers: &[],
        textures: &[TextureBinding {
            view: &target_only,
            usage: TextureUses::RESOURCE,
        }],
        entries: &[BindGroupEntry {
            binding: 1,
            resource_index: 0,
        }],
    });
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
}

#[test]
fn rejected_bind_groups_take_no_descriptors() {
    let ctx = initialize_test();
    let layout = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &layout_entries()[..1],
        })
        .unwrap();
    let copy_only = ctx.buffer(256, BufferUses::COPY_DST);
    let uniform = ctx.buffer(256, BufferUses::UNIFORM);
    let before = ctx.device.heap_report().views;

    // More attempts than the view heap has room for.
    for _ in 0..TEST_HEAPS.views + 44 {
        let result = ctx.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &layout,
            buffers: &[BufferBinding {
                buffer: &copy_only,
                offset: 0,
                size: None,
            }],
            samplers: &[],
            textures: &[],
            entries: &ENTRIES[..1],
        });
        assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
    }
    assert_eq!(ctx.device.heap_report().views, before);
    assert_eq!(ctx.device.counters().bind_groups.read(), 0);

    let group = ctx
        .device
        .create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &layout,
            buffers: &[BufferBinding {
                buffer: &uniform,
                offset: 0,
                size: None,
            }],
            samplers: &[],
            textures: &[],
            entries: &ENTRIES[..1],
        })
        .unwrap();
    assert_eq!(group.views().map(|range| range.index), Some(before.next_free));
}

#[test]
fn sampler_exhaustion_returns_the_view_range() {
    let ctx = initialize_test_with(HeapCapacities {
        samplers: 1,
        ..TEST_HEAPS
    });
    let layout = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &layout_entries()[..3],
        })
        .unwrap();
    let uniform = ctx.buffer(256, BufferUses::UNIFORM);
    let texture = ctx.texture_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUses::RESOURCE);
    let view = ctx
        .device
        .create_texture_view(
            &texture,
            &TextureViewDescriptor {
                label: None,
                format: TextureFormat::Rgba8Unorm,
                dimension: TextureViewDimension::D2,
                usage: TextureUses::RESOURCE,
                range: Default::default(),
            },
        )
        .unwrap();
    let sampler = ctx
        .device
        .create_sampler(&SamplerDescriptor::default())
        .unwrap();
    let create = || {
        ctx.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &layout,
            buffers: &[BufferBinding {
                buffer: &uniform,
                offset: 0,
                size: None,
            }],
            samplers: &[&sampler],
            textures: &[TextureBinding {
                view: &view,
                usage: TextureUses::RESOURCE,
            }],
            entries: &ENTRIES[..3],
        })
    };

    let _first = create().unwrap();
    let views_after_first = ctx.device.heap_report().views;
    assert_eq!(views_after_first.next_free, 2);

    assert_eq!(
        create().err(),
        Some(DeviceError::HeapExhausted {
            kind: DescriptorHeapType::Sampler,
            requested: 1,
            available: 0,
        })
    );
    assert_eq!(ctx.device.heap_report().views, views_after_first);
}
