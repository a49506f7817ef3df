use d3d12_hal::{
    dx12,
    native::{
        soft::{PipelineKind, Soft},
        DescriptorRange, DescriptorRangeType, Format, PrimitiveTopologyType, RootParameter,
        RootSignatureFlags, ShaderVisibility, DESCRIPTOR_RANGE_OFFSET_APPEND,
    },
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType, BufferBindingType,
    ColorTargetState, ColorWrites, ComputePipelineDescriptor, DeviceError, MultisampleState,
    PipelineError, PipelineLayoutDescriptor, PrimitiveState, ProgrammableStage,
    RenderPipelineDescriptor, SamplerBindingType, ShaderError, ShaderModuleDescriptor,
    ShaderSource, ShaderStages, TextureFormat, TextureSampleType, TextureViewDimension,
    VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode,
};

use crate::common::{initialize_test, TestingContext};

const FAKE_DXIL: &[u8] = &[0x44, 0x58, 0x42, 0x43];

fn bytecode_module(ctx: &TestingContext) -> dx12::ShaderModule {
    ctx.device
        .create_shader_module(&ShaderModuleDescriptor {
            label: Some("precompiled"),
            source: ShaderSource::Bytecode(&[
                ("vs_main", FAKE_DXIL),
                ("fs_main", FAKE_DXIL),
                ("cs_main", FAKE_DXIL),
            ]),
            entry_points: &[
                ("vs_main", ShaderStages::VERTEX),
                ("fs_main", ShaderStages::FRAGMENT),
                ("cs_main", ShaderStages::COMPUTE),
            ],
        })
        .unwrap()
}

fn entry(binding: u32, visibility: ShaderStages, ty: BindingType) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty,
    }
}

const UNIFORM: BindingType = BindingType::Buffer {
    ty: BufferBindingType::Uniform,
    min_binding_size: None,
};
const TEXTURE: BindingType = BindingType::Texture {
    sample_type: TextureSampleType::Float { filterable: true },
    view_dimension: TextureViewDimension::D2,
    multisampled: false,
};
const SAMPLER: BindingType = BindingType::Sampler(SamplerBindingType::Filtering);

fn table(ranges: &[(DescriptorRangeType, u32, u32)], visibility: ShaderVisibility) -> RootParameter {
    RootParameter::DescriptorTable {
        ranges: ranges
            .iter()
            .map(|&(ty, register, space)| DescriptorRange {
                ty,
                count: 1,
                base_shader_register: register,
                register_space: space,
                offset_in_table: DESCRIPTOR_RANGE_OFFSET_APPEND,
            })
            .collect(),
        visibility,
    }
}

#[test]
fn bytecode_modules_expose_their_entry_points() {
    let ctx = initialize_test();
    let module = bytecode_module(&ctx);
    let (stage, shader) = module.entry_point("fs_main").unwrap();
    assert_eq!(stage, ShaderStages::FRAGMENT);
    assert_eq!(shader.bytecode(), FAKE_DXIL);
    assert!(module.entry_point("missing").is_none());
    assert_eq!(ctx.device.counters().shader_modules.read(), 1);
}

#[test]
fn missing_bytecode_names_the_entry_point() {
    let ctx = initialize_test();
    let result = ctx.device.create_shader_module(&ShaderModuleDescriptor {
        label: None,
        source: ShaderSource::Bytecode(&[("vs_main", FAKE_DXIL)]),
        entry_points: &[
            ("vs_main", ShaderStages::VERTEX),
            ("fs_main", ShaderStages::FRAGMENT),
        ],
    });
    match result {
        Err(ShaderError::Compilation { entry_point, .. }) => assert_eq!(entry_point, "fs_main"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn hlsl_without_a_compiler_fails() {
    let ctx = initialize_test();
    let result = ctx.device.create_shader_module(&ShaderModuleDescriptor {
        label: None,
        source: ShaderSource::Hlsl("float4 vs_main() : SV_Position { return 0; }"),
        entry_points: &[("vs_main", ShaderStages::VERTEX)],
    });
    assert!(matches!(
        result,
        Err(ShaderError::Compilation { ref entry_point, .. }) if entry_point == "vs_main"
    ));
}

#[test]
fn root_signature_has_a_view_and_a_sampler_table_per_group() {
    let ctx = initialize_test();
    let material = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("material"),
            entries: &[
                entry(2, ShaderStages::FRAGMENT, SAMPLER),
                entry(0, ShaderStages::VERTEX | ShaderStages::FRAGMENT, UNIFORM),
                entry(1, ShaderStages::FRAGMENT, TEXTURE),
            ],
        })
        .unwrap();
    let samplers_only = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("samplers"),
            entries: &[entry(0, ShaderStages::FRAGMENT, SAMPLER)],
        })
        .unwrap();
    let uniforms_only = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("per draw"),
            entries: &[entry(0, ShaderStages::VERTEX, UNIFORM)],
        })
        .unwrap();

    let layout = ctx
        .device
        .create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("forward"),
            bind_group_layouts: &[&material, &samplers_only, &uniforms_only],
        })
        .unwrap();

    let desc = layout.raw().desc();
    assert_eq!(
        desc.flags,
        RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT
    );
    assert_eq!(
        desc.parameters,
        vec![
            table(
                &[(DescriptorRangeType::Cbv, 0, 0), (DescriptorRangeType::Srv, 1, 0)],
                ShaderVisibility::All
            ),
            table(&[(DescriptorRangeType::Sampler, 2, 0)], ShaderVisibility::Pixel),
            table(&[(DescriptorRangeType::Sampler, 0, 1)], ShaderVisibility::Pixel),
            table(&[(DescriptorRangeType::Cbv, 0, 2)], ShaderVisibility::Vertex),
        ]
    );
    assert_eq!(layout.total_root_elements(), 4);

    let infos = layout.bind_group_infos();
    assert_eq!(infos.len(), 3);
    assert_eq!(
        (infos[0].view_root_index, infos[0].sampler_root_index),
        (Some(0), Some(1))
    );
    assert_eq!(
        (infos[1].view_root_index, infos[1].sampler_root_index),
        (None, Some(2))
    );
    assert_eq!(
        (infos[2].view_root_index, infos[2].sampler_root_index),
        (Some(3), None)
    );
}

#[test]
fn bind_group_layouts_are_validated() {
    let ctx = initialize_test();
    let duplicate = ctx.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: None,
        entries: &[
            entry(0, ShaderStages::VERTEX, UNIFORM),
            entry(0, ShaderStages::FRAGMENT, TEXTURE),
        ],
    });
    assert!(matches!(duplicate, Err(DeviceError::InvalidArgument(_))));

    let invisible = ctx.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: None,
        entries: &[entry(0, ShaderStages::empty(), UNIFORM)],
    });
    assert!(matches!(invisible, Err(DeviceError::InvalidArgument(_))));
}

#[test]
fn too_many_bind_groups_are_rejected() {
    let ctx = initialize_test();
    let group = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &[entry(0, ShaderStages::COMPUTE, UNIFORM)],
        })
        .unwrap();
    let groups = [&group; d3d12_hal::MAX_BIND_GROUPS + 1];
    let result = ctx.device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: None,
        bind_group_layouts: &groups,
    });
    assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
}

#[test]
fn render_pipeline_state_matches_the_descriptor() {
    let ctx = initialize_test();
    let module = bytecode_module(&ctx);
    let pipeline = ctx
        .device
        .create_render_pipeline(&RenderPipelineDescriptor::<Soft> {
            label: Some("triangle"),
            layout: None,
            vertex_buffers: &[VertexBufferLayout {
                array_stride: 20,
                step_mode: VertexStepMode::Vertex,
                attributes: &[
                    VertexAttribute {
                        format: VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    },
                    VertexAttribute {
                        format: VertexFormat::Float32x2,
                        offset: 12,
                        shader_location: 1,
                    },
                ],
            }],
            vertex_stage: ProgrammableStage {
                module: &module,
                entry_point: "vs_main",
            },
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            multisample: MultisampleState::default(),
            fragment_stage: Some(ProgrammableStage {
                module: &module,
                entry_point: "fs_main",
            }),
            color_targets: &[Some(ColorTargetState {
                format: TextureFormat::Bgra8UnormSrgb,
                blend: None,
                write_mask: ColorWrites::ALL,
            })],
        })
        .unwrap();

    let raw = pipeline.raw();
    assert_eq!(raw.name(), Some("triangle"));
    assert!(raw.root_signature().parameters.is_empty());
    match *raw.kind() {
        PipelineKind::Graphics {
            ref input_layout,
            topology_type,
            ref rtv_formats,
            dsv_format,
        } => {
            assert_eq!(input_layout.len(), 2);
            assert_eq!(input_layout[1].aligned_byte_offset, 12);
            assert_eq!(input_layout[1].semantic_index, 1);
            assert_eq!(input_layout[1].format, Format::R32G32_FLOAT);
            assert_eq!(topology_type, PrimitiveTopologyType::Triangle);
            assert_eq!(*rtv_formats, vec![Format::B8G8R8A8_UNORM_SRGB]);
            assert_eq!(dsv_format, Format::UNKNOWN);
        }
        PipelineKind::Compute => panic!("expected a graphics pipeline"),
    }
    assert_eq!(ctx.device.counters().render_pipelines.read(), 1);
}

#[test]
fn pipelines_check_their_entry_points() {
    let ctx = initialize_test();
    let module = bytecode_module(&ctx);

    let missing = ctx.device.create_compute_pipeline(&ComputePipelineDescriptor::<Soft> {
        label: None,
        layout: None,
        stage: ProgrammableStage {
            module: &module,
            entry_point: "main",
        },
    });
    assert!(matches!(missing, Err(PipelineError::EntryPoint(ref name)) if name == "main"));

    let wrong_stage = ctx.device.create_compute_pipeline(&ComputePipelineDescriptor::<Soft> {
        label: None,
        layout: None,
        stage: ProgrammableStage {
            module: &module,
            entry_point: "vs_main",
        },
    });
    assert!(matches!(
        wrong_stage,
        Err(PipelineError::Linkage(stage, _)) if stage == ShaderStages::COMPUTE
    ));
}

#[test]
fn compute_pipelines_share_the_layout_signature() {
    let ctx = initialize_test();
    let module = bytecode_module(&ctx);
    let group = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &[entry(
                0,
                ShaderStages::COMPUTE,
                BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: false },
                    min_binding_size: None,
                },
            )],
        })
        .unwrap();
    let layout = ctx
        .device
        .create_pipeline_layout(&PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &[&group],
        })
        .unwrap();
    let pipeline = ctx
        .device
        .create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("simulate"),
            layout: Some(&layout),
            stage: ProgrammableStage {
                module: &module,
                entry_point: "cs_main",
            },
        })
        .unwrap();

    assert_eq!(*pipeline.raw().kind(), PipelineKind::Compute);
    assert_eq!(pipeline.raw().root_signature(), layout.raw().desc());
    assert_eq!(
        pipeline.raw().root_signature().parameters,
        vec![table(
            &[(DescriptorRangeType::Uav, 0, 0)],
            ShaderVisibility::All
        )]
    );
}
