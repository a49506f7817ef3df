use d3d12_hal::{
    dx12,
    native::{
        soft::{Command, Soft},
        Rect as NativeRect, Viewport,
    },
    AttachmentOps, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, BufferBinding, BufferTextureCopy,
    BufferUses, Color, ColorAttachment, ColorTargetState, ColorWrites, CopyExtent,
    DepthStencilAttachment, DeviceError, FormatAspects, ImageDataLayout, IndexFormat,
    MultisampleState,
    Origin3d, PipelineLayoutDescriptor, PrimitiveState, ProgrammableStage, Rect,
    RenderPassDescriptor, RenderPipelineDescriptor, ShaderModuleDescriptor, ShaderSource,
    ShaderStages, TextureBarrier, TextureCopyBase, TextureFormat, TextureUses,
    TextureViewDescriptor, TextureViewDimension,
};

use crate::common::{initialize_test, TestingContext};

const FAKE_DXIL: &[u8] = &[0x44, 0x58, 0x42, 0x43];

const RED: Color = Color {
    r: 1.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};

fn view(
    ctx: &TestingContext,
    texture: &dx12::Texture<Soft>,
    format: TextureFormat,
    usage: TextureUses,
) -> dx12::TextureView<Soft> {
    ctx.device
        .create_texture_view(
            texture,
            &TextureViewDescriptor {
                label: None,
                format,
                dimension: TextureViewDimension::D2,
                usage,
                range: Default::default(),
            },
        )
        .unwrap()
}

fn barrier<'a>(
    texture: &'a dx12::Texture<Soft>,
    usage: std::ops::Range<TextureUses>,
) -> TextureBarrier<'a, Soft> {
    TextureBarrier {
        texture,
        range: Default::default(),
        usage,
    }
}

/// Copies the top-left texel of a 4x4 texture into a readback buffer.
fn read_first_texel(
    ctx: &TestingContext,
    encoder: &mut dx12::CommandEncoder<Soft>,
    texture: &dx12::Texture<Soft>,
    aspect: FormatAspects,
) -> dx12::Buffer<Soft> {
    let readback = ctx.buffer(1024, BufferUses::MAP_READ | BufferUses::COPY_DST);
    encoder
        .copy_texture_to_buffer(
            texture,
            &readback,
            [BufferTextureCopy {
                buffer_layout: ImageDataLayout::default(),
                texture_base: TextureCopyBase {
                    mip_level: 0,
                    array_layer: 0,
                    origin: Origin3d::ZERO,
                    aspect,
                },
                size: CopyExtent {
                    width: 4,
                    height: 4,
                    depth: 1,
                },
            }],
        )
        .unwrap();
    readback
}

#[test]
fn cleared_color_reaches_a_readback_buffer() {
    let ctx = initialize_test();
    let texture = ctx.texture_2d(
        4,
        4,
        TextureFormat::Rgba8Unorm,
        TextureUses::COLOR_TARGET | TextureUses::COPY_SRC,
    );
    let target = view(&ctx, &texture, TextureFormat::Rgba8Unorm, TextureUses::COLOR_TARGET);

    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(Some("clear")).unwrap();
    encoder
        .transition_textures([barrier(
            &texture,
            TextureUses::UNINITIALIZED..TextureUses::COLOR_TARGET,
        )])
        .unwrap();
    drop(
        encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(ColorAttachment {
                    target: &target,
                    ops: AttachmentOps::STORE,
                    clear_value: RED,
                })],
                depth_stencil_attachment: None,
            })
            .unwrap(),
    );
    encoder
        .transition_textures([barrier(
            &texture,
            TextureUses::COLOR_TARGET..TextureUses::COPY_SRC,
        )])
        .unwrap();
    let readback = read_first_texel(&ctx, &mut encoder, &texture, FormatAspects::COLOR);
    let cmd_buf = encoder.end_encoding().unwrap();
    ctx.submit_and_wait(&[&cmd_buf]);

    let bytes = ctx.read_buffer(&readback, 1024);
    // Rows are 256 bytes apart in the buffer.
    assert_eq!(bytes[..4], [255, 0, 0, 255]);
    assert_eq!(bytes[256 * 3 + 12..256 * 3 + 16], [255, 0, 0, 255]);

    let stats = ctx.device.raw().stats();
    assert_eq!(stats.clears, 1);
    assert_eq!(stats.copies, 1);
    assert_eq!(stats.barrier_mismatches, 0);
}

#[test]
fn cleared_depth_reaches_a_readback_buffer() {
    let ctx = initialize_test();
    let texture = ctx.texture_2d(
        4,
        4,
        TextureFormat::Depth32Float,
        TextureUses::DEPTH_STENCIL_WRITE | TextureUses::COPY_SRC,
    );
    let target = view(
        &ctx,
        &texture,
        TextureFormat::Depth32Float,
        TextureUses::DEPTH_STENCIL_WRITE,
    );

    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();
    encoder
        .transition_textures([barrier(
            &texture,
            TextureUses::UNINITIALIZED..TextureUses::DEPTH_STENCIL_WRITE,
        )])
        .unwrap();
    drop(
        encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: Some("depth only"),
                color_attachments: &[],
                depth_stencil_attachment: Some(DepthStencilAttachment {
                    target: &target,
                    depth_ops: AttachmentOps::STORE,
                    stencil_ops: AttachmentOps::STORE,
                    clear_value: (0.5, 0),
                }),
            })
            .unwrap(),
    );
    encoder
        .transition_textures([barrier(
            &texture,
            TextureUses::DEPTH_STENCIL_WRITE..TextureUses::COPY_SRC,
        )])
        .unwrap();
    let readback = read_first_texel(&ctx, &mut encoder, &texture, FormatAspects::DEPTH);
    let cmd_buf = encoder.end_encoding().unwrap();
    ctx.submit_and_wait(&[&cmd_buf]);

    let bytes = ctx.read_buffer(&readback, 4);
    assert_eq!(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 0.5);
    assert_eq!(ctx.device.raw().stats().barrier_mismatches, 0);
}

#[test]
fn attachments_are_validated() {
    let ctx = initialize_test();
    let texture = ctx.texture_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUses::COLOR_TARGET);
    let target = view(&ctx, &texture, TextureFormat::Rgba8Unorm, TextureUses::COLOR_TARGET);
    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();

    let sparse = encoder.begin_render_pass(&RenderPassDescriptor {
        label: None,
        color_attachments: &[
            None,
            Some(ColorAttachment {
                target: &target,
                ops: AttachmentOps::LOAD | AttachmentOps::STORE,
                clear_value: Color::BLACK,
            }),
        ],
        depth_stencil_attachment: None,
    });
    assert!(matches!(sparse, Err(DeviceError::InvalidArgument(_))));
    drop(sparse);

    let empty = encoder.begin_render_pass(&RenderPassDescriptor {
        label: None,
        color_attachments: &[None],
        depth_stencil_attachment: None,
    });
    assert!(matches!(empty, Err(DeviceError::InvalidArgument(_))));
    drop(empty);

    let cmd_buf = encoder.end_encoding().unwrap();
    assert!(cmd_buf.raw().commands().is_empty());
}

#[test]
fn passes_start_with_a_full_viewport() {
    let ctx = initialize_test();
    let texture = ctx.texture_2d(8, 6, TextureFormat::Rgba8Unorm, TextureUses::COLOR_TARGET);
    let target = view(&ctx, &texture, TextureFormat::Rgba8Unorm, TextureUses::COLOR_TARGET);
    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();
    {
        let mut pass = encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(ColorAttachment {
                    target: &target,
                    ops: AttachmentOps::LOAD | AttachmentOps::STORE,
                    clear_value: Color::TRANSPARENT,
                })],
                depth_stencil_attachment: None,
            })
            .unwrap();
        pass.set_scissor_rect(&Rect {
            x: 1,
            y: 2,
            w: 3,
            h: 4,
        })
        .unwrap();
        pass.set_stencil_reference(7);
    }
    let cmd_buf = encoder.end_encoding().unwrap();

    let commands = cmd_buf.raw().commands();
    // Loaded attachments are not cleared.
    assert!(!commands
        .iter()
        .any(|command| matches!(command, Command::ClearRenderTarget { .. })));
    assert!(commands.contains(&Command::SetViewports(vec![Viewport {
        top_left_x: 0.0,
        top_left_y: 0.0,
        width: 8.0,
        height: 6.0,
        min_depth: 0.0,
        max_depth: 1.0,
    }])));
    assert!(commands.contains(&Command::SetScissorRects(vec![NativeRect {
        left: 0,
        top: 0,
        right: 8,
        bottom: 6,
    }])));
    assert!(commands.contains(&Command::SetScissorRects(vec![NativeRect {
        left: 1,
        top: 2,
        right: 4,
        bottom: 6,
    }])));
    assert_eq!(commands.last(), Some(&Command::SetStencilRef(7)));
}

#[test]
fn draws_apply_bind_groups_for_the_current_signature() {
    let ctx = initialize_test();
    let module = ctx
        .device
        .create_shader_module(&ShaderModuleDescriptor {
            label: None,
            source: ShaderSource::Bytecode(&[
                ("vs_main", FAKE_DXIL),
                ("fs_main", FAKE_DXIL),
            ]),
            entry_points: &[
                ("vs_main", ShaderStages::VERTEX),
                ("fs_main", ShaderStages::FRAGMENT),
            ],
        })
        .unwrap();
    let group_layout = ctx
        .device
        .create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("globals"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: d3d12_hal::BufferBindingType::Uniform,
                    min_binding_size: None,
                },
            }],
        })
        .unwrap();
    let layout_a = ctx
        .device
        .create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("a"),
            bind_group_layouts: &[&group_layout],
        })
        .unwrap();
    let layout_b = ctx
        .device
        .create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("b"),
            bind_group_layouts: &[&group_layout],
        })
        .unwrap();

    let pipeline = |layout: &dx12::PipelineLayout<Soft>| {
        ctx.device
            .create_render_pipeline(&RenderPipelineDescriptor::<Soft> {
                label: None,
                layout: Some(layout),
                vertex_buffers: &[],
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
                    format: TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: ColorWrites::ALL,
                })],
            })
            .unwrap()
    };
    let pipeline_a = pipeline(&layout_a);
    let pipeline_b = pipeline(&layout_b);

    let uniform = ctx.buffer(256, BufferUses::UNIFORM);
    let group = ctx
        .device
        .create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &group_layout,
            buffers: &[BufferBinding {
                buffer: &uniform,
                offset: 0,
                size: None,
            }],
            samplers: &[],
            textures: &[],
            entries: &[BindGroupEntry {
                binding: 0,
                resource_index: 0,
            }],
        })
        .unwrap();
    let table_base = group.views().and_then(|range| range.gpu).unwrap();

    let texture = ctx.texture_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUses::COLOR_TARGET);
    let target = view(&ctx, &texture, TextureFormat::Rgba8Unorm, TextureUses::COLOR_TARGET);
    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();
    encoder
        .transition_textures([barrier(
            &texture,
            TextureUses::UNINITIALIZED..TextureUses::COLOR_TARGET,
        )])
        .unwrap();
    {
        let mut pass = encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: Some("draws"),
                color_attachments: &[Some(ColorAttachment {
                    target: &target,
                    ops: AttachmentOps::STORE,
                    clear_value: Color::BLACK,
                })],
                depth_stencil_attachment: None,
            })
            .unwrap();
        pass.set_bind_group(&layout_a, 0, &group).unwrap();
        assert!(matches!(
            pass.set_bind_group(&layout_a, 1, &group),
            Err(DeviceError::InvalidArgument(_))
        ));
        pass.set_pipeline(&pipeline_a).unwrap();
        pass.draw(0, 3, 0, 1);
        // A different signature re-applies the bound tables.
        pass.set_pipeline(&pipeline_b).unwrap();
        pass.draw(0, 3, 0, 1);
    }
    let cmd_buf = encoder.end_encoding().unwrap();

    let commands = cmd_buf.raw().commands();
    let count = |pred: fn(&Command) -> bool| commands.iter().filter(|c| pred(c)).count();
    assert_eq!(
        count(|c| matches!(c, Command::SetRootSignature { compute: false, parameters: 1 })),
        2
    );
    assert_eq!(count(|c| matches!(c, Command::SetDescriptorHeaps(_))), 1);
    let tables: Vec<_> = commands
        .iter()
        .filter_map(|command| match *command {
            Command::SetRootDescriptorTable {
                compute: false,
                index,
                base,
            } => Some((index, base)),
            _ => None,
        })
        .collect();
    assert_eq!(tables, vec![(0, table_base), (0, table_base)]);
    assert_eq!(
        count(|c| matches!(c, Command::Draw { vertex_count: 3, instance_count: 1, .. })),
        2
    );

    ctx.submit_and_wait(&[&cmd_buf]);
    let stats = ctx.device.raw().stats();
    assert_eq!(stats.draws, 2);
    assert_eq!(stats.clears, 1);
}

#[test]
fn pass_state_rejects_out_of_range_input() {
    let ctx = initialize_test();
    let texture = ctx.texture_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUses::COLOR_TARGET);
    let target = view(&ctx, &texture, TextureFormat::Rgba8Unorm, TextureUses::COLOR_TARGET);
    let geometry = ctx.buffer(256, BufferUses::VERTEX | BufferUses::INDEX);
    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();
    {
        let mut pass = encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(ColorAttachment {
                    target: &target,
                    ops: AttachmentOps::LOAD | AttachmentOps::STORE,
                    clear_value: Color::TRANSPARENT,
                })],
                depth_stencil_attachment: None,
            })
            .unwrap();

        let past_the_end = || BufferBinding {
            buffer: &geometry,
            offset: 224,
            size: std::num::NonZeroU64::new(64),
        };
        assert!(matches!(
            pass.set_index_buffer(past_the_end(), IndexFormat::Uint16),
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(matches!(
            pass.set_vertex_buffer(0, past_the_end()),
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(matches!(
            pass.set_scissor_rect(&Rect {
                x: u32::MAX - 1,
                y: 0,
                w: 4,
                h: 4,
            }),
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(matches!(
            pass.set_scissor_rect(&Rect {
                x: 0,
                y: i32::MAX as u32,
                w: 0,
                h: 1,
            }),
            Err(DeviceError::InvalidArgument(_))
        ));

        pass.set_index_buffer(
            BufferBinding {
                buffer: &geometry,
                offset: 128,
                size: None,
            },
            IndexFormat::Uint32,
        )
        .unwrap();
    }
    let cmd_buf = encoder.end_encoding().unwrap();

    let commands = cmd_buf.raw().commands();
    let index_views = commands
        .iter()
        .filter_map(|command| match *command {
            Command::SetIndexBuffer(view) => Some(view.size_in_bytes),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(index_views, vec![128]);
    // Only the pass's default scissor was recorded.
    assert_eq!(
        commands
            .iter()
            .filter(|command| matches!(command, Command::SetScissorRects(_)))
            .count(),
        1
    );
}
