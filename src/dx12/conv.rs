use arrayvec::ArrayVec;

use crate::native::{
    Blend, BlendOp, ComparisonFunc, CullMode, DepthStencilDesc, DescriptorRangeType, FilterType,
    Format, HeapType, InputClassification, PresentFlags, PrimitiveTopology as RawTopology,
    PrimitiveTopologyType, RasterizerDesc, RenderTargetBlendDesc, ResourceDimension,
    ResourceFlags, ResourceStates, SamplerDesc, ShaderVisibility, StencilOp, StencilOpDesc,
    TextureAddressMode,
};

/// Rounds `size` up to the next multiple of 256, the constant buffer granularity.
/// `None` if the result does not fit in a `u64`.
pub fn align_to_256(size: u64) -> Option<u64> {
    size.checked_add(255).map(|size| size & !255)
}

pub fn map_buffer_usage_to_resource_flags(usage: crate::BufferUses) -> ResourceFlags {
    let mut flags = ResourceFlags::empty();
    if usage.contains(crate::BufferUses::STORAGE_READ_WRITE) {
        flags |= ResourceFlags::ALLOW_UNORDERED_ACCESS;
    }
    flags
}

pub fn map_texture_dimension(dim: crate::TextureDimension) -> ResourceDimension {
    match dim {
        crate::TextureDimension::D1 => ResourceDimension::Texture1D,
        crate::TextureDimension::D2 => ResourceDimension::Texture2D,
        crate::TextureDimension::D3 => ResourceDimension::Texture3D,
    }
}

pub fn map_texture_usage_to_resource_flags(usage: crate::TextureUses) -> ResourceFlags {
    let mut flags = ResourceFlags::empty();

    if usage.contains(crate::TextureUses::COLOR_TARGET) {
        flags |= ResourceFlags::ALLOW_RENDER_TARGET;
    }
    if usage.intersects(
        crate::TextureUses::DEPTH_STENCIL_READ | crate::TextureUses::DEPTH_STENCIL_WRITE,
    ) {
        flags |= ResourceFlags::ALLOW_DEPTH_STENCIL;
        if !usage.contains(crate::TextureUses::RESOURCE) {
            flags |= ResourceFlags::DENY_SHADER_RESOURCE;
        }
    }
    if usage.contains(crate::TextureUses::STORAGE_READ_WRITE) {
        flags |= ResourceFlags::ALLOW_UNORDERED_ACCESS;
    }

    flags
}

/// Heap a buffer lives in. `None` when the usage asks for both map directions.
pub fn map_buffer_heap(usage: crate::BufferUses, mapped_at_creation: bool) -> Option<HeapType> {
    use crate::BufferUses as Bu;
    match (usage.contains(Bu::MAP_READ), usage.contains(Bu::MAP_WRITE)) {
        (true, true) => None,
        (true, false) => Some(HeapType::Readback),
        (false, true) => Some(HeapType::Upload),
        (false, false) if mapped_at_creation => Some(HeapType::Upload),
        (false, false) => Some(HeapType::Default),
    }
}

/// The only state a committed resource may start in on the given heap.
pub fn map_heap_initial_state(heap: HeapType) -> ResourceStates {
    match heap {
        HeapType::Default => ResourceStates::COMMON,
        HeapType::Upload => ResourceStates::GENERIC_READ,
        HeapType::Readback => ResourceStates::COPY_DEST,
    }
}

pub fn map_buffer_usage_to_state(usage: crate::BufferUses) -> ResourceStates {
    use crate::BufferUses as Bu;
    let mut state = ResourceStates::COMMON;

    if usage.intersects(Bu::COPY_SRC) {
        state |= ResourceStates::COPY_SOURCE;
    }
    if usage.intersects(Bu::COPY_DST) {
        state |= ResourceStates::COPY_DEST;
    }
    if usage.intersects(Bu::INDEX) {
        state |= ResourceStates::INDEX_BUFFER;
    }
    if usage.intersects(Bu::VERTEX | Bu::UNIFORM) {
        state |= ResourceStates::VERTEX_AND_CONSTANT_BUFFER;
    }
    if usage.intersects(Bu::STORAGE_READ_WRITE) {
        state |= ResourceStates::UNORDERED_ACCESS;
    } else if usage.intersects(Bu::STORAGE_READ) {
        state |=
            ResourceStates::PIXEL_SHADER_RESOURCE | ResourceStates::NON_PIXEL_SHADER_RESOURCE;
    }
    if usage.intersects(Bu::INDIRECT) {
        state |= ResourceStates::INDIRECT_ARGUMENT;
    }
    state
}

pub fn map_texture_usage_to_state(usage: crate::TextureUses) -> ResourceStates {
    use crate::TextureUses as Tu;
    let mut state = ResourceStates::COMMON;
    // `PRESENT` is the same as `COMMON`.
    if usage == Tu::UNINITIALIZED {
        return state;
    }

    if usage.intersects(Tu::COPY_SRC) {
        state |= ResourceStates::COPY_SOURCE;
    }
    if usage.intersects(Tu::COPY_DST) {
        state |= ResourceStates::COPY_DEST;
    }
    if usage.intersects(Tu::RESOURCE) {
        state |=
            ResourceStates::PIXEL_SHADER_RESOURCE | ResourceStates::NON_PIXEL_SHADER_RESOURCE;
    }
    if usage.intersects(Tu::COLOR_TARGET) {
        state |= ResourceStates::RENDER_TARGET;
    }
    if usage.intersects(Tu::DEPTH_STENCIL_READ) {
        state |= ResourceStates::DEPTH_READ;
    }
    if usage.intersects(Tu::DEPTH_STENCIL_WRITE) {
        state |= ResourceStates::DEPTH_WRITE;
    }
    if usage.intersects(Tu::STORAGE_READ | Tu::STORAGE_READ_WRITE) {
        state |= ResourceStates::UNORDERED_ACCESS;
    }
    state
}

pub fn map_texture_format(format: crate::TextureFormat) -> Format {
    use crate::TextureFormat as Tf;
    match format {
        Tf::R8Unorm => Format::R8_UNORM,
        Tf::Rg8Unorm => Format::R8G8_UNORM,
        Tf::Rgba8Unorm => Format::R8G8B8A8_UNORM,
        Tf::Rgba8UnormSrgb => Format::R8G8B8A8_UNORM_SRGB,
        Tf::Rgba8Uint => Format::R8G8B8A8_UINT,
        Tf::Bgra8Unorm => Format::B8G8R8A8_UNORM,
        Tf::Bgra8UnormSrgb => Format::B8G8R8A8_UNORM_SRGB,
        Tf::Rgb10a2Unorm => Format::R10G10B10A2_UNORM,
        Tf::R16Float => Format::R16_FLOAT,
        Tf::Rg16Float => Format::R16G16_FLOAT,
        Tf::Rgba16Float => Format::R16G16B16A16_FLOAT,
        Tf::R32Float => Format::R32_FLOAT,
        Tf::R32Uint => Format::R32_UINT,
        Tf::Rg32Float => Format::R32G32_FLOAT,
        Tf::Rg32Uint => Format::R32G32_UINT,
        Tf::Rgba32Float => Format::R32G32B32A32_FLOAT,
        Tf::Rgba32Uint => Format::R32G32B32A32_UINT,
        Tf::Depth16Unorm => Format::D16_UNORM,
        Tf::Depth24PlusStencil8 => Format::D24_UNORM_S8_UINT,
        Tf::Depth32Float => Format::D32_FLOAT,
        Tf::Depth32FloatStencil8 => Format::D32_FLOAT_S8X24_UINT,
    }
}

/// Swapchains are created in the linear variant of the format.
pub fn map_texture_format_nosrgb(format: crate::TextureFormat) -> Format {
    map_texture_format(format.remove_srgb_suffix())
}

/// Format of the resource itself. Depth formats that are also sampled are
/// created typeless so both the DSV and the SRV can be made.
pub fn map_texture_format_for_resource(
    format: crate::TextureFormat,
    usage: crate::TextureUses,
) -> Format {
    use crate::TextureFormat as Tf;
    if !usage.contains(crate::TextureUses::RESOURCE) {
        return map_texture_format(format);
    }
    match format {
        Tf::Depth16Unorm => Format::R16_TYPELESS,
        Tf::Depth24PlusStencil8 => Format::R24G8_TYPELESS,
        Tf::Depth32Float => Format::R32_TYPELESS,
        Tf::Depth32FloatStencil8 => Format::R32G8X24_TYPELESS,
        other => map_texture_format(other),
    }
}

pub fn map_texture_format_for_srv(format: crate::TextureFormat) -> Format {
    use crate::TextureFormat as Tf;
    match format {
        Tf::Depth16Unorm => Format::R16_UNORM,
        Tf::Depth24PlusStencil8 => Format::R24_UNORM_X8_TYPELESS,
        Tf::Depth32Float => Format::R32_FLOAT,
        Tf::Depth32FloatStencil8 => Format::R32_FLOAT_X8X24_TYPELESS,
        other => map_texture_format(other),
    }
}

pub fn map_texture_format_for_dsv(format: crate::TextureFormat) -> Format {
    map_texture_format(format)
}

pub fn map_index_format(format: crate::IndexFormat) -> Format {
    match format {
        crate::IndexFormat::Uint16 => Format::R16_UINT,
        crate::IndexFormat::Uint32 => Format::R32_UINT,
    }
}

pub fn map_vertex_format(format: crate::VertexFormat) -> Format {
    use crate::VertexFormat as Vf;
    match format {
        Vf::Unorm8x4 => Format::R8G8B8A8_UNORM,
        Vf::Uint32 => Format::R32_UINT,
        Vf::Uint32x2 => Format::R32G32_UINT,
        Vf::Uint32x4 => Format::R32G32B32A32_UINT,
        Vf::Float32 => Format::R32_FLOAT,
        Vf::Float32x2 => Format::R32G32_FLOAT,
        Vf::Float32x3 => Format::R32G32B32_FLOAT,
        Vf::Float32x4 => Format::R32G32B32A32_FLOAT,
    }
}

pub fn map_step_mode(mode: crate::VertexStepMode) -> (InputClassification, u32) {
    match mode {
        crate::VertexStepMode::Vertex => (InputClassification::PerVertex, 0),
        crate::VertexStepMode::Instance => (InputClassification::PerInstance, 1),
    }
}

pub fn map_address_mode(mode: crate::AddressMode) -> TextureAddressMode {
    use crate::AddressMode as Am;
    match mode {
        Am::Repeat => TextureAddressMode::Wrap,
        Am::MirrorRepeat => TextureAddressMode::Mirror,
        Am::ClampToEdge => TextureAddressMode::Clamp,
        Am::ClampToBorder => TextureAddressMode::Border,
    }
}

pub fn map_filter_mode(mode: crate::FilterMode) -> FilterType {
    match mode {
        crate::FilterMode::Nearest => FilterType::Point,
        crate::FilterMode::Linear => FilterType::Linear,
    }
}

pub fn map_comparison(func: crate::CompareFunction) -> ComparisonFunc {
    use crate::CompareFunction as Cf;
    match func {
        Cf::Never => ComparisonFunc::Never,
        Cf::Less => ComparisonFunc::Less,
        Cf::LessEqual => ComparisonFunc::LessEqual,
        Cf::Equal => ComparisonFunc::Equal,
        Cf::GreaterEqual => ComparisonFunc::GreaterEqual,
        Cf::Greater => ComparisonFunc::Greater,
        Cf::NotEqual => ComparisonFunc::NotEqual,
        Cf::Always => ComparisonFunc::Always,
    }
}

pub fn map_border_color(border_color: Option<crate::SamplerBorderColor>) -> [f32; 4] {
    use crate::SamplerBorderColor as Sbc;
    match border_color {
        Some(Sbc::TransparentBlack) | None => [0.0; 4],
        Some(Sbc::OpaqueBlack) => [0.0, 0.0, 0.0, 1.0],
        Some(Sbc::OpaqueWhite) => [1.0; 4],
    }
}

pub fn map_sampler(desc: &crate::SamplerDescriptor) -> SamplerDesc {
    SamplerDesc {
        min_filter: map_filter_mode(desc.min_filter),
        mag_filter: map_filter_mode(desc.mag_filter),
        mip_filter: map_filter_mode(desc.mipmap_filter),
        anisotropic: desc.anisotropy_clamp > 1,
        comparison: desc.compare.is_some(),
        address: desc.address_modes.map(map_address_mode),
        mip_lod_bias: 0.0,
        max_anisotropy: desc.anisotropy_clamp as u32,
        comparison_func: map_comparison(desc.compare.unwrap_or(crate::CompareFunction::Always)),
        border_color: map_border_color(desc.border_color),
        min_lod: desc.lod_clamp.start,
        max_lod: desc.lod_clamp.end,
    }
}

/// Visibility of a descriptor table used by the given stages.
pub fn map_visibility(visibility: crate::ShaderStages) -> ShaderVisibility {
    match visibility {
        crate::ShaderStages::VERTEX => ShaderVisibility::Vertex,
        crate::ShaderStages::FRAGMENT => ShaderVisibility::Pixel,
        _ => ShaderVisibility::All,
    }
}

pub fn map_binding_type(ty: &crate::BindingType) -> DescriptorRangeType {
    use crate::BindingType as Bt;
    match *ty {
        Bt::Sampler { .. } => DescriptorRangeType::Sampler,
        Bt::Buffer {
            ty: crate::BufferBindingType::Uniform,
            ..
        } => DescriptorRangeType::Cbv,
        Bt::Buffer {
            ty: crate::BufferBindingType::Storage { read_only: true },
            ..
        }
        | Bt::Texture { .. } => DescriptorRangeType::Srv,
        Bt::Buffer {
            ty: crate::BufferBindingType::Storage { read_only: false },
            ..
        }
        | Bt::StorageTexture { .. } => DescriptorRangeType::Uav,
    }
}

/// Sync interval and present flags for a present mode.
pub fn map_present_mode(mode: crate::PresentMode, allow_tearing: bool) -> (u32, PresentFlags) {
    match mode {
        crate::PresentMode::Immediate if allow_tearing => (0, PresentFlags::ALLOW_TEARING),
        crate::PresentMode::Immediate | crate::PresentMode::Mailbox => (0, PresentFlags::empty()),
        crate::PresentMode::Fifo => (1, PresentFlags::empty()),
    }
}

pub fn map_topology(topology: crate::PrimitiveTopology) -> (PrimitiveTopologyType, RawTopology) {
    match topology {
        crate::PrimitiveTopology::PointList => {
            (PrimitiveTopologyType::Point, RawTopology::PointList)
        }
        crate::PrimitiveTopology::LineList => (PrimitiveTopologyType::Line, RawTopology::LineList),
        crate::PrimitiveTopology::LineStrip => {
            (PrimitiveTopologyType::Line, RawTopology::LineStrip)
        }
        crate::PrimitiveTopology::TriangleList => {
            (PrimitiveTopologyType::Triangle, RawTopology::TriangleList)
        }
        crate::PrimitiveTopology::TriangleStrip => {
            (PrimitiveTopologyType::Triangle, RawTopology::TriangleStrip)
        }
    }
}

pub fn map_rasterizer(
    primitive: &crate::PrimitiveState,
    bias: crate::DepthBiasState,
) -> RasterizerDesc {
    RasterizerDesc {
        cull_mode: match primitive.cull_mode {
            None => CullMode::None,
            Some(crate::Face::Front) => CullMode::Front,
            Some(crate::Face::Back) => CullMode::Back,
        },
        front_counter_clockwise: match primitive.front_face {
            crate::FrontFace::Cw => false,
            crate::FrontFace::Ccw => true,
        },
        depth_bias: bias.constant,
        depth_bias_clamp: bias.clamp,
        slope_scaled_depth_bias: bias.slope_scale,
        depth_clip_enable: true,
    }
}

/// Alpha blending cannot take `_COLOR` factors, `is_alpha` picks the `_ALPHA` equivalent.
fn map_blend_factor(factor: crate::BlendFactor, is_alpha: bool) -> Blend {
    use crate::BlendFactor as Bf;
    match factor {
        Bf::Zero => Blend::Zero,
        Bf::One => Blend::One,
        Bf::Src if is_alpha => Blend::SrcAlpha,
        Bf::Src => Blend::SrcColor,
        Bf::OneMinusSrc if is_alpha => Blend::InvSrcAlpha,
        Bf::OneMinusSrc => Blend::InvSrcColor,
        Bf::Dst if is_alpha => Blend::DestAlpha,
        Bf::Dst => Blend::DestColor,
        Bf::OneMinusDst if is_alpha => Blend::InvDestAlpha,
        Bf::OneMinusDst => Blend::InvDestColor,
        Bf::SrcAlpha => Blend::SrcAlpha,
        Bf::OneMinusSrcAlpha => Blend::InvSrcAlpha,
        Bf::DstAlpha => Blend::DestAlpha,
        Bf::OneMinusDstAlpha => Blend::InvDestAlpha,
        Bf::Constant => Blend::BlendFactor,
        Bf::OneMinusConstant => Blend::InvBlendFactor,
        Bf::SrcAlphaSaturated => Blend::SrcAlphaSat,
    }
}

fn map_blend_component(component: &crate::BlendComponent, is_alpha: bool) -> (BlendOp, Blend, Blend) {
    let raw_op = match component.operation {
        crate::BlendOperation::Add => BlendOp::Add,
        crate::BlendOperation::Subtract => BlendOp::Subtract,
        crate::BlendOperation::ReverseSubtract => BlendOp::RevSubtract,
        crate::BlendOperation::Min => BlendOp::Min,
        crate::BlendOperation::Max => BlendOp::Max,
    };
    let raw_src = map_blend_factor(component.src_factor, is_alpha);
    let raw_dst = map_blend_factor(component.dst_factor, is_alpha);
    (raw_op, raw_src, raw_dst)
}

/// One blend desc per color target slot. Empty slots write nothing.
pub fn map_render_targets(
    color_targets: &[Option<crate::ColorTargetState>],
) -> ArrayVec<RenderTargetBlendDesc, { crate::MAX_COLOR_ATTACHMENTS }> {
    color_targets
        .iter()
        .take(crate::MAX_COLOR_ATTACHMENTS)
        .map(|ct| {
            let mut raw = RenderTargetBlendDesc {
                write_mask: 0,
                ..Default::default()
            };
            if let Some(ct) = ct.as_ref() {
                raw.write_mask = ct.write_mask.bits() as u8;
                if let Some(ref blend) = ct.blend {
                    let (color_op, color_src, color_dst) = map_blend_component(&blend.color, false);
                    let (alpha_op, alpha_src, alpha_dst) = map_blend_component(&blend.alpha, true);
                    raw.blend_enable = true;
                    raw.blend_op = color_op;
                    raw.src_blend = color_src;
                    raw.dest_blend = color_dst;
                    raw.blend_op_alpha = alpha_op;
                    raw.src_blend_alpha = alpha_src;
                    raw.dest_blend_alpha = alpha_dst;
                }
            }
            raw
        })
        .collect()
}

fn map_stencil_op(op: crate::StencilOperation) -> StencilOp {
    use crate::StencilOperation as So;
    match op {
        So::Keep => StencilOp::Keep,
        So::Zero => StencilOp::Zero,
        So::Replace => StencilOp::Replace,
        So::IncrementClamp => StencilOp::IncrSat,
        So::IncrementWrap => StencilOp::Incr,
        So::DecrementClamp => StencilOp::DecrSat,
        So::DecrementWrap => StencilOp::Decr,
        So::Invert => StencilOp::Invert,
    }
}

fn map_stencil_face(face: &crate::StencilFaceState) -> StencilOpDesc {
    StencilOpDesc {
        fail_op: map_stencil_op(face.fail_op),
        depth_fail_op: map_stencil_op(face.depth_fail_op),
        pass_op: map_stencil_op(face.pass_op),
        func: map_comparison(face.compare),
    }
}

pub fn map_depth_stencil(ds: &crate::DepthStencilState) -> DepthStencilDesc {
    DepthStencilDesc {
        depth_enable: ds.depth_compare != crate::CompareFunction::Always || ds.depth_write_enabled,
        depth_write: ds.depth_write_enabled,
        depth_func: map_comparison(ds.depth_compare),
        stencil_enable: ds.stencil.is_enabled(),
        stencil_read_mask: ds.stencil.read_mask as u8,
        stencil_write_mask: ds.stencil.write_mask as u8,
        front_face: map_stencil_face(&ds.stencil.front),
        back_face: map_stencil_face(&ds.stencil.back),
    }
}

pub fn map_color(color: crate::Color) -> [f32; 4] {
    [
        color.r as f32,
        color.g as f32,
        color.b as f32,
        color.a as f32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_256_properties() {
        for size in [1u64, 2, 255, 256, 257, 511, 512, 1000, 65_535] {
            let aligned = align_to_256(size).unwrap();
            assert_eq!(aligned % 256, 0);
            assert!(aligned >= size);
            assert!(aligned - size < 256);
        }
        assert_eq!(align_to_256(256), Some(256));
        assert_eq!(align_to_256(0), Some(0));
        assert_eq!(align_to_256(u64::MAX - 255), Some(u64::MAX - 255));
        assert_eq!(align_to_256(u64::MAX - 254), None);
    }

    #[test]
    fn heap_selection() {
        use crate::BufferUses as Bu;
        assert_eq!(map_buffer_heap(Bu::MAP_READ | Bu::COPY_DST, false), Some(HeapType::Readback));
        assert_eq!(map_buffer_heap(Bu::MAP_WRITE | Bu::COPY_SRC, false), Some(HeapType::Upload));
        assert_eq!(map_buffer_heap(Bu::VERTEX, true), Some(HeapType::Upload));
        assert_eq!(map_buffer_heap(Bu::STORAGE_READ_WRITE, false), Some(HeapType::Default));
        assert_eq!(map_buffer_heap(Bu::MAP_READ | Bu::MAP_WRITE, false), None);
        assert_eq!(map_heap_initial_state(HeapType::Upload), ResourceStates::GENERIC_READ);
        assert_eq!(map_heap_initial_state(HeapType::Readback), ResourceStates::COPY_DEST);
        assert_eq!(map_heap_initial_state(HeapType::Default), ResourceStates::COMMON);
    }

    #[test]
    fn usage_states_are_or_combined() {
        use crate::BufferUses as Bu;
        assert_eq!(
            map_buffer_usage_to_state(Bu::COPY_SRC | Bu::VERTEX),
            ResourceStates::COPY_SOURCE | ResourceStates::VERTEX_AND_CONSTANT_BUFFER
        );
        assert_eq!(map_buffer_usage_to_state(Bu::empty()), ResourceStates::COMMON);
        assert_eq!(
            map_buffer_usage_to_state(Bu::STORAGE_READ | Bu::STORAGE_READ_WRITE),
            ResourceStates::UNORDERED_ACCESS
        );
        assert_eq!(
            map_texture_usage_to_state(crate::TextureUses::UNINITIALIZED),
            ResourceStates::COMMON
        );
        assert_eq!(
            map_texture_usage_to_state(crate::TextureUses::PRESENT),
            ResourceStates::COMMON
        );
    }

    #[test]
    fn sampled_depth_is_typeless() {
        use crate::{TextureFormat as Tf, TextureUses as Tu};
        assert_eq!(
            map_texture_format_for_resource(Tf::Depth32Float, Tu::DEPTH_STENCIL_WRITE | Tu::RESOURCE),
            Format::R32_TYPELESS
        );
        assert_eq!(
            map_texture_format_for_resource(Tf::Depth32Float, Tu::DEPTH_STENCIL_WRITE),
            Format::D32_FLOAT
        );
        assert_eq!(map_texture_format_for_srv(Tf::Depth24PlusStencil8), Format::R24_UNORM_X8_TYPELESS);
        assert_eq!(map_texture_format_for_dsv(Tf::Depth24PlusStencil8), Format::D24_UNORM_S8_UINT);
        assert_eq!(map_texture_format_nosrgb(Tf::Bgra8UnormSrgb), Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn present_modes() {
        use crate::PresentMode as Pm;
        assert_eq!(map_present_mode(Pm::Fifo, true), (1, PresentFlags::empty()));
        assert_eq!(map_present_mode(Pm::Mailbox, true), (0, PresentFlags::empty()));
        assert_eq!(map_present_mode(Pm::Immediate, true), (0, PresentFlags::ALLOW_TEARING));
        assert_eq!(map_present_mode(Pm::Immediate, false), (0, PresentFlags::empty()));
    }

    #[test]
    fn binding_classes() {
        let uniform = crate::BindingType::Buffer {
            ty: crate::BufferBindingType::Uniform,
            min_binding_size: None,
        };
        let storage = crate::BindingType::Buffer {
            ty: crate::BufferBindingType::Storage { read_only: false },
            min_binding_size: None,
        };
        let comparison = crate::BindingType::Sampler(crate::SamplerBindingType::Comparison);
        assert_eq!(map_binding_type(&uniform), DescriptorRangeType::Cbv);
        assert_eq!(map_binding_type(&storage), DescriptorRangeType::Uav);
        assert_eq!(map_binding_type(&comparison), DescriptorRangeType::Sampler);
        assert_eq!(map_visibility(crate::ShaderStages::VERTEX_FRAGMENT), ShaderVisibility::All);
        assert_eq!(map_visibility(crate::ShaderStages::FRAGMENT), ShaderVisibility::Pixel);
    }

    #[test]
    fn alpha_factors_avoid_color_variants() {
        let targets = [Some(crate::ColorTargetState {
            format: crate::TextureFormat::Rgba8Unorm,
            blend: Some(crate::BlendState {
                color: crate::BlendComponent {
                    src_factor: crate::BlendFactor::Src,
                    dst_factor: crate::BlendFactor::OneMinusDst,
                    operation: crate::BlendOperation::Add,
                },
                alpha: crate::BlendComponent {
                    src_factor: crate::BlendFactor::Src,
                    dst_factor: crate::BlendFactor::OneMinusDst,
                    operation: crate::BlendOperation::Max,
                },
            }),
            write_mask: crate::ColorWrites::ALL,
        })];
        let raw = map_render_targets(&targets);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].src_blend, Blend::SrcColor);
        assert_eq!(raw[0].src_blend_alpha, Blend::SrcAlpha);
        assert_eq!(raw[0].dest_blend_alpha, Blend::InvDestAlpha);
        assert_eq!(raw[0].blend_op_alpha, BlendOp::Max);
        assert_eq!(raw[0].write_mask, 0xF);
    }
}
