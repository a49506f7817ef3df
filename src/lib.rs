/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

/*! Direct3D 12 hardware abstraction layer.
 *
 *  Maps a WebGPU-style vocabulary (buffers, textures, bind groups,
 *  render/compute passes, fences, surfaces) onto Direct3D 12 and DXGI.
 *
 *  - Compile-time backend selection via the [`native::Native`] traits.
 *    [`native::d3d12`] talks to the real runtime, [`native::soft`] is a
 *    CPU reference device.
 *  - Objects are passed by references and returned by value. No IDs.
 *  - Resource transitions are explicit.
 *  - Misuse is reported with typed errors, never ignored.
 */

#![allow(
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
    // Redundant matching is more explicit.
    clippy::redundant_pattern_matching,
    // Explicit lifetimes are often easier to reason about.
    clippy::needless_lifetimes,
    // No need for defaults in the internal types.
    clippy::new_without_default,
    // Matches the native call signatures.
    clippy::too_many_arguments,
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_qualifications,
    // We don't match on a reference, unless required.
    clippy::pattern_type_mismatch,
)]

pub mod counters;
pub mod dx12;
pub mod native;
mod types;

use std::{num::NonZeroU64, ops::Range, ptr::NonNull, sync::Arc};

use bitflags::bitflags;
use thiserror::Error;

pub use counters::HalCounters;
pub use dx12::shader_compilation::{CompiledShader, ShaderCompiler};
pub use types::*;

pub const MAX_BIND_GROUPS: usize = 8;
pub const MAX_COLOR_ATTACHMENTS: usize = 8;
pub const MAX_VERTEX_BUFFERS: usize = 16;

pub type Label<'a> = Option<&'a str>;
pub type MemoryRange = Range<BufferAddress>;
pub type FenceValue = u64;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum DeviceError {
    #[error("native call `{call}` failed with {status}")]
    NativeCallFailed {
        call: &'static str,
        status: native::Status,
    },
    #[error("{kind:?} descriptor heap exhausted: requested {requested}, {available} available")]
    HeapExhausted {
        kind: native::DescriptorHeapType,
        requested: u32,
        available: u32,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("command encoder is not recording")]
    NotRecording,
    #[error("command encoder is already recording")]
    AlreadyRecording,
    #[error("device is lost")]
    Lost,
    #[error("root signature serialization failed with {status}: {message}")]
    RootSignature {
        status: native::Status,
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ShaderError {
    #[error("compilation of `{entry_point}` failed: {message}")]
    Compilation { entry_point: String, message: String },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum PipelineError {
    #[error("entry point `{0}` is not present in the shader module")]
    EntryPoint(String),
    #[error("linkage failed for stage {0:?}: {1}")]
    Linkage(ShaderStages, String),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SurfaceError {
    #[error("surface is lost")]
    Lost,
    #[error("surface is not configured")]
    NotConfigured,
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("other reason: {0}")]
    Other(&'static str),
}

#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct InstanceError {
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl InstanceError {
    pub fn new(message: String) -> Self {
        InstanceError {
            message,
            source: None,
        }
    }

    pub fn with_source(
        message: String,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        InstanceError {
            message,
            source: Some(Arc::new(source)),
        }
    }
}

bitflags! {
    /// Similar to `BufferUsages` but for internal use.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct BufferUses: u16 {
        const MAP_READ = 1 << 0;
        const MAP_WRITE = 1 << 1;
        const COPY_SRC = 1 << 2;
        const COPY_DST = 1 << 3;
        const INDEX = 1 << 4;
        const VERTEX = 1 << 5;
        const UNIFORM = 1 << 6;
        const STORAGE_READ = 1 << 7;
        const STORAGE_READ_WRITE = 1 << 8;
        const INDIRECT = 1 << 9;
        /// The combination of usages that can be used together (read-only).
        const INCLUSIVE = Self::MAP_READ.bits() | Self::COPY_SRC.bits() |
            Self::INDEX.bits() | Self::VERTEX.bits() | Self::UNIFORM.bits() |
            Self::STORAGE_READ.bits() | Self::INDIRECT.bits();
        /// The combination of exclusive usages (write-only and read-write).
        /// These usages may still show up with others, but can't automatically be combined.
        const EXCLUSIVE = Self::MAP_WRITE.bits() | Self::COPY_DST.bits() | Self::STORAGE_READ_WRITE.bits();
        /// Usages that require a UAV barrier between two uses.
        const STORAGE_STORE = Self::STORAGE_READ_WRITE.bits();
    }
}

bitflags! {
    /// Similar to `TextureUsages` but for internal use.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct TextureUses: u16 {
        const UNINITIALIZED = 1 << 0;
        const PRESENT = 1 << 1;
        const COPY_SRC = 1 << 2;
        const COPY_DST = 1 << 3;
        const RESOURCE = 1 << 4;
        const COLOR_TARGET = 1 << 5;
        const DEPTH_STENCIL_READ = 1 << 6;
        const DEPTH_STENCIL_WRITE = 1 << 7;
        const STORAGE_READ = 1 << 8;
        const STORAGE_READ_WRITE = 1 << 9;
        const STORAGE_STORE = Self::STORAGE_READ_WRITE.bits();
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct FormatAspects: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl FormatAspects {
    pub fn from_format(format: TextureFormat) -> Self {
        if !format.is_depth_stencil() {
            Self::COLOR
        } else if format.has_stencil() {
            Self::DEPTH | Self::STENCIL
        } else {
            Self::DEPTH
        }
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct AttachmentOps: u8 {
        const LOAD = 1 << 0;
        const STORE = 1 << 1;
    }
}

#[derive(Clone, Debug)]
pub struct InstanceDescriptor<'a> {
    pub name: &'a str,
    pub flags: InstanceFlags,
}

/// Sizes of the per-device descriptor heaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapCapacities {
    pub views: u32,
    pub samplers: u32,
    pub render_targets: u32,
    pub depth_stencils: u32,
    pub view_staging: u32,
    pub sampler_staging: u32,
}

impl Default for HeapCapacities {
    fn default() -> Self {
        Self {
            views: 1_000_000,
            samplers: 2048,
            render_targets: 256,
            depth_stencils: 64,
            view_staging: 65_536,
            sampler_staging: 2048,
        }
    }
}

#[derive(Clone, Default)]
pub struct DeviceDescriptor<'a> {
    pub label: Label<'a>,
    pub heap_capacities: HeapCapacities,
    /// Compiler used for [`ShaderSource::Hlsl`] modules.
    pub shader_compiler: Option<Arc<dyn ShaderCompiler>>,
}

#[derive(Clone, Debug)]
pub struct Limits {
    pub max_texture_dimension_1d: u32,
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
    pub max_texture_array_layers: u32,
    pub max_bind_groups: u32,
    pub max_vertex_buffers: u32,
    pub max_vertex_attributes: u32,
    pub max_color_attachments: u32,
    pub max_uniform_buffer_binding_size: u32,
    pub max_storage_buffer_binding_size: u32,
    pub max_compute_workgroups_per_dimension: u32,
}

#[derive(Clone, Debug)]
pub struct Alignments {
    /// The alignment of the start of the buffer used as a GPU copy source.
    pub buffer_copy_offset: BufferSize,
    /// The alignment of the row pitch of the texture data stored in a buffer
    /// that is used in a GPU copy operation.
    pub buffer_copy_pitch: BufferSize,
    pub uniform_buffer_offset: BufferSize,
}

#[derive(Clone, Debug)]
pub struct Capabilities {
    pub limits: Limits,
    pub alignments: Alignments,
    pub tearing: bool,
}

#[derive(Debug)]
pub struct ExposedAdapter<N: native::Native> {
    pub adapter: dx12::Adapter<N>,
    pub info: AdapterInfo,
    pub capabilities: Capabilities,
}

#[derive(Debug)]
pub struct OpenDevice<N: native::Native> {
    pub device: dx12::Device<N>,
    pub queue: dx12::Queue<N>,
}

#[derive(Clone, Debug)]
pub struct SurfaceCapabilities {
    pub formats: Vec<TextureFormat>,
    pub swap_chain_sizes: std::ops::RangeInclusive<u32>,
    pub current_extent: Option<Extent3d>,
    pub usage: TextureUses,
    pub present_modes: Vec<PresentMode>,
}

#[derive(Debug)]
pub struct BufferMapping {
    pub ptr: NonNull<u8>,
    pub is_coherent: bool,
}

#[derive(Clone, Debug)]
pub struct BufferDescriptor<'a> {
    pub label: Label<'a>,
    pub size: BufferAddress,
    pub usage: BufferUses,
    pub mapped_at_creation: bool,
}

#[derive(Clone, Debug)]
pub struct TextureDescriptor<'a> {
    pub label: Label<'a>,
    pub size: Extent3d,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub usage: TextureUses,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ImageSubresourceRange {
    pub base_mip_level: u32,
    pub mip_level_count: Option<u32>,
    pub base_array_layer: u32,
    pub array_layer_count: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct TextureViewDescriptor<'a> {
    pub label: Label<'a>,
    pub format: TextureFormat,
    pub dimension: TextureViewDimension,
    /// Subset of the parent texture usage that the view needs handles for.
    pub usage: TextureUses,
    pub range: ImageSubresourceRange,
}

#[derive(Clone, Debug)]
pub struct SamplerDescriptor<'a> {
    pub label: Label<'a>,
    pub address_modes: [AddressMode; 3],
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub lod_clamp: Range<f32>,
    pub compare: Option<CompareFunction>,
    pub anisotropy_clamp: u16,
    pub border_color: Option<SamplerBorderColor>,
}

impl Default for SamplerDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            address_modes: [AddressMode::ClampToEdge; 3],
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            lod_clamp: 0.0..32.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BindGroupLayoutDescriptor<'a> {
    pub label: Label<'a>,
    pub entries: &'a [BindGroupLayoutEntry],
}

#[derive(Clone, Debug)]
pub struct PipelineLayoutDescriptor<'a> {
    pub label: Label<'a>,
    pub bind_group_layouts: &'a [&'a dx12::BindGroupLayout],
}

#[derive(Debug)]
pub struct BufferBinding<'a, N: native::Native> {
    pub buffer: &'a dx12::Buffer<N>,
    pub offset: BufferAddress,
    /// `None` binds the rest of the buffer.
    pub size: Option<BufferSize>,
}

impl<N: native::Native> Clone for BufferBinding<'_, N> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer,
            offset: self.offset,
            size: self.size,
        }
    }
}

#[derive(Debug)]
pub struct TextureBinding<'a, N: native::Native> {
    pub view: &'a dx12::TextureView<N>,
    pub usage: TextureUses,
}

#[derive(Clone, Copy, Debug)]
pub struct BindGroupEntry {
    pub binding: u32,
    /// Index into the resource array of the matching kind.
    pub resource_index: u32,
}

/// BindGroup descriptor.
///
/// Every entry refers to a resource in one of `buffers`, `samplers` or
/// `textures`, picked by the layout entry's binding type.
#[derive(Debug)]
pub struct BindGroupDescriptor<'a, N: native::Native> {
    pub label: Label<'a>,
    pub layout: &'a dx12::BindGroupLayout,
    pub buffers: &'a [BufferBinding<'a, N>],
    pub samplers: &'a [&'a dx12::Sampler<N>],
    pub textures: &'a [TextureBinding<'a, N>],
    pub entries: &'a [BindGroupEntry],
}

#[derive(Clone, Debug)]
pub enum ShaderSource<'a> {
    /// HLSL text, compiled per entry point.
    Hlsl(&'a str),
    /// Precompiled bytecode keyed by entry point name.
    Bytecode(&'a [(&'a str, &'a [u8])]),
}

#[derive(Clone, Debug)]
pub struct ShaderModuleDescriptor<'a> {
    pub label: Label<'a>,
    pub source: ShaderSource<'a>,
    pub entry_points: &'a [(&'a str, ShaderStages)],
}

#[derive(Clone, Copy, Debug)]
pub struct ProgrammableStage<'a> {
    pub module: &'a dx12::ShaderModule,
    pub entry_point: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexStepMode {
    Vertex,
    Instance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub format: VertexFormat,
    pub offset: BufferAddress,
    pub shader_location: u32,
}

#[derive(Clone, Debug)]
pub struct VertexBufferLayout<'a> {
    pub array_stride: BufferAddress,
    pub step_mode: VertexStepMode,
    pub attributes: &'a [VertexAttribute],
}

#[derive(Debug)]
pub struct RenderPipelineDescriptor<'a, N: native::Native> {
    pub label: Label<'a>,
    /// `None` uses the device's shared empty root signature.
    pub layout: Option<&'a dx12::PipelineLayout<N>>,
    pub vertex_buffers: &'a [VertexBufferLayout<'a>],
    pub vertex_stage: ProgrammableStage<'a>,
    pub primitive: PrimitiveState,
    pub depth_stencil: Option<DepthStencilState>,
    pub multisample: MultisampleState,
    pub fragment_stage: Option<ProgrammableStage<'a>>,
    pub color_targets: &'a [Option<ColorTargetState>],
}

#[derive(Debug)]
pub struct ComputePipelineDescriptor<'a, N: native::Native> {
    pub label: Label<'a>,
    pub layout: Option<&'a dx12::PipelineLayout<N>>,
    pub stage: ProgrammableStage<'a>,
}

#[derive(Clone, Debug)]
pub struct SurfaceConfiguration {
    /// Number of back buffers, 2..=16.
    pub swap_chain_size: u32,
    pub present_mode: PresentMode,
    pub format: TextureFormat,
    pub extent: Extent3d,
    pub usage: TextureUses,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect<T> {
    pub x: T,
    pub y: T,
    pub w: T,
    pub h: T,
}

#[derive(Debug)]
pub struct BufferBarrier<'a, N: native::Native> {
    pub buffer: &'a dx12::Buffer<N>,
    pub usage: Range<BufferUses>,
}

#[derive(Debug)]
pub struct TextureBarrier<'a, N: native::Native> {
    pub texture: &'a dx12::Texture<N>,
    pub range: ImageSubresourceRange,
    pub usage: Range<TextureUses>,
}

#[derive(Clone, Copy, Debug)]
pub struct BufferCopy {
    pub src_offset: BufferAddress,
    pub dst_offset: BufferAddress,
    pub size: BufferSize,
}

#[derive(Clone, Copy, Debug)]
pub struct TextureCopyBase {
    pub mip_level: u32,
    pub array_layer: u32,
    /// Origin within a texture.
    /// Note: for 1D and 2D textures, Z must be 0.
    pub origin: Origin3d,
    pub aspect: FormatAspects,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyExtent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct TextureCopy {
    pub src_base: TextureCopyBase,
    pub dst_base: TextureCopyBase,
    pub size: CopyExtent,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ImageDataLayout {
    pub offset: BufferAddress,
    pub bytes_per_row: Option<u32>,
    pub rows_per_image: Option<u32>,
}

#[derive(Clone, Copy, Debug)]
pub struct BufferTextureCopy {
    pub buffer_layout: ImageDataLayout,
    pub texture_base: TextureCopyBase,
    pub size: CopyExtent,
}

#[derive(Debug)]
pub struct ColorAttachment<'a, N: native::Native> {
    pub target: &'a dx12::TextureView<N>,
    pub ops: AttachmentOps,
    pub clear_value: Color,
}

#[derive(Debug)]
pub struct DepthStencilAttachment<'a, N: native::Native> {
    pub target: &'a dx12::TextureView<N>,
    pub depth_ops: AttachmentOps,
    pub stencil_ops: AttachmentOps,
    pub clear_value: (f32, u32),
}

#[derive(Debug)]
pub struct RenderPassDescriptor<'a, N: native::Native> {
    pub label: Label<'a>,
    pub color_attachments: &'a [Option<ColorAttachment<'a, N>>],
    pub depth_stencil_attachment: Option<DepthStencilAttachment<'a, N>>,
}

#[derive(Clone, Debug, Default)]
pub struct ComputePassDescriptor<'a> {
    pub label: Label<'a>,
}

/// Byte size of a buffer binding when `size` is `None`.
pub(crate) fn resolve_binding_size(
    total: BufferAddress,
    offset: BufferAddress,
    size: Option<NonZeroU64>,
) -> u64 {
    match size {
        Some(size) => size.get(),
        None => total.saturating_sub(offset),
    }
}

#[test]
fn test_default_limits() {
    let caps = HeapCapacities::default();
    assert!(caps.views >= caps.view_staging);
    assert!(caps.render_targets >= 16);
}
