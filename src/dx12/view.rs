use std::ops::Range;

use super::conv;
use crate::native::{
    self, DepthStencilViewDesc, DsvDimension, DsvFlags, RenderTargetViewDesc, RtvDimension,
    ShaderResourceViewDesc, SrvDimension, UavDimension, UnorderedAccessViewDesc,
};

/// A texture view descriptor with every range resolved against its texture.
pub(super) struct ViewDescriptor {
    dimension: crate::TextureViewDimension,
    pub aspects: crate::FormatAspects,
    pub rtv_dsv_format: native::Format,
    srv_uav_format: native::Format,
    multisampled: bool,
    pub array_layers: Range<u32>,
    pub mip_levels: Range<u32>,
}

impl crate::TextureViewDescriptor<'_> {
    pub(super) fn to_internal<N: native::Native>(
        &self,
        texture: &super::Texture<N>,
    ) -> Result<ViewDescriptor, crate::DeviceError> {
        let (mip_levels, array_layers) = texture.resolve_range(&self.range)?;
        let array_layer_count = array_layers.end - array_layers.start;
        if matches!(
            self.dimension,
            crate::TextureViewDimension::Cube | crate::TextureViewDimension::CubeArray
        ) && array_layer_count % 6 != 0
        {
            return Err(crate::DeviceError::InvalidArgument(format!(
                "cube view over {array_layer_count} layers"
            )));
        }

        Ok(ViewDescriptor {
            dimension: self.dimension,
            aspects: crate::FormatAspects::from_format(self.format),
            rtv_dsv_format: conv::map_texture_format(self.format),
            srv_uav_format: conv::map_texture_format_for_srv(self.format),
            multisampled: texture.sample_count > 1,
            mip_levels,
            array_layers,
        })
    }
}

impl ViewDescriptor {
    fn layer_count(&self) -> u32 {
        self.array_layers.end - self.array_layers.start
    }

    fn mip_count(&self) -> u32 {
        self.mip_levels.end - self.mip_levels.start
    }

    pub(super) fn to_srv(&self) -> ShaderResourceViewDesc {
        use crate::TextureViewDimension as Tvd;
        let dimension = match self.dimension {
            Tvd::D1 => SrvDimension::Texture1D {
                most_detailed_mip: self.mip_levels.start,
                mip_levels: self.mip_count(),
            },
            Tvd::D2 if self.multisampled => SrvDimension::Texture2DMs,
            Tvd::D2 if self.array_layers.start == 0 && self.layer_count() == 1 => {
                SrvDimension::Texture2D {
                    most_detailed_mip: self.mip_levels.start,
                    mip_levels: self.mip_count(),
                }
            }
            Tvd::D2 | Tvd::D2Array => SrvDimension::Texture2DArray {
                most_detailed_mip: self.mip_levels.start,
                mip_levels: self.mip_count(),
                first_array_slice: self.array_layers.start,
                array_size: self.layer_count(),
            },
            Tvd::Cube if self.array_layers.start == 0 => SrvDimension::TextureCube {
                most_detailed_mip: self.mip_levels.start,
                mip_levels: self.mip_count(),
            },
            Tvd::Cube | Tvd::CubeArray => SrvDimension::TextureCubeArray {
                most_detailed_mip: self.mip_levels.start,
                mip_levels: self.mip_count(),
                first_2d_array_face: self.array_layers.start,
                num_cubes: self.layer_count() / 6,
            },
            Tvd::D3 => SrvDimension::Texture3D {
                most_detailed_mip: self.mip_levels.start,
                mip_levels: self.mip_count(),
            },
        };
        ShaderResourceViewDesc {
            format: self.srv_uav_format,
            dimension,
        }
    }

    pub(super) fn to_uav(&self) -> UnorderedAccessViewDesc {
        use crate::TextureViewDimension as Tvd;
        let mip_slice = self.mip_levels.start;
        let dimension = match self.dimension {
            Tvd::D1 => UavDimension::Texture1D { mip_slice },
            Tvd::D2 if self.array_layers.start == 0 && self.layer_count() == 1 => {
                UavDimension::Texture2D { mip_slice }
            }
            Tvd::D2 | Tvd::D2Array | Tvd::Cube | Tvd::CubeArray => UavDimension::Texture2DArray {
                mip_slice,
                first_array_slice: self.array_layers.start,
                array_size: self.layer_count(),
            },
            Tvd::D3 => UavDimension::Texture3D {
                mip_slice,
                first_w_slice: 0,
                w_size: u32::MAX,
            },
        };
        UnorderedAccessViewDesc {
            format: self.srv_uav_format,
            dimension,
        }
    }

    pub(super) fn to_rtv(&self) -> RenderTargetViewDesc {
        use crate::TextureViewDimension as Tvd;
        let mip_slice = self.mip_levels.start;
        let dimension = match self.dimension {
            Tvd::D1 => RtvDimension::Texture1D { mip_slice },
            Tvd::D2 if self.multisampled => RtvDimension::Texture2DMs,
            Tvd::D2 if self.array_layers.start == 0 && self.layer_count() == 1 => {
                RtvDimension::Texture2D { mip_slice }
            }
            Tvd::D2 | Tvd::D2Array | Tvd::Cube | Tvd::CubeArray => RtvDimension::Texture2DArray {
                mip_slice,
                first_array_slice: self.array_layers.start,
                array_size: self.layer_count(),
            },
            Tvd::D3 => RtvDimension::Texture3D {
                mip_slice,
                first_w_slice: self.array_layers.start,
                w_size: self.layer_count(),
            },
        };
        RenderTargetViewDesc {
            format: self.rtv_dsv_format,
            dimension,
        }
    }

    pub(super) fn to_dsv(&self, read_only: bool) -> DepthStencilViewDesc {
        use crate::TextureViewDimension as Tvd;
        let mip_slice = self.mip_levels.start;
        let dimension = match self.dimension {
            Tvd::D1 => DsvDimension::Texture1D { mip_slice },
            Tvd::D2 if self.multisampled => DsvDimension::Texture2DMs,
            Tvd::D2 if self.array_layers.start == 0 && self.layer_count() == 1 => {
                DsvDimension::Texture2D { mip_slice }
            }
            Tvd::D2 | Tvd::D2Array | Tvd::Cube | Tvd::CubeArray | Tvd::D3 => {
                DsvDimension::Texture2DArray {
                    mip_slice,
                    first_array_slice: self.array_layers.start,
                    array_size: self.layer_count(),
                }
            }
        };
        let mut flags = DsvFlags::empty();
        if read_only {
            if self.aspects.contains(crate::FormatAspects::DEPTH) {
                flags |= DsvFlags::READ_ONLY_DEPTH;
            }
            if self.aspects.contains(crate::FormatAspects::STENCIL) {
                flags |= DsvFlags::READ_ONLY_STENCIL;
            }
        }
        DepthStencilViewDesc {
            format: self.rtv_dsv_format,
            dimension,
            flags,
        }
    }
}
