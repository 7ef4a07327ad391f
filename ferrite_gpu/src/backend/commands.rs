/// Plain data passed to backend recording calls

use crate::backend::{BufferHandle, DescriptorSetHandle, SamplerHandle, TextureHandle};
use crate::pipeline::DescriptorType;
use crate::resource::{ImageAspect, TextureDesc, TextureDimension};
use crate::sync::ImageLayout;

/// Viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-extent viewport with the [0, 1] depth range
    pub fn from_extent(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// 2D rectangle (scissor, render area)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn from_extent(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// Clear value for one attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
}

/// Resource written into one descriptor slot
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorResource {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    },
    Texture {
        texture: TextureHandle,
        sampler: Option<SamplerHandle>,
        layout: ImageLayout,
    },
}

/// One entry of a batched descriptor set update
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorWrite {
    pub set: DescriptorSetHandle,
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub resource: DescriptorResource,
}

/// Region of a buffer to buffer copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopyRegion {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

/// Region of a buffer to texture or texture to buffer copy
///
/// `buffer_row_length` of 0 means tightly packed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTextureCopyRegion {
    pub buffer_offset: u64,
    pub buffer_row_length: u32,
    pub aspect: ImageAspect,
    pub mip_level: u32,
    pub base_layer: u32,
    pub layer_count: u32,
    pub texture_offset: [i32; 3],
    pub texture_extent: [u32; 3],
}

impl BufferTextureCopyRegion {
    /// Every layer of one mip level, tightly packed from `buffer_offset`
    ///
    /// Depth formats copy the depth aspect only.
    pub fn whole_mip(desc: &TextureDesc, mip_level: u32, buffer_offset: u64) -> Self {
        let extent = |size: u32| (size >> mip_level).max(1);
        let depth = match desc.dimension {
            TextureDimension::D3 => extent(desc.extent.depth),
            _ => 1,
        };
        Self {
            buffer_offset,
            buffer_row_length: 0,
            aspect: if desc.format.is_depth() { ImageAspect::DEPTH } else { ImageAspect::COLOR },
            mip_level,
            base_layer: 0,
            layer_count: desc.array_layers,
            texture_offset: [0, 0, 0],
            texture_extent: [extent(desc.extent.width), extent(desc.extent.height), depth],
        }
    }
}
