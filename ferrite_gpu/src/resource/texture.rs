/// Texture descriptor and texture resource

use std::sync::{Arc, Weak};
use bitflags::bitflags;
use crate::backend::{Backend, MemoryAllocation, MemoryAllocator, TextureHandle};
use crate::cache::FramebufferCache;
use crate::sync::ImageLayout;

bitflags! {
    /// How a texture may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
    }
}

bitflags! {
    /// Aspects of an image addressed by a barrier or copy
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAspect: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Texture formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8_UNORM,
    R8G8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,
    R32_SFLOAT,
    R32G32B32A32_SFLOAT,
    D16_UNORM,
    D32_SFLOAT,
    D24_UNORM_S8_UINT,
    D32_SFLOAT_S8_UINT,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::D16_UNORM
                | TextureFormat::D32_SFLOAT
                | TextureFormat::D24_UNORM_S8_UINT
                | TextureFormat::D32_SFLOAT_S8_UINT
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(
            self,
            TextureFormat::D24_UNORM_S8_UINT | TextureFormat::D32_SFLOAT_S8_UINT
        )
    }

    /// Aspects covered by a full-image barrier
    pub fn aspect(&self) -> ImageAspect {
        if self.has_stencil() {
            ImageAspect::DEPTH | ImageAspect::STENCIL
        } else if self.is_depth() {
            ImageAspect::DEPTH
        } else {
            ImageAspect::COLOR
        }
    }

    /// Size of one texel in bytes
    pub fn texel_size(&self) -> u32 {
        match self {
            TextureFormat::R8_UNORM => 1,
            TextureFormat::R8G8_UNORM | TextureFormat::D16_UNORM => 2,
            TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::B8G8R8A8_SRGB
            | TextureFormat::R32_SFLOAT
            | TextureFormat::D32_SFLOAT
            | TextureFormat::D24_UNORM_S8_UINT => 4,
            TextureFormat::R16G16B16A16_SFLOAT | TextureFormat::D32_SFLOAT_S8_UINT => 8,
            TextureFormat::R32G32B32A32_SFLOAT => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3D {
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self { width, height, depth }
    }
}

/// Texture creation descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub dimension: TextureDimension,
    pub extent: Extent3D,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: u32,
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Single-mip, single-layer 2D texture
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            dimension: TextureDimension::D2,
            extent: Extent3D::new(width, height, 1),
            format,
            mip_levels: 1,
            array_layers: 1,
            samples: 1,
            usage,
        }
    }

    pub fn new_3d(
        width: u32,
        height: u32,
        depth: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            dimension: TextureDimension::D3,
            extent: Extent3D::new(width, height, depth),
            ..Self::new_2d(width, height, format, usage)
        }
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }

    pub fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers.max(1);
        self
    }

    /// Layer axis of the layout grid: array layers, extended by depth for 3D textures
    pub fn tracked_layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D3 => self.array_layers * self.extent.depth.max(1),
            _ => self.array_layers,
        }
    }

    /// Layout a texture rests in between recordings
    ///
    /// Precedence: color attachment, depth/stencil attachment, storage, sampled,
    /// transfer destination, transfer source.
    pub fn default_layout(&self) -> ImageLayout {
        let usage = self.usage;
        if usage.contains(TextureUsage::COLOR_ATTACHMENT) {
            ImageLayout::ColorAttachment
        } else if usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT) {
            ImageLayout::DepthStencilAttachment
        } else if usage.contains(TextureUsage::STORAGE) {
            ImageLayout::General
        } else if usage.contains(TextureUsage::SAMPLED) {
            ImageLayout::ShaderReadOnly
        } else if usage.contains(TextureUsage::TRANSFER_DST) {
            ImageLayout::TransferDst
        } else if usage.contains(TextureUsage::TRANSFER_SRC) {
            ImageLayout::TransferSrc
        } else {
            ImageLayout::Undefined
        }
    }

    /// Full subresource range in layout-grid coordinates
    pub fn full_range(&self) -> SubresourceRange {
        SubresourceRange::new(0, self.mip_levels, 0, self.tracked_layers())
    }
}

/// Range of (mip, layer) subresources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    pub fn new(base_mip: u32, mip_count: u32, base_layer: u32, layer_count: u32) -> Self {
        Self { base_mip, mip_count, base_layer, layer_count }
    }

    /// Range covering exactly one subresource
    pub fn single(mip: u32, layer: u32) -> Self {
        Self::new(mip, 1, layer, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.mip_count == 0 || self.layer_count == 0
    }

    /// Every (mip, layer) pair of the range, mip-major
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> {
        let layers = self.base_layer..self.base_layer + self.layer_count;
        (self.base_mip..self.base_mip + self.mip_count)
            .flat_map(move |mip| layers.clone().map(move |layer| (mip, layer)))
    }
}

/// GPU texture
///
/// Destroys the backend image and frees its memory when dropped.
pub struct Texture {
    handle: TextureHandle,
    desc: TextureDesc,
    default_layout: ImageLayout,
    memory: MemoryAllocation,
    backend: Arc<dyn Backend>,
    allocator: Arc<dyn MemoryAllocator>,
    /// Framebuffers built on this texture die with it
    framebuffers: Option<Weak<FramebufferCache>>,
}

impl Texture {
    pub(crate) fn new(
        handle: TextureHandle,
        desc: TextureDesc,
        memory: MemoryAllocation,
        backend: Arc<dyn Backend>,
        allocator: Arc<dyn MemoryAllocator>,
    ) -> Self {
        let default_layout = desc.default_layout();
        Self { handle, desc, default_layout, memory, backend, allocator, framebuffers: None }
    }

    pub(crate) fn with_framebuffers(mut self, framebuffers: &Arc<FramebufferCache>) -> Self {
        self.framebuffers = Some(Arc::downgrade(framebuffers));
        self
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn default_layout(&self) -> ImageLayout {
        self.default_layout
    }

    pub fn aspect(&self) -> ImageAspect {
        self.desc.format.aspect()
    }

    pub fn memory(&self) -> &MemoryAllocation {
        &self.memory
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("handle", &self.handle)
            .field("desc", &self.desc)
            .finish()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(framebuffers) = self.framebuffers.as_ref().and_then(Weak::upgrade) {
            framebuffers.evict_attachment(self.handle);
        }
        self.backend.destroy_texture(self.handle);
        self.allocator.free(&self.memory);
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
