/// Image layouts, pipeline stages, access masks and image barriers
///
/// Source and destination scopes of a barrier are a pure function of the
/// (old layout, new layout) pair: see [`source_scope`] and [`destination_scope`].

use bitflags::bitflags;
use crate::backend::TextureHandle;
use crate::resource::{ImageAspect, SubresourceRange};

/// GPU-visible interpretation of a texture's memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents are undefined (initial layout of every image)
    Undefined,
    /// Any access, used for storage images
    General,
    ColorAttachment,
    DepthStencilAttachment,
    /// Depth test reads and shader reads of a depth texture
    DepthStencilReadOnly,
    /// Sampled in shaders
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
}

bitflags! {
    /// Pipeline stages taking part in a dependency
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 4;
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        const LATE_FRAGMENT_TESTS = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const COMPUTE_SHADER = 1 << 8;
        const TRANSFER = 1 << 9;
        const BOTTOM_OF_PIPE = 1 << 10;
        const ALL_COMMANDS = 1 << 11;
    }
}

bitflags! {
    /// Memory accesses made available or visible by a dependency
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const SHADER_READ = 1 << 0;
        const SHADER_WRITE = 1 << 1;
        const COLOR_ATTACHMENT_READ = 1 << 2;
        const COLOR_ATTACHMENT_WRITE = 1 << 3;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 5;
        const TRANSFER_READ = 1 << 6;
        const TRANSFER_WRITE = 1 << 7;
        const MEMORY_READ = 1 << 8;
        const MEMORY_WRITE = 1 << 9;
    }
}

/// One side of a dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncScope {
    pub stages: PipelineStages,
    pub access: AccessFlags,
}

impl SyncScope {
    const fn new(stages: PipelineStages, access: AccessFlags) -> Self {
        Self { stages, access }
    }
}

const SHADER_STAGES: PipelineStages = PipelineStages::VERTEX_SHADER
    .union(PipelineStages::FRAGMENT_SHADER)
    .union(PipelineStages::COMPUTE_SHADER);
const DEPTH_TEST_STAGES: PipelineStages =
    PipelineStages::EARLY_FRAGMENT_TESTS.union(PipelineStages::LATE_FRAGMENT_TESTS);

/// Work that must finish before a subresource leaves `layout`
///
/// Only writes need to be made available; reads only need the execution dependency.
pub fn source_scope(layout: ImageLayout) -> SyncScope {
    match layout {
        ImageLayout::Undefined => SyncScope::new(PipelineStages::TOP_OF_PIPE, AccessFlags::empty()),
        ImageLayout::General => SyncScope::new(SHADER_STAGES, AccessFlags::SHADER_WRITE),
        ImageLayout::ColorAttachment => SyncScope::new(
            PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        ImageLayout::DepthStencilAttachment => {
            SyncScope::new(DEPTH_TEST_STAGES, AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        }
        ImageLayout::DepthStencilReadOnly => SyncScope::new(
            DEPTH_TEST_STAGES.union(PipelineStages::FRAGMENT_SHADER),
            AccessFlags::empty(),
        ),
        ImageLayout::ShaderReadOnly => SyncScope::new(SHADER_STAGES, AccessFlags::empty()),
        ImageLayout::TransferSrc => SyncScope::new(PipelineStages::TRANSFER, AccessFlags::empty()),
        ImageLayout::TransferDst => {
            SyncScope::new(PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE)
        }
    }
}

/// Work that must wait until a subresource has entered `layout`
pub fn destination_scope(layout: ImageLayout) -> SyncScope {
    match layout {
        ImageLayout::Undefined => SyncScope::new(PipelineStages::TOP_OF_PIPE, AccessFlags::empty()),
        ImageLayout::General => SyncScope::new(
            SHADER_STAGES,
            AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
        ),
        ImageLayout::ColorAttachment => SyncScope::new(
            PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        ImageLayout::DepthStencilAttachment => SyncScope::new(
            DEPTH_TEST_STAGES,
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        ImageLayout::DepthStencilReadOnly => SyncScope::new(
            DEPTH_TEST_STAGES.union(PipelineStages::FRAGMENT_SHADER),
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::SHADER_READ,
        ),
        ImageLayout::ShaderReadOnly => SyncScope::new(SHADER_STAGES, AccessFlags::SHADER_READ),
        ImageLayout::TransferSrc => {
            SyncScope::new(PipelineStages::TRANSFER, AccessFlags::TRANSFER_READ)
        }
        ImageLayout::TransferDst => {
            SyncScope::new(PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE)
        }
    }
}

/// Layout transition of a subresource range of one texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBarrier {
    pub texture: TextureHandle,
    pub aspect: ImageAspect,
    pub range: SubresourceRange,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src: SyncScope,
    pub dst: SyncScope,
}

impl ImageBarrier {
    /// Barrier with scopes looked up from the layout pair
    pub fn new(
        texture: TextureHandle,
        aspect: ImageAspect,
        range: SubresourceRange,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    ) -> Self {
        Self {
            texture,
            aspect,
            range,
            old_layout,
            new_layout,
            src: source_scope(old_layout),
            dst: destination_scope(new_layout),
        }
    }
}

#[cfg(test)]
#[path = "barrier_tests.rs"]
mod tests;
