/// Render pass and framebuffer descriptors
///
/// Attachments stay in their attachment layout for the whole pass: the layout
/// tracker moves them there before the pass begins, so a render pass never
/// transitions anything itself.

use crate::backend::{FramebufferHandle, RenderPassHandle, TextureHandle};
use crate::resource::TextureFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// One attachment of a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDesc {
    pub format: TextureFormat,
    pub samples: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
}

impl AttachmentDesc {
    /// Single-sampled attachment cleared on load and stored at the end
    pub fn cleared(format: TextureFormat) -> Self {
        Self {
            format,
            samples: 1,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            stencil_load_op: LoadOp::DontCare,
            stencil_store_op: StoreOp::DontCare,
        }
    }

    /// Single-sampled attachment whose previous contents are kept
    pub fn loaded(format: TextureFormat) -> Self {
        Self {
            load_op: LoadOp::Load,
            ..Self::cleared(format)
        }
    }
}

/// Attachment layout of a render pass (structural cache key)
///
/// Color attachment order is significant: it is the fragment output location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPassDesc {
    pub color_attachments: Vec<AttachmentDesc>,
    pub depth_stencil_attachment: Option<AttachmentDesc>,
}

impl RenderPassDesc {
    pub fn attachment_count(&self) -> usize {
        self.color_attachments.len() + usize::from(self.depth_stencil_attachment.is_some())
    }
}

/// Cached render pass object
#[derive(Debug)]
pub struct RenderPass {
    pub handle: RenderPassHandle,
    pub desc: RenderPassDesc,
}

/// Framebuffer identity: render pass, attachment textures (colors then depth) and extent
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FramebufferKey {
    pub render_pass: RenderPassHandle,
    pub attachments: Vec<TextureHandle>,
    pub width: u32,
    pub height: u32,
}

/// Cached framebuffer object
#[derive(Debug)]
pub struct Framebuffer {
    pub handle: FramebufferHandle,
    pub key: FramebufferKey,
}
