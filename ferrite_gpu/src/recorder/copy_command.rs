//! Transfer commands accepted by [`CommandRecorder::copy`](crate::recorder::CommandRecorder::copy)

use std::sync::Arc;
use crate::backend::{BufferCopyRegion, BufferTextureCopyRegion};
use crate::resource::{Buffer, Filter, Texture};

#[derive(Debug, Clone)]
pub enum CopyCommand {
    BufferToBuffer {
        src: Arc<Buffer>,
        dst: Arc<Buffer>,
        regions: Vec<BufferCopyRegion>,
    },
    BufferToTexture {
        src: Arc<Buffer>,
        dst: Arc<Texture>,
        regions: Vec<BufferTextureCopyRegion>,
    },
    TextureToBuffer {
        src: Arc<Texture>,
        dst: Arc<Buffer>,
        regions: Vec<BufferTextureCopyRegion>,
    },
    /// Multisample resolve (not supported)
    Resolve {
        src: Arc<Texture>,
        dst: Arc<Texture>,
    },
    /// Scaled, filtered copy (not supported)
    Blit {
        src: Arc<Texture>,
        dst: Arc<Texture>,
        filter: Filter,
    },
}

impl CopyCommand {
    /// Whole-buffer copy; the destination must be at least as large as the source
    pub fn whole_buffer(src: &Arc<Buffer>, dst: &Arc<Buffer>) -> Self {
        CopyCommand::BufferToBuffer {
            src: Arc::clone(src),
            dst: Arc::clone(dst),
            regions: vec![BufferCopyRegion { src_offset: 0, dst_offset: 0, size: src.size() }],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CopyCommand::BufferToBuffer { .. } => "buffer to buffer",
            CopyCommand::BufferToTexture { .. } => "buffer to texture",
            CopyCommand::TextureToBuffer { .. } => "texture to buffer",
            CopyCommand::Resolve { .. } => "resolve",
            CopyCommand::Blit { .. } => "blit",
        }
    }
}
