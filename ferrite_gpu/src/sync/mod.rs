/// Synchronization: layouts, barriers, layout tracking and fences

pub mod barrier;
pub mod fence;
pub mod layout_tracker;

pub use barrier::{
    ImageLayout, PipelineStages, AccessFlags, SyncScope, ImageBarrier,
    source_scope, destination_scope,
};
pub use fence::{Timeout, FenceStatus};
pub use layout_tracker::{ImageLayoutTracker, SubresourceGrid};
