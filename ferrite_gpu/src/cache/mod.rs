/// Structural caches of backend objects

pub mod structural_cache;
pub mod factories;
pub mod command_pool;

pub use structural_cache::{CacheFactory, CacheStats, StructuralCache};
pub use factories::{
    SetLayout, PipelineLayout,
    SamplerFactory, SetLayoutFactory, PipelineLayoutFactory, RenderPassFactory,
    FramebufferFactory, PipelineFactory,
    SamplerCache, SetLayoutCache, PipelineLayoutCache, RenderPassCache, FramebufferCache,
    PipelineCache,
};
pub use command_pool::{CommandPool, CommandPoolCache, CommandPoolFactory, WorkerToken};
