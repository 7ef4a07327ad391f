/// Concrete structural caches: samplers, layouts, render passes, framebuffers, pipelines

use std::sync::Arc;
use crate::backend::{Backend, PipelineLayoutHandle, SetLayoutHandle, TextureHandle};
use crate::cache::{CacheFactory, StructuralCache};
use crate::config::DeviceConfig;
use crate::descriptor::PooledSetAllocator;
use crate::error::Result;
use crate::pipeline::{
    BindingLayoutDesc, Framebuffer, FramebufferKey, Pipeline, PipelineKey, PipelineLayoutDesc,
    RenderPass, RenderPassDesc,
};
use crate::resource::{Sampler, SamplerDesc};

// ============================================================================
// Cached layout objects
// ============================================================================

/// Cached descriptor set layout, owning the allocator for its sets
pub struct SetLayout {
    pub handle: SetLayoutHandle,
    pub desc: BindingLayoutDesc,
    allocator: PooledSetAllocator,
}

impl SetLayout {
    pub fn allocator(&self) -> &PooledSetAllocator {
        &self.allocator
    }
}

impl std::fmt::Debug for SetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetLayout")
            .field("handle", &self.handle)
            .field("desc", &self.desc)
            .finish()
    }
}

/// Cached pipeline layout
#[derive(Debug)]
pub struct PipelineLayout {
    pub handle: PipelineLayoutHandle,
    pub desc: PipelineLayoutDesc,
    pub set_layout: Arc<SetLayout>,
}

// ============================================================================
// Factories
// ============================================================================

pub struct SamplerFactory {
    backend: Arc<dyn Backend>,
}

impl SamplerFactory {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl CacheFactory for SamplerFactory {
    type Key = SamplerDesc;
    type Value = Arc<Sampler>;

    fn name(&self) -> &'static str {
        "sampler"
    }

    fn create_cached(&self, key: &SamplerDesc) -> Result<Arc<Sampler>> {
        let handle = self.backend.create_sampler(key)?;
        Ok(Arc::new(Sampler { handle, desc: *key }))
    }

    fn destroy_cached(&self, value: &Arc<Sampler>) {
        self.backend.destroy_sampler(value.handle);
    }
}

pub struct SetLayoutFactory {
    backend: Arc<dyn Backend>,
    config: DeviceConfig,
}

impl SetLayoutFactory {
    pub fn new(backend: Arc<dyn Backend>, config: DeviceConfig) -> Self {
        Self { backend, config }
    }
}

impl CacheFactory for SetLayoutFactory {
    type Key = BindingLayoutDesc;
    type Value = Arc<SetLayout>;

    fn name(&self) -> &'static str {
        "set layout"
    }

    fn create_cached(&self, key: &BindingLayoutDesc) -> Result<Arc<SetLayout>> {
        let handle = self.backend.create_set_layout(key)?;
        let allocator = PooledSetAllocator::new(
            Arc::clone(&self.backend),
            handle,
            &key.descriptor_counts(),
            &self.config,
        );
        Ok(Arc::new(SetLayout { handle, desc: key.clone(), allocator }))
    }

    fn destroy_cached(&self, value: &Arc<SetLayout>) {
        value.allocator.destroy_pools();
        self.backend.destroy_set_layout(value.handle);
    }
}

pub struct PipelineLayoutFactory {
    backend: Arc<dyn Backend>,
    set_layouts: Arc<SetLayoutCache>,
}

impl PipelineLayoutFactory {
    pub fn new(backend: Arc<dyn Backend>, set_layouts: Arc<SetLayoutCache>) -> Self {
        Self { backend, set_layouts }
    }
}

impl CacheFactory for PipelineLayoutFactory {
    type Key = PipelineLayoutDesc;
    type Value = Arc<PipelineLayout>;

    fn name(&self) -> &'static str {
        "pipeline layout"
    }

    fn create_cached(&self, key: &PipelineLayoutDesc) -> Result<Arc<PipelineLayout>> {
        let set_layout = self.set_layouts.get(key.bindings())?;
        match self.backend.create_pipeline_layout(set_layout.handle, key.push_constants()) {
            Ok(handle) => Ok(Arc::new(PipelineLayout { handle, desc: key.clone(), set_layout })),
            Err(err) => {
                self.set_layouts.release(key.bindings())?;
                Err(err)
            }
        }
    }

    fn destroy_cached(&self, value: &Arc<PipelineLayout>) {
        self.backend.destroy_pipeline_layout(value.handle);
        if let Err(err) = self.set_layouts.release(value.desc.bindings()) {
            crate::ferrite_warn!("ferrite::cache", "Set layout of a pipeline layout not released: {}", err);
        }
    }
}

pub struct RenderPassFactory {
    backend: Arc<dyn Backend>,
}

impl RenderPassFactory {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl CacheFactory for RenderPassFactory {
    type Key = RenderPassDesc;
    type Value = Arc<RenderPass>;

    fn name(&self) -> &'static str {
        "render pass"
    }

    fn create_cached(&self, key: &RenderPassDesc) -> Result<Arc<RenderPass>> {
        let handle = self.backend.create_render_pass(key)?;
        Ok(Arc::new(RenderPass { handle, desc: key.clone() }))
    }

    fn destroy_cached(&self, value: &Arc<RenderPass>) {
        self.backend.destroy_render_pass(value.handle);
    }
}

pub struct FramebufferFactory {
    backend: Arc<dyn Backend>,
}

impl FramebufferFactory {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl CacheFactory for FramebufferFactory {
    type Key = FramebufferKey;
    type Value = Arc<Framebuffer>;

    fn name(&self) -> &'static str {
        "framebuffer"
    }

    fn create_cached(&self, key: &FramebufferKey) -> Result<Arc<Framebuffer>> {
        let handle = self.backend.create_framebuffer(key)?;
        Ok(Arc::new(Framebuffer { handle, key: key.clone() }))
    }

    fn destroy_cached(&self, value: &Arc<Framebuffer>) {
        self.backend.destroy_framebuffer(value.handle);
    }
}

impl StructuralCache<FramebufferFactory> {
    /// Destroy every framebuffer built on `texture`
    ///
    /// Called when the texture goes away, so its handle can be reused safely.
    pub fn evict_attachment(&self, texture: TextureHandle) -> usize {
        match self.evict(|key| key.attachments.contains(&texture)) {
            Ok(count) => {
                if count > 0 {
                    crate::ferrite_trace!(
                        "ferrite::cache",
                        "Evicted {} framebuffer(s) of texture {:?}",
                        count, texture
                    );
                }
                count
            }
            Err(err) => {
                crate::ferrite_warn!(
                    "ferrite::cache",
                    "Framebuffers of texture {:?} not evicted: {}",
                    texture, err
                );
                0
            }
        }
    }
}

/// Graphics and compute pipelines share one cache
pub struct PipelineFactory {
    backend: Arc<dyn Backend>,
}

impl PipelineFactory {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl CacheFactory for PipelineFactory {
    type Key = PipelineKey;
    type Value = Arc<Pipeline>;

    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn create_cached(&self, key: &PipelineKey) -> Result<Arc<Pipeline>> {
        let handle = match key {
            PipelineKey::Graphics(state) => self.backend.create_graphics_pipeline(state)?,
            PipelineKey::Compute(state) => self.backend.create_compute_pipeline(state)?,
        };
        Ok(Arc::new(Pipeline { handle, key: key.clone() }))
    }

    fn destroy_cached(&self, value: &Arc<Pipeline>) {
        self.backend.destroy_pipeline(value.handle);
    }
}

pub type SamplerCache = StructuralCache<SamplerFactory>;
pub type SetLayoutCache = StructuralCache<SetLayoutFactory>;
pub type PipelineLayoutCache = StructuralCache<PipelineLayoutFactory>;
pub type RenderPassCache = StructuralCache<RenderPassFactory>;
pub type FramebufferCache = StructuralCache<FramebufferFactory>;
pub type PipelineCache = StructuralCache<PipelineFactory>;

#[cfg(test)]
#[path = "factories_tests.rs"]
mod tests;
