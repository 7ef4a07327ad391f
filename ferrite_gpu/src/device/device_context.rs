/// Device context - owner of every per-device cache
///
/// The context is the single entry point of the core: it creates resources,
/// resolves cached objects, hands out command recorders and submits their work.
/// Recorders keep the shared state alive; teardown runs when the context and
/// every recorder are gone, in reverse dependency order.

use std::sync::Arc;
use crate::backend::{Backend, FenceHandle, MemoryAllocator, MemoryUsage};
use crate::cache::{
    CommandPoolCache, CommandPoolFactory, FramebufferCache, FramebufferFactory, PipelineCache,
    PipelineFactory, PipelineLayout, PipelineLayoutCache, PipelineLayoutFactory, RenderPassCache,
    RenderPassFactory, SamplerCache, SamplerFactory, SetLayout, SetLayoutCache, SetLayoutFactory,
    WorkerToken,
};
use crate::config::DeviceConfig;
use crate::error::Result;
use crate::pipeline::{BindingLayoutDesc, PipelineLayoutDesc, RenderPass, RenderPassDesc};
use crate::recorder::CommandRecorder;
use crate::resource::{
    Buffer, BufferDesc, Sampler, SamplerDesc, ShaderModule, ShaderStage, Texture, TextureDesc,
};
use crate::sync::{FenceStatus, Timeout};

/// State shared by a context and its recorders
pub(crate) struct DeviceShared {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) allocator: Arc<dyn MemoryAllocator>,
    pub(crate) config: DeviceConfig,
    pub(crate) samplers: SamplerCache,
    pub(crate) set_layouts: Arc<SetLayoutCache>,
    pub(crate) pipeline_layouts: PipelineLayoutCache,
    pub(crate) render_passes: RenderPassCache,
    pub(crate) framebuffers: Arc<FramebufferCache>,
    pub(crate) pipelines: PipelineCache,
    pub(crate) command_pools: CommandPoolCache,
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        let command_pools = self.command_pools.clear();

        let mut descriptor_layouts = 0;
        if let Err(err) = self.set_layouts.for_each(|layout| {
            layout.allocator().destroy_pools();
            descriptor_layouts += 1;
        }) {
            crate::ferrite_warn!("ferrite::device", "Descriptor pools not destroyed: {}", err);
        }

        let pipeline_layouts = self.pipeline_layouts.clear();
        let set_layouts = self.set_layouts.clear();
        let pipelines = self.pipelines.clear();
        let framebuffers = self.framebuffers.clear();
        let render_passes = self.render_passes.clear();
        let samplers = self.samplers.clear();

        crate::ferrite_info!(
            "ferrite::device",
            "Device teardown: {} command pool(s), descriptor pools of {} layout(s), {} pipeline layout(s), {} set layout(s), {} pipeline(s), {} framebuffer(s), {} render pass(es), {} sampler(s)",
            command_pools, descriptor_layouts, pipeline_layouts, set_layouts, pipelines,
            framebuffers, render_passes, samplers
        );
    }
}

/// Explicit device context
pub struct DeviceContext {
    shared: Arc<DeviceShared>,
}

impl DeviceContext {
    pub fn new(
        backend: Arc<dyn Backend>,
        allocator: Arc<dyn MemoryAllocator>,
        config: DeviceConfig,
    ) -> Self {
        let set_layouts = Arc::new(SetLayoutCache::new(SetLayoutFactory::new(
            Arc::clone(&backend),
            config.clone(),
        )));

        let shared = DeviceShared {
            samplers: SamplerCache::new(SamplerFactory::new(Arc::clone(&backend))),
            pipeline_layouts: PipelineLayoutCache::new(PipelineLayoutFactory::new(
                Arc::clone(&backend),
                Arc::clone(&set_layouts),
            )),
            set_layouts,
            render_passes: RenderPassCache::new(RenderPassFactory::new(Arc::clone(&backend))),
            framebuffers: Arc::new(FramebufferCache::new(FramebufferFactory::new(Arc::clone(&backend)))),
            pipelines: PipelineCache::new(PipelineFactory::new(Arc::clone(&backend))),
            command_pools: CommandPoolCache::new(CommandPoolFactory::new(Arc::clone(&backend))),
            backend,
            allocator,
            config,
        };

        crate::ferrite_info!(
            "ferrite::device",
            "Device context created ({} sets per descriptor pool)",
            shared.config.sets_per_pool
        );

        Self { shared: Arc::new(shared) }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.shared.backend
    }

    pub(crate) fn shared(&self) -> &Arc<DeviceShared> {
        &self.shared
    }

    // ===== RESOURCES =====

    /// Create a texture resting in its usage-derived default layout
    pub fn create_texture(&self, desc: TextureDesc) -> Result<Arc<Texture>> {
        let extent = desc.extent;
        if extent.width == 0 || extent.height == 0 || extent.depth == 0 {
            crate::ferrite_invalid!(
                "ferrite::device",
                "Texture extent must be non-zero, got {}x{}x{}",
                extent.width, extent.height, extent.depth
            );
        }

        let backend = &self.shared.backend;
        let allocator = &self.shared.allocator;

        let (handle, requirements) = backend.create_texture(&desc)?;
        let memory = match allocator.allocate(MemoryUsage::GpuOnly, &requirements) {
            Ok(memory) => memory,
            Err(err) => {
                backend.destroy_texture(handle);
                return Err(err);
            }
        };
        if let Err(err) = backend.bind_texture_memory(handle, &memory, desc.default_layout()) {
            backend.destroy_texture(handle);
            allocator.free(&memory);
            return Err(err);
        }

        let texture = Texture::new(handle, desc, memory, Arc::clone(backend), Arc::clone(allocator))
            .with_framebuffers(&self.shared.framebuffers);
        Ok(Arc::new(texture))
    }

    pub fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<Buffer>> {
        if desc.size == 0 {
            crate::ferrite_invalid!("ferrite::device", "Buffer size must be non-zero");
        }

        let backend = &self.shared.backend;
        let allocator = &self.shared.allocator;

        let (handle, requirements) = backend.create_buffer(&desc)?;
        let memory = match allocator.allocate(desc.memory, &requirements) {
            Ok(memory) => memory,
            Err(err) => {
                backend.destroy_buffer(handle);
                return Err(err);
            }
        };
        if let Err(err) = backend.bind_buffer_memory(handle, &memory) {
            backend.destroy_buffer(handle);
            allocator.free(&memory);
            return Err(err);
        }

        Ok(Arc::new(Buffer::new(
            handle,
            desc,
            memory,
            Arc::clone(backend),
            Arc::clone(allocator),
        )))
    }

    /// Create a shader module from compiled SPIR-V
    pub fn create_shader(&self, stage: ShaderStage, code: &[u32]) -> Result<Arc<ShaderModule>> {
        if code.is_empty() {
            crate::ferrite_invalid!("ferrite::device", "Shader code is empty");
        }
        let handle = self.shared.backend.create_shader_module(code)?;
        Ok(Arc::new(ShaderModule::new(handle, stage, Arc::clone(&self.shared.backend))))
    }

    // ===== CACHED OBJECTS =====

    pub fn sampler(&self, desc: &SamplerDesc) -> Result<Arc<Sampler>> {
        self.shared.samplers.resolve(desc)
    }

    pub fn set_layout(&self, desc: &BindingLayoutDesc) -> Result<Arc<SetLayout>> {
        self.shared.set_layouts.resolve(desc)
    }

    pub fn pipeline_layout(&self, desc: &PipelineLayoutDesc) -> Result<Arc<PipelineLayout>> {
        self.shared.pipeline_layouts.resolve(desc)
    }

    pub fn render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<RenderPass>> {
        self.shared.render_passes.resolve(desc)
    }

    // ===== RECORDING =====

    /// Recorder bound to `worker`, which must be the calling thread's token
    pub fn create_recorder(&self, worker: &WorkerToken) -> Result<CommandRecorder> {
        worker.check_thread("create_recorder")?;
        let pool = self.shared.command_pools.get(worker)?;
        Ok(CommandRecorder::new(Arc::clone(&self.shared), worker.clone(), pool))
    }

    /// Submit an ended recording
    ///
    /// The recorder must not be reset before the returned fence has signaled.
    pub fn submit(&self, recorder: &CommandRecorder) -> Result<Fence> {
        let cmd = recorder.finished_commands()?;
        let handle = self.shared.backend.submit(cmd)?;
        Ok(Fence {
            handle,
            default_timeout: self.shared.config.default_fence_timeout,
            backend: Arc::clone(&self.shared.backend),
        })
    }
}

/// Completion fence of one submission, destroyed when dropped
pub struct Fence {
    handle: FenceHandle,
    default_timeout: Timeout,
    backend: Arc<dyn Backend>,
}

impl Fence {
    pub fn handle(&self) -> FenceHandle {
        self.handle
    }

    /// Block until the fence signals or `timeout` elapses
    pub fn wait(&self, timeout: Timeout) -> Result<FenceStatus> {
        self.backend.wait_fence(self.handle, timeout)
    }

    /// Wait with the configured default timeout
    pub fn wait_default(&self) -> Result<FenceStatus> {
        self.wait(self.default_timeout)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.backend.destroy_fence(self.handle);
    }
}

#[cfg(test)]
#[path = "device_context_tests.rs"]
mod tests;
