/// Backend trait - the explicit graphics API the core drives
///
/// Implementations wrap one device and one queue. Every call either completes or
/// fails immediately with `BackendFailure` (or `ResourceExhausted` for pool and
/// memory limits); the core never retries.

use crate::backend::{
    BufferCopyRegion, BufferHandle, BufferTextureCopyRegion, ClearValue, CommandBufferHandle,
    CommandPoolHandle, DescriptorPoolHandle, DescriptorSetHandle, DescriptorWrite, FenceHandle,
    FramebufferHandle, IndexType, MemoryAllocation, MemoryRequirements, PipelineBindPoint,
    PipelineHandle, PipelineLayoutHandle, Rect2D, RenderPassHandle, SamplerHandle,
    SetLayoutHandle, ShaderModuleHandle, TextureHandle, Viewport,
};
use crate::error::Result;
use crate::pipeline::{
    BindingLayoutDesc, ComputePipelineState, DescriptorPoolSize, FramebufferKey, PipelineState,
    PushConstantRange, RenderPassDesc,
};
use crate::resource::{BufferDesc, SamplerDesc, ShaderStages, TextureDesc};
use crate::sync::{FenceStatus, ImageBarrier, ImageLayout, Timeout};

// ============================================================================
// Backend trait
// ============================================================================

/// Low-level graphics backend
///
/// Object creation, command recording and destruction calls. Destruction calls
/// cannot fail; implementations log problems instead.
pub trait Backend: Send + Sync {
    // ===== RESOURCES =====

    /// Create an unbound buffer
    fn create_buffer(&self, desc: &BufferDesc) -> Result<(BufferHandle, MemoryRequirements)>;

    fn bind_buffer_memory(&self, buffer: BufferHandle, memory: &MemoryAllocation) -> Result<()>;

    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Create an unbound texture
    fn create_texture(&self, desc: &TextureDesc) -> Result<(TextureHandle, MemoryRequirements)>;

    /// Bind memory, create the default view and move every subresource from
    /// `Undefined` to `initial_layout`
    ///
    /// Returns once the transition has completed on the GPU.
    fn bind_texture_memory(
        &self,
        texture: TextureHandle,
        memory: &MemoryAllocation,
        initial_layout: ImageLayout,
    ) -> Result<()>;

    fn destroy_texture(&self, texture: TextureHandle);

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle>;

    fn destroy_sampler(&self, sampler: SamplerHandle);

    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, code: &[u32]) -> Result<ShaderModuleHandle>;

    fn destroy_shader_module(&self, module: ShaderModuleHandle);

    // ===== LAYOUTS, PASSES, PIPELINES =====

    fn create_set_layout(&self, desc: &BindingLayoutDesc) -> Result<SetLayoutHandle>;

    fn destroy_set_layout(&self, layout: SetLayoutHandle);

    fn create_pipeline_layout(
        &self,
        set_layout: SetLayoutHandle,
        push_constants: &[PushConstantRange],
    ) -> Result<PipelineLayoutHandle>;

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle>;

    fn destroy_render_pass(&self, render_pass: RenderPassHandle);

    fn create_framebuffer(&self, key: &FramebufferKey) -> Result<FramebufferHandle>;

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);

    fn create_graphics_pipeline(&self, state: &PipelineState) -> Result<PipelineHandle>;

    fn create_compute_pipeline(&self, state: &ComputePipelineState) -> Result<PipelineHandle>;

    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    // ===== DESCRIPTORS =====

    /// Create a pool holding `max_sets` sets and `sizes` descriptors per type
    ///
    /// Sets allocated from the pool must be individually freeable.
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[DescriptorPoolSize],
    ) -> Result<DescriptorPoolHandle>;

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: SetLayoutHandle,
    ) -> Result<DescriptorSetHandle>;

    fn free_descriptor_set(&self, pool: DescriptorPoolHandle, set: DescriptorSetHandle) -> Result<()>;

    /// Apply a batch of descriptor writes in one call
    ///
    /// Either every write is applied or an error is returned.
    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) -> Result<()>;

    // ===== COMMAND BUFFERS =====

    fn create_command_pool(&self) -> Result<CommandPoolHandle>;

    /// Destroys the pool and every command buffer allocated from it
    fn destroy_command_pool(&self, pool: CommandPoolHandle);

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle>;

    fn reset_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()>;

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()>;

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()>;

    // ===== RECORDING =====

    fn cmd_begin_render_pass(
        &self,
        cmd: CommandBufferHandle,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        render_area: Rect2D,
        clear_values: &[ClearValue],
    );

    fn cmd_end_render_pass(&self, cmd: CommandBufferHandle);

    fn cmd_bind_pipeline(&self, cmd: CommandBufferHandle, bind_point: PipelineBindPoint, pipeline: PipelineHandle);

    fn cmd_set_viewports(&self, cmd: CommandBufferHandle, viewports: &[Viewport]);

    fn cmd_set_scissors(&self, cmd: CommandBufferHandle, scissors: &[Rect2D]);

    fn cmd_bind_descriptor_set(
        &self,
        cmd: CommandBufferHandle,
        bind_point: PipelineBindPoint,
        layout: PipelineLayoutHandle,
        set: DescriptorSetHandle,
    );

    fn cmd_bind_vertex_buffer(&self, cmd: CommandBufferHandle, binding: u32, buffer: BufferHandle, offset: u64);

    fn cmd_bind_index_buffer(&self, cmd: CommandBufferHandle, buffer: BufferHandle, offset: u64, index_type: IndexType);

    fn cmd_push_constants(
        &self,
        cmd: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    );

    fn cmd_draw(&self, cmd: CommandBufferHandle, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    fn cmd_draw_indexed(
        &self,
        cmd: CommandBufferHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    fn cmd_dispatch(&self, cmd: CommandBufferHandle, x: u32, y: u32, z: u32);

    /// Record a batch of image layout transitions
    ///
    /// Either every barrier is recorded or an error is returned.
    fn cmd_pipeline_barrier(&self, cmd: CommandBufferHandle, barriers: &[ImageBarrier]) -> Result<()>;

    fn cmd_copy_buffer(&self, cmd: CommandBufferHandle, src: BufferHandle, dst: BufferHandle, regions: &[BufferCopyRegion]);

    /// Copy into a texture in `TransferDst` layout
    fn cmd_copy_buffer_to_texture(
        &self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        dst: TextureHandle,
        regions: &[BufferTextureCopyRegion],
    );

    /// Copy out of a texture in `TransferSrc` layout
    fn cmd_copy_texture_to_buffer(
        &self,
        cmd: CommandBufferHandle,
        src: TextureHandle,
        dst: BufferHandle,
        regions: &[BufferTextureCopyRegion],
    );

    // ===== SUBMISSION =====

    /// Submit a finished command buffer to the queue; the returned fence signals on completion
    fn submit(&self, cmd: CommandBufferHandle) -> Result<FenceHandle>;

    fn wait_fence(&self, fence: FenceHandle, timeout: Timeout) -> Result<FenceStatus>;

    fn destroy_fence(&self, fence: FenceHandle);
}
