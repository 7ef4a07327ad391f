/// Mock backend for unit tests (no GPU required)
///
/// Hands out increasing handles, records every recording call, counts object
/// creation and destruction per kind, and can be told to fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::backend::*;
use crate::error::{Error, Result};
use crate::pipeline::{
    BindingLayoutDesc, ComputePipelineState, DescriptorPoolSize, FramebufferKey, PipelineState,
    PushConstantRange, RenderPassDesc,
};
use crate::resource::{BufferDesc, SamplerDesc, ShaderStages, TextureDesc};
use crate::sync::{FenceStatus, ImageBarrier, ImageLayout, Timeout};

// ============================================================================
// Recorded calls
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    BeginCommandBuffer(CommandBufferHandle),
    EndCommandBuffer(CommandBufferHandle),
    ResetCommandBuffer(CommandBufferHandle),
    BeginRenderPass {
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        render_area: Rect2D,
        clear_count: usize,
    },
    EndRenderPass,
    BindPipeline {
        bind_point: PipelineBindPoint,
        pipeline: PipelineHandle,
    },
    SetViewports(Vec<Viewport>),
    SetScissors(Vec<Rect2D>),
    BindDescriptorSet {
        bind_point: PipelineBindPoint,
        layout: PipelineLayoutHandle,
        set: DescriptorSetHandle,
    },
    BindVertexBuffer {
        binding: u32,
        buffer: BufferHandle,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: BufferHandle,
        offset: u64,
        index_type: IndexType,
    },
    PushConstants {
        stages: ShaderStages,
        offset: u32,
        data: Vec<u8>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    Dispatch(u32, u32, u32),
    PipelineBarrier(Vec<ImageBarrier>),
    UpdateDescriptorSets(Vec<DescriptorWrite>),
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
        regions: Vec<BufferCopyRegion>,
    },
    CopyBufferToTexture {
        src: BufferHandle,
        dst: TextureHandle,
    },
    CopyTextureToBuffer {
        src: TextureHandle,
        dst: BufferHandle,
    },
    Submit(CommandBufferHandle),
}

impl MockCall {
    /// Short name of the call, for order assertions
    pub fn name(&self) -> &'static str {
        match self {
            MockCall::BeginCommandBuffer(_) => "begin",
            MockCall::EndCommandBuffer(_) => "end",
            MockCall::ResetCommandBuffer(_) => "reset",
            MockCall::BeginRenderPass { .. } => "begin_render_pass",
            MockCall::EndRenderPass => "end_render_pass",
            MockCall::BindPipeline { .. } => "bind_pipeline",
            MockCall::SetViewports(_) => "set_viewports",
            MockCall::SetScissors(_) => "set_scissors",
            MockCall::BindDescriptorSet { .. } => "bind_descriptor_set",
            MockCall::BindVertexBuffer { .. } => "bind_vertex_buffer",
            MockCall::BindIndexBuffer { .. } => "bind_index_buffer",
            MockCall::PushConstants { .. } => "push_constants",
            MockCall::Draw { .. } => "draw",
            MockCall::DrawIndexed { .. } => "draw_indexed",
            MockCall::Dispatch(..) => "dispatch",
            MockCall::PipelineBarrier(_) => "pipeline_barrier",
            MockCall::UpdateDescriptorSets(_) => "update_descriptor_sets",
            MockCall::CopyBuffer { .. } => "copy_buffer",
            MockCall::CopyBufferToTexture { .. } => "copy_buffer_to_texture",
            MockCall::CopyTextureToBuffer { .. } => "copy_texture_to_buffer",
            MockCall::Submit(_) => "submit",
        }
    }
}

// ============================================================================
// Mock Backend
// ============================================================================

#[derive(Default)]
pub struct MockBackend {
    next_handle: AtomicU64,
    calls: Mutex<Vec<MockCall>>,
    created: Mutex<HashMap<&'static str, u32>>,
    destroyed: Mutex<Vec<&'static str>>,
    /// Descriptor pool -> (max sets, live sets)
    pools: Mutex<HashMap<DescriptorPoolHandle, (u32, u32)>>,
    pool_sizes: Mutex<Vec<Vec<DescriptorPoolSize>>>,
    initial_layouts: Mutex<HashMap<TextureHandle, ImageLayout>>,
    refuse_descriptor_pools: AtomicBool,
    fail_creation: AtomicBool,
    time_out_fences: AtomicBool,
    fail_recording: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn create(&self, kind: &'static str) -> Result<u64> {
        if self.fail_creation.load(Ordering::Relaxed) {
            return Err(Error::BackendFailure(format!("mock refused to create {}", kind)));
        }
        *self.created.lock().unwrap().entry(kind).or_insert(0) += 1;
        Ok(self.next())
    }

    fn destroy(&self, kind: &'static str) {
        self.destroyed.lock().unwrap().push(kind);
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    // ===== FAILURE INJECTION =====

    /// Make `create_descriptor_pool` fail (backend refuses to grow)
    pub fn refuse_descriptor_pools(&self, refuse: bool) {
        self.refuse_descriptor_pools.store(refuse, Ordering::Relaxed);
    }

    /// Make every object creation fail with `BackendFailure`
    pub fn fail_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::Relaxed);
    }

    pub fn time_out_fences(&self, time_out: bool) {
        self.time_out_fences.store(time_out, Ordering::Relaxed);
    }

    /// Make barriers and descriptor updates fail with `BackendFailure`
    pub fn fail_recording(&self, fail: bool) {
        self.fail_recording.store(fail, Ordering::Relaxed);
    }

    fn check_recording(&self, what: &str) -> Result<()> {
        if self.fail_recording.load(Ordering::Relaxed) {
            return Err(Error::BackendFailure(format!("mock refused to record {}", what)));
        }
        Ok(())
    }

    // ===== INSPECTION =====

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(MockCall::name).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Number of recorded calls with the given name
    pub fn count_calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.name() == name).count()
    }

    /// Every recorded barrier, flattened in recording order
    pub fn barriers(&self) -> Vec<ImageBarrier> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MockCall::PipelineBarrier(barriers) => Some(barriers.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Every batched descriptor update, in recording order
    pub fn descriptor_updates(&self) -> Vec<Vec<DescriptorWrite>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MockCall::UpdateDescriptorSets(writes) => Some(writes.clone()),
                _ => None,
            })
            .collect()
    }

    /// Objects of `kind` created so far
    pub fn created(&self, kind: &str) -> u32 {
        self.created.lock().unwrap().get(kind).copied().unwrap_or(0)
    }

    /// Objects of `kind` destroyed so far
    pub fn destroyed(&self, kind: &str) -> u32 {
        self.destroyed.lock().unwrap().iter().filter(|k| **k == kind).count() as u32
    }

    /// Kinds in destruction order, consecutive duplicates collapsed
    pub fn destruction_order(&self) -> Vec<&'static str> {
        let mut order: Vec<&'static str> = self.destroyed.lock().unwrap().clone();
        order.dedup();
        order
    }

    /// Live sets of a descriptor pool
    pub fn live_sets(&self, pool: DescriptorPoolHandle) -> u32 {
        self.pools.lock().unwrap().get(&pool).map(|(_, live)| *live).unwrap_or(0)
    }

    /// Per-type sizes passed to every `create_descriptor_pool` call
    pub fn pool_sizes(&self) -> Vec<Vec<DescriptorPoolSize>> {
        self.pool_sizes.lock().unwrap().clone()
    }

    pub fn initial_layout(&self, texture: TextureHandle) -> Option<ImageLayout> {
        self.initial_layouts.lock().unwrap().get(&texture).copied()
    }
}

fn requirements(size: u64, linear: bool) -> MemoryRequirements {
    MemoryRequirements { size, alignment: 256, memory_type_bits: 0b1, linear }
}

impl Backend for MockBackend {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<(BufferHandle, MemoryRequirements)> {
        Ok((BufferHandle(self.create("buffer")?), requirements(desc.size, true)))
    }

    fn bind_buffer_memory(&self, _buffer: BufferHandle, _memory: &MemoryAllocation) -> Result<()> {
        Ok(())
    }

    fn destroy_buffer(&self, _buffer: BufferHandle) {
        self.destroy("buffer");
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<(TextureHandle, MemoryRequirements)> {
        let size = desc.extent.width as u64
            * desc.extent.height as u64
            * desc.extent.depth as u64
            * desc.array_layers as u64
            * desc.format.texel_size() as u64;
        Ok((TextureHandle(self.create("texture")?), requirements(size, false)))
    }

    fn bind_texture_memory(
        &self,
        texture: TextureHandle,
        _memory: &MemoryAllocation,
        initial_layout: ImageLayout,
    ) -> Result<()> {
        self.initial_layouts.lock().unwrap().insert(texture, initial_layout);
        Ok(())
    }

    fn destroy_texture(&self, _texture: TextureHandle) {
        self.destroy("texture");
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<SamplerHandle> {
        Ok(SamplerHandle(self.create("sampler")?))
    }

    fn destroy_sampler(&self, _sampler: SamplerHandle) {
        self.destroy("sampler");
    }

    fn create_shader_module(&self, _code: &[u32]) -> Result<ShaderModuleHandle> {
        Ok(ShaderModuleHandle(self.create("shader_module")?))
    }

    fn destroy_shader_module(&self, _module: ShaderModuleHandle) {
        self.destroy("shader_module");
    }

    fn create_set_layout(&self, _desc: &BindingLayoutDesc) -> Result<SetLayoutHandle> {
        Ok(SetLayoutHandle(self.create("set_layout")?))
    }

    fn destroy_set_layout(&self, _layout: SetLayoutHandle) {
        self.destroy("set_layout");
    }

    fn create_pipeline_layout(
        &self,
        _set_layout: SetLayoutHandle,
        _push_constants: &[PushConstantRange],
    ) -> Result<PipelineLayoutHandle> {
        Ok(PipelineLayoutHandle(self.create("pipeline_layout")?))
    }

    fn destroy_pipeline_layout(&self, _layout: PipelineLayoutHandle) {
        self.destroy("pipeline_layout");
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        Ok(RenderPassHandle(self.create("render_pass")?))
    }

    fn destroy_render_pass(&self, _render_pass: RenderPassHandle) {
        self.destroy("render_pass");
    }

    fn create_framebuffer(&self, _key: &FramebufferKey) -> Result<FramebufferHandle> {
        Ok(FramebufferHandle(self.create("framebuffer")?))
    }

    fn destroy_framebuffer(&self, _framebuffer: FramebufferHandle) {
        self.destroy("framebuffer");
    }

    fn create_graphics_pipeline(&self, _state: &PipelineState) -> Result<PipelineHandle> {
        Ok(PipelineHandle(self.create("pipeline")?))
    }

    fn create_compute_pipeline(&self, _state: &ComputePipelineState) -> Result<PipelineHandle> {
        Ok(PipelineHandle(self.create("pipeline")?))
    }

    fn destroy_pipeline(&self, _pipeline: PipelineHandle) {
        self.destroy("pipeline");
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[DescriptorPoolSize],
    ) -> Result<DescriptorPoolHandle> {
        if self.refuse_descriptor_pools.load(Ordering::Relaxed) {
            return Err(Error::BackendFailure("mock refused descriptor pool".to_string()));
        }
        let pool = DescriptorPoolHandle(self.create("descriptor_pool")?);
        self.pools.lock().unwrap().insert(pool, (max_sets, 0));
        self.pool_sizes.lock().unwrap().push(sizes.to_vec());
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        self.pools.lock().unwrap().remove(&pool);
        self.destroy("descriptor_pool");
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        _layout: SetLayoutHandle,
    ) -> Result<DescriptorSetHandle> {
        let mut pools = self.pools.lock().unwrap();
        let (max, live) = pools
            .get_mut(&pool)
            .ok_or_else(|| Error::BackendFailure("unknown descriptor pool".to_string()))?;
        if *live >= *max {
            return Err(Error::ResourceExhausted("descriptor pool out of sets".to_string()));
        }
        *live += 1;
        drop(pools);
        Ok(DescriptorSetHandle(self.next()))
    }

    fn free_descriptor_set(&self, pool: DescriptorPoolHandle, _set: DescriptorSetHandle) -> Result<()> {
        let mut pools = self.pools.lock().unwrap();
        let (_, live) = pools
            .get_mut(&pool)
            .ok_or_else(|| Error::BackendFailure("unknown descriptor pool".to_string()))?;
        *live = live.saturating_sub(1);
        Ok(())
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) -> Result<()> {
        self.check_recording("descriptor writes")?;
        self.record(MockCall::UpdateDescriptorSets(writes.to_vec()));
        Ok(())
    }

    fn create_command_pool(&self) -> Result<CommandPoolHandle> {
        Ok(CommandPoolHandle(self.create("command_pool")?))
    }

    fn destroy_command_pool(&self, _pool: CommandPoolHandle) {
        self.destroy("command_pool");
    }

    fn allocate_command_buffer(&self, _pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        Ok(CommandBufferHandle(self.create("command_buffer")?))
    }

    fn reset_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        self.record(MockCall::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        self.record(MockCall::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        self.record(MockCall::EndCommandBuffer(cmd));
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        _cmd: CommandBufferHandle,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        render_area: Rect2D,
        clear_values: &[ClearValue],
    ) {
        self.record(MockCall::BeginRenderPass {
            render_pass,
            framebuffer,
            render_area,
            clear_count: clear_values.len(),
        });
    }

    fn cmd_end_render_pass(&self, _cmd: CommandBufferHandle) {
        self.record(MockCall::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, _cmd: CommandBufferHandle, bind_point: PipelineBindPoint, pipeline: PipelineHandle) {
        self.record(MockCall::BindPipeline { bind_point, pipeline });
    }

    fn cmd_set_viewports(&self, _cmd: CommandBufferHandle, viewports: &[Viewport]) {
        self.record(MockCall::SetViewports(viewports.to_vec()));
    }

    fn cmd_set_scissors(&self, _cmd: CommandBufferHandle, scissors: &[Rect2D]) {
        self.record(MockCall::SetScissors(scissors.to_vec()));
    }

    fn cmd_bind_descriptor_set(
        &self,
        _cmd: CommandBufferHandle,
        bind_point: PipelineBindPoint,
        layout: PipelineLayoutHandle,
        set: DescriptorSetHandle,
    ) {
        self.record(MockCall::BindDescriptorSet { bind_point, layout, set });
    }

    fn cmd_bind_vertex_buffer(&self, _cmd: CommandBufferHandle, binding: u32, buffer: BufferHandle, offset: u64) {
        self.record(MockCall::BindVertexBuffer { binding, buffer, offset });
    }

    fn cmd_bind_index_buffer(&self, _cmd: CommandBufferHandle, buffer: BufferHandle, offset: u64, index_type: IndexType) {
        self.record(MockCall::BindIndexBuffer { buffer, offset, index_type });
    }

    fn cmd_push_constants(
        &self,
        _cmd: CommandBufferHandle,
        _layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        self.record(MockCall::PushConstants { stages, offset, data: data.to_vec() });
    }

    fn cmd_draw(&self, _cmd: CommandBufferHandle, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.record(MockCall::Draw { vertex_count, instance_count });
    }

    fn cmd_draw_indexed(
        &self,
        _cmd: CommandBufferHandle,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.record(MockCall::DrawIndexed { index_count, instance_count });
    }

    fn cmd_dispatch(&self, _cmd: CommandBufferHandle, x: u32, y: u32, z: u32) {
        self.record(MockCall::Dispatch(x, y, z));
    }

    fn cmd_pipeline_barrier(&self, _cmd: CommandBufferHandle, barriers: &[ImageBarrier]) -> Result<()> {
        self.check_recording("barriers")?;
        self.record(MockCall::PipelineBarrier(barriers.to_vec()));
        Ok(())
    }

    fn cmd_copy_buffer(&self, _cmd: CommandBufferHandle, src: BufferHandle, dst: BufferHandle, regions: &[BufferCopyRegion]) {
        self.record(MockCall::CopyBuffer { src, dst, regions: regions.to_vec() });
    }

    fn cmd_copy_buffer_to_texture(
        &self,
        _cmd: CommandBufferHandle,
        src: BufferHandle,
        dst: TextureHandle,
        _regions: &[BufferTextureCopyRegion],
    ) {
        self.record(MockCall::CopyBufferToTexture { src, dst });
    }

    fn cmd_copy_texture_to_buffer(
        &self,
        _cmd: CommandBufferHandle,
        src: TextureHandle,
        dst: BufferHandle,
        _regions: &[BufferTextureCopyRegion],
    ) {
        self.record(MockCall::CopyTextureToBuffer { src, dst });
    }

    fn submit(&self, cmd: CommandBufferHandle) -> Result<FenceHandle> {
        self.record(MockCall::Submit(cmd));
        Ok(FenceHandle(self.create("fence")?))
    }

    fn wait_fence(&self, _fence: FenceHandle, _timeout: Timeout) -> Result<FenceStatus> {
        if self.time_out_fences.load(Ordering::Relaxed) {
            Ok(FenceStatus::TimedOut)
        } else {
            Ok(FenceStatus::Signaled)
        }
    }

    fn destroy_fence(&self, _fence: FenceHandle) {
        self.destroy("fence");
    }
}

// ============================================================================
// Mock Memory Allocator
// ============================================================================

#[derive(Default)]
pub struct MockAllocator {
    next_handle: AtomicU64,
    live: Mutex<Vec<MemoryAllocation>>,
    writes: Mutex<Vec<(MemoryAllocation, u64, Vec<u8>)>>,
    exhausted: AtomicBool,
}

impl MockAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every allocation fail with `ResourceExhausted`
    pub fn set_exhausted(&self, exhausted: bool) {
        self.exhausted.store(exhausted, Ordering::Relaxed);
    }

    pub fn live_allocations(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn writes(&self) -> Vec<(MemoryAllocation, u64, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }
}

impl MemoryAllocator for MockAllocator {
    fn allocate(&self, _usage: MemoryUsage, requirements: &MemoryRequirements) -> Result<MemoryAllocation> {
        if self.exhausted.load(Ordering::Relaxed) {
            return Err(Error::ResourceExhausted("mock heap exhausted".to_string()));
        }
        let allocation = MemoryAllocation {
            handle: MemoryHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1),
            offset: 0,
            size: requirements.size,
        };
        self.live.lock().unwrap().push(allocation);
        Ok(allocation)
    }

    fn write(&self, allocation: &MemoryAllocation, offset: u64, data: &[u8]) -> Result<()> {
        self.writes.lock().unwrap().push((*allocation, offset, data.to_vec()));
        Ok(())
    }

    /// Replays the recorded writes over zeroed memory
    fn read(&self, allocation: &MemoryAllocation, offset: u64, out: &mut [u8]) -> Result<()> {
        out.fill(0);
        let start = offset;
        let end = offset + out.len() as u64;
        for (target, write_offset, data) in self.writes.lock().unwrap().iter() {
            if target != allocation {
                continue;
            }
            for (i, byte) in data.iter().enumerate() {
                let at = write_offset + i as u64;
                if at >= start && at < end {
                    out[(at - start) as usize] = *byte;
                }
            }
        }
        Ok(())
    }

    fn free(&self, allocation: &MemoryAllocation) {
        self.live.lock().unwrap().retain(|a| a != allocation);
    }
}
