/// Command recorder - stateful recording on top of the caches
///
/// A recorder belongs to one worker thread. It accumulates pipeline, binding
/// and viewport state and only resolves it into backend objects when a draw or
/// dispatch needs it (the pre-draw sequence):
///
/// 1. resolve the pipeline state through the pipeline cache when it changed
/// 2. bind the pipeline, push dynamic viewports and scissors
/// 3. bring bound textures into the layout their binding requires
/// 4. rebuild and bind the descriptor set when the binding table is dirty
///
/// Every cached object a recording uses is released back to its cache (not
/// destroyed) on [`reset`](CommandRecorder::reset), together with every
/// descriptor set allocated during the recording.

use std::sync::Arc;
use crate::backend::{
    ClearValue, CommandBufferHandle, DescriptorSetHandle, IndexType, PipelineBindPoint,
    PipelineHandle, PipelineLayoutHandle, Rect2D, SetLayoutHandle, Viewport,
    BufferTextureCopyRegion,
};
use crate::cache::{CommandPool, PipelineLayout, SetLayout, WorkerToken};
use crate::descriptor::{required_layout, BufferBindingUsage, ResourceBindingTable, SetAllocation};
use crate::device::DeviceShared;
use crate::error::{Error, Result};
use crate::pipeline::{
    ComputePipelineDesc, ComputePipelineState, DescriptorType, Framebuffer, FramebufferKey,
    GraphicsPipelineDesc, Pipeline, PipelineKey, PipelineLayoutDesc, PipelineState, RenderPass,
    RenderPassDesc,
};
use crate::recorder::CopyCommand;
use crate::resource::{
    Buffer, BufferSpan, BufferUsage, Sampler, ShaderStages, SubresourceRange, Texture,
    TextureDimension, TextureUsage,
};
use crate::sync::{ImageBarrier, ImageLayout, ImageLayoutTracker};

/// Recording state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    RenderPassActive,
    Ended,
}

use self::RecorderState::{Ended, Idle, Recording, RenderPassActive};

struct ActivePass {
    render_pass: Arc<RenderPass>,
    framebuffer: Arc<Framebuffer>,
    width: u32,
    height: u32,
}

/// Descriptor set currently bound on the command buffer
struct BoundSet {
    bind_point: PipelineBindPoint,
    layout: PipelineLayoutHandle,
    set_layout: SetLayoutHandle,
    /// `None` for a layout without bindings
    set: Option<DescriptorSetHandle>,
}

/// Cache uses and allocations held until reset
#[derive(Default)]
struct UsedObjects {
    pipeline_layouts: Vec<PipelineLayoutDesc>,
    render_passes: Vec<RenderPassDesc>,
    framebuffers: Vec<FramebufferKey>,
    pipelines: Vec<PipelineKey>,
    sets: Vec<(Arc<SetLayout>, SetAllocation)>,
    /// Buffers referenced by recorded commands
    buffers: Vec<Arc<Buffer>>,
}

pub struct CommandRecorder {
    device: Arc<DeviceShared>,
    worker: WorkerToken,
    pool: Arc<CommandPool>,
    cmd: Option<CommandBufferHandle>,
    state: RecorderState,

    graphics: Option<(GraphicsPipelineDesc, Arc<PipelineLayout>)>,
    compute: Option<(ComputePipelineDesc, Arc<PipelineLayout>)>,
    graphics_dirty: bool,
    compute_dirty: bool,
    resolved_graphics: Option<Arc<Pipeline>>,
    resolved_compute: Option<Arc<Pipeline>>,
    bound_graphics: Option<PipelineHandle>,
    bound_compute: Option<PipelineHandle>,
    /// Layout of the most recently bound pipeline, target of push constants
    push_layout: Option<Arc<PipelineLayout>>,

    pass: Option<ActivePass>,
    viewports: Vec<Viewport>,
    scissors: Vec<Rect2D>,
    viewports_dirty: bool,

    table: ResourceBindingTable,
    bound_set: Option<BoundSet>,
    tracker: ImageLayoutTracker,
    barriers: Vec<ImageBarrier>,

    used: UsedObjects,
}

fn note(first: &mut Option<Error>, result: Result<()>) {
    if let Err(err) = result {
        first.get_or_insert(err);
    }
}

impl CommandRecorder {
    pub(crate) fn new(device: Arc<DeviceShared>, worker: WorkerToken, pool: Arc<CommandPool>) -> Self {
        let viewport_count = device.config.initial_viewport_count.max(1) as usize;
        Self {
            device,
            worker,
            pool,
            cmd: None,
            state: Idle,
            graphics: None,
            compute: None,
            graphics_dirty: true,
            compute_dirty: true,
            resolved_graphics: None,
            resolved_compute: None,
            bound_graphics: None,
            bound_compute: None,
            push_layout: None,
            pass: None,
            viewports: vec![Viewport::from_extent(0, 0); viewport_count],
            scissors: vec![Rect2D::from_extent(0, 0); viewport_count],
            viewports_dirty: true,
            table: ResourceBindingTable::new(),
            bound_set: None,
            tracker: ImageLayoutTracker::new(),
            barriers: Vec::new(),
            used: UsedObjects::default(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn worker(&self) -> &WorkerToken {
        &self.worker
    }

    /// Command buffer being recorded, if any
    pub fn command_buffer(&self) -> Option<CommandBufferHandle> {
        self.cmd
    }

    pub fn binding_table(&self) -> &ResourceBindingTable {
        &self.table
    }

    pub fn layout_tracker(&self) -> &ImageLayoutTracker {
        &self.tracker
    }

    pub fn viewport_count(&self) -> u32 {
        self.viewports.len() as u32
    }

    fn expect_state(&self, operation: &str, allowed: &[RecorderState]) -> Result<()> {
        self.worker.check_thread(operation)?;
        if !allowed.contains(&self.state) {
            crate::ferrite_invalid!(
                "ferrite::recorder",
                "{} is not allowed in state {:?}",
                operation, self.state
            );
        }
        Ok(())
    }

    fn cmd(&self) -> Result<CommandBufferHandle> {
        self.cmd
            .ok_or_else(|| Error::InvalidUsage("no command buffer is being recorded".to_string()))
    }

    /// Record pending barriers; they are dropped either way
    fn flush_barriers(&mut self, cmd: CommandBufferHandle) -> Result<()> {
        if self.barriers.is_empty() {
            return Ok(());
        }
        let result = self.device.backend.cmd_pipeline_barrier(cmd, &self.barriers);
        self.barriers.clear();
        result
    }

    /// Command buffer of an ended recording, for submission
    pub(crate) fn finished_commands(&self) -> Result<CommandBufferHandle> {
        if self.state != Ended {
            crate::ferrite_invalid!(
                "ferrite::recorder",
                "Only an ended recording can be submitted (state {:?})",
                self.state
            );
        }
        self.cmd()
    }

    // ===== RECORDING BOUNDARIES =====

    pub fn begin(&mut self) -> Result<()> {
        self.expect_state("begin", &[Idle])?;
        let cmd = match self.cmd {
            Some(cmd) => cmd,
            None => {
                let cmd = self.pool.acquire(&self.worker)?;
                self.cmd = Some(cmd);
                cmd
            }
        };
        self.device.backend.begin_command_buffer(cmd)?;
        self.state = Recording;
        Ok(())
    }

    /// Restore every touched texture to its default layout and close the command buffer
    pub fn end(&mut self) -> Result<()> {
        self.expect_state("end", &[Recording])?;
        let cmd = self.cmd()?;
        self.tracker.reset(&mut self.barriers);
        self.flush_barriers(cmd)?;
        self.device.backend.end_command_buffer(cmd)?;
        self.state = Ended;
        Ok(())
    }

    /// Return the command buffer to the worker's pool and every used object to its cache
    ///
    /// Must only be called once submitted work has completed. Every release is
    /// attempted; the first failure is returned.
    pub fn reset(&mut self) -> Result<()> {
        self.worker.check_thread("reset")?;
        let mut first = None;

        if let Some(cmd) = self.cmd.take() {
            note(&mut first, self.pool.recycle(&self.worker, cmd));
        }
        note(&mut first, self.release_used());

        self.table.reset();
        self.tracker.clear();
        self.barriers.clear();
        self.graphics = None;
        self.compute = None;
        self.graphics_dirty = true;
        self.compute_dirty = true;
        self.resolved_graphics = None;
        self.resolved_compute = None;
        self.bound_graphics = None;
        self.bound_compute = None;
        self.push_layout = None;
        self.pass = None;
        self.bound_set = None;
        self.viewports_dirty = true;
        self.state = Idle;

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn release_used(&mut self) -> Result<()> {
        let used = std::mem::take(&mut self.used);
        let device = &self.device;
        let mut first = None;

        for key in &used.pipelines {
            note(&mut first, device.pipelines.release(key));
        }
        for key in &used.framebuffers {
            note(&mut first, device.framebuffers.release(key));
        }
        for desc in &used.render_passes {
            note(&mut first, device.render_passes.release(desc));
        }
        for desc in &used.pipeline_layouts {
            note(&mut first, device.pipeline_layouts.release(desc));
        }
        let set_count = used.sets.len();
        for (layout, allocation) in used.sets {
            note(&mut first, layout.allocator().release(allocation));
        }

        crate::ferrite_trace!(
            "ferrite::recorder",
            "Worker #{} released {} pipeline(s), {} render pass(es), {} descriptor set(s)",
            self.worker.id(), used.pipelines.len(), used.render_passes.len(), set_count
        );

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ===== RENDER PASSES =====

    /// Begin a render pass on the given attachments
    ///
    /// Color attachments move to color-attachment layout and the depth attachment
    /// to depth/stencil-attachment layout before the pass starts. Viewports and
    /// scissors are reset to the framebuffer extent, the smallest extent among
    /// the attachments.
    pub fn begin_render_pass(
        &mut self,
        desc: &RenderPassDesc,
        color: &[Arc<Texture>],
        depth: Option<&Arc<Texture>>,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        self.expect_state("begin_render_pass", &[Recording])?;
        let cmd = self.cmd()?;
        validate_attachments(desc, color, depth)?;

        for texture in color {
            let range = texture.desc().full_range();
            self.tracker.transition(texture, &[range], ImageLayout::ColorAttachment, &mut self.barriers)?;
        }
        if let Some(texture) = depth {
            let range = texture.desc().full_range();
            self.tracker.transition(texture, &[range], ImageLayout::DepthStencilAttachment, &mut self.barriers)?;
        }
        self.flush_barriers(cmd)?;

        let attachments: Vec<&Arc<Texture>> = color.iter().chain(depth).collect();
        let width = attachments.iter().map(|t| t.desc().extent.width).min().unwrap_or(0);
        let height = attachments.iter().map(|t| t.desc().extent.height).min().unwrap_or(0);

        let render_pass = self.device.render_passes.get(desc)?;
        self.used.render_passes.push(desc.clone());

        let key = FramebufferKey {
            render_pass: render_pass.handle,
            attachments: attachments.iter().map(|t| t.handle()).collect(),
            width,
            height,
        };
        let framebuffer = self.device.framebuffers.get(&key)?;
        self.used.framebuffers.push(key);

        self.device.backend.cmd_begin_render_pass(
            cmd,
            render_pass.handle,
            framebuffer.handle,
            Rect2D::from_extent(width, height),
            clear_values,
        );

        let count = self.viewports.len();
        self.viewports = vec![Viewport::from_extent(width, height); count];
        self.scissors = vec![Rect2D::from_extent(width, height); count];
        self.viewports_dirty = true;
        self.graphics_dirty = true;
        self.pass = Some(ActivePass { render_pass, framebuffer, width, height });
        self.state = RenderPassActive;
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        self.expect_state("end_render_pass", &[RenderPassActive])?;
        let cmd = self.cmd()?;
        self.device.backend.cmd_end_render_pass(cmd);
        self.pass = None;
        self.state = Recording;
        Ok(())
    }

    /// Extent of the active render pass
    pub fn render_area(&self) -> Option<Rect2D> {
        self.pass.as_ref().map(|pass| Rect2D::from_extent(pass.width, pass.height))
    }

    // ===== PIPELINES =====

    /// Bind a graphics pipeline description; it is compiled (or fetched) at the next draw
    pub fn bind_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<()> {
        self.expect_state("bind_pipeline", &[Recording, RenderPassActive])?;
        if let Some((current, layout)) = &self.graphics {
            if current == desc {
                self.push_layout = Some(Arc::clone(layout));
                return Ok(());
            }
        }
        let layout = self.acquire_layout(&desc.layout)?;
        self.graphics = Some((desc.clone(), layout));
        self.graphics_dirty = true;
        Ok(())
    }

    pub fn bind_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> Result<()> {
        self.expect_state("bind_compute_pipeline", &[Recording, RenderPassActive])?;
        if let Some((current, layout)) = &self.compute {
            if current == desc {
                self.push_layout = Some(Arc::clone(layout));
                return Ok(());
            }
        }
        let layout = self.acquire_layout(&desc.layout)?;
        self.compute = Some((desc.clone(), layout));
        self.compute_dirty = true;
        Ok(())
    }

    fn acquire_layout(&mut self, desc: &PipelineLayoutDesc) -> Result<Arc<PipelineLayout>> {
        let layout = self.device.pipeline_layouts.get(desc)?;
        self.used.pipeline_layouts.push(desc.clone());
        if self
            .bound_set
            .as_ref()
            .is_some_and(|bound| bound.set_layout != layout.set_layout.handle)
        {
            self.table.mark_dirty();
        }
        self.push_layout = Some(Arc::clone(&layout));
        Ok(layout)
    }

    // ===== RESOURCE BINDINGS =====

    pub fn bind_buffer(&mut self, usage: BufferBindingUsage, span: BufferSpan, slot: u32) -> Result<()> {
        self.expect_state("bind_buffer", &[Recording, RenderPassActive])?;
        let end = span.offset.checked_add(span.size);
        if span.size == 0 || end.map_or(true, |end| end > span.buffer.size()) {
            crate::ferrite_invalid!(
                "ferrite::recorder",
                "Buffer span {}+{} outside buffer {:?} of {} bytes",
                span.offset, span.size, span.handle(), span.buffer.size()
            );
        }
        let required = match usage {
            BufferBindingUsage::Uniform => BufferUsage::UNIFORM,
            BufferBindingUsage::Storage => BufferUsage::STORAGE,
        };
        if !span.buffer.desc().usage.contains(required) {
            crate::ferrite_invalid!(
                "ferrite::recorder",
                "Buffer {:?} bound as {:?} lacks {:?} usage",
                span.handle(), usage, required
            );
        }
        self.table.bind_buffer(usage, span, slot);
        Ok(())
    }

    /// Bind a texture, with a sampler for sampled access or without for storage access
    ///
    /// Outside a render pass the texture is transitioned right away; inside one
    /// it must already be in the layout its binding requires.
    pub fn bind_texture(&mut self, texture: &Arc<Texture>, sampler: Option<&Arc<Sampler>>, slot: u32) -> Result<()> {
        self.expect_state("bind_texture", &[Recording, RenderPassActive])?;
        let (descriptor_type, usage) = match sampler {
            Some(_) => (DescriptorType::SampledTexture, TextureUsage::SAMPLED),
            None => (DescriptorType::StorageTexture, TextureUsage::STORAGE),
        };
        if !texture.desc().usage.contains(usage) {
            crate::ferrite_invalid!(
                "ferrite::recorder",
                "Texture {:?} bound to binding {} lacks {:?} usage",
                texture.handle(), slot, usage
            );
        }

        if self.state == Recording {
            if let Some(layout) = required_layout(texture, descriptor_type) {
                let cmd = self.cmd()?;
                let range = texture.desc().full_range();
                self.tracker.transition(texture, &[range], layout, &mut self.barriers)?;
                self.flush_barriers(cmd)?;
            }
        }

        self.table.bind_texture(texture, sampler, slot);
        Ok(())
    }

    pub fn bind_vertex_buffer(&mut self, binding: u32, buffer: &Arc<Buffer>, offset: u64) -> Result<()> {
        self.expect_state("bind_vertex_buffer", &[Recording, RenderPassActive])?;
        let cmd = self.cmd()?;
        check_buffer_binding(buffer, offset, BufferUsage::VERTEX)?;
        self.device.backend.cmd_bind_vertex_buffer(cmd, binding, buffer.handle(), offset);
        self.used.buffers.push(Arc::clone(buffer));
        Ok(())
    }

    pub fn bind_index_buffer(&mut self, buffer: &Arc<Buffer>, offset: u64, index_type: IndexType) -> Result<()> {
        self.expect_state("bind_index_buffer", &[Recording, RenderPassActive])?;
        let cmd = self.cmd()?;
        check_buffer_binding(buffer, offset, BufferUsage::INDEX)?;
        self.device.backend.cmd_bind_index_buffer(cmd, buffer.handle(), offset, index_type);
        self.used.buffers.push(Arc::clone(buffer));
        Ok(())
    }

    // ===== DYNAMIC STATE =====

    pub fn set_viewport(&mut self, index: u32, viewport: Viewport) -> Result<()> {
        self.expect_state("set_viewport", &[Recording, RenderPassActive])?;
        let count = self.viewports.len();
        match self.viewports.get_mut(index as usize) {
            Some(slot) => *slot = viewport,
            None => {
                crate::ferrite_invalid!(
                    "ferrite::recorder",
                    "Viewport index {} out of range (viewport count {})",
                    index, count
                );
            }
        }
        self.viewports_dirty = true;
        Ok(())
    }

    pub fn set_scissor(&mut self, index: u32, scissor: Rect2D) -> Result<()> {
        self.expect_state("set_scissor", &[Recording, RenderPassActive])?;
        let count = self.scissors.len();
        match self.scissors.get_mut(index as usize) {
            Some(slot) => *slot = scissor,
            None => {
                crate::ferrite_invalid!(
                    "ferrite::recorder",
                    "Scissor index {} out of range (viewport count {})",
                    index, count
                );
            }
        }
        self.viewports_dirty = true;
        Ok(())
    }

    /// Change the number of viewports; part of the pipeline state
    ///
    /// New entries copy viewport and scissor 0.
    pub fn set_viewport_count(&mut self, count: u32) -> Result<()> {
        self.expect_state("set_viewport_count", &[Recording, RenderPassActive])?;
        if count == 0 {
            crate::ferrite_invalid!("ferrite::recorder", "Viewport count must be at least 1");
        }
        if count as usize == self.viewports.len() {
            return Ok(());
        }
        let viewport = self.viewports.first().copied().unwrap_or(Viewport::from_extent(0, 0));
        let scissor = self.scissors.first().copied().unwrap_or(Rect2D::from_extent(0, 0));
        self.viewports.resize(count as usize, viewport);
        self.scissors.resize(count as usize, scissor);
        self.viewports_dirty = true;
        self.graphics_dirty = true;
        Ok(())
    }

    /// Push constant bytes into the layout of the most recently bound pipeline
    pub fn push_constants(&mut self, stages: ShaderStages, offset: u32, data: &[u8]) -> Result<()> {
        self.expect_state("push_constants", &[Recording, RenderPassActive])?;
        let cmd = self.cmd()?;
        let Some(layout) = &self.push_layout else {
            crate::ferrite_invalid!("ferrite::recorder", "push_constants without a bound pipeline");
        };
        if data.is_empty() || offset % 4 != 0 || data.len() % 4 != 0 {
            crate::ferrite_invalid!(
                "ferrite::recorder",
                "Push constant offset {} and size {} must be non-zero multiples of 4",
                offset, data.len()
            );
        }
        let end = offset as u64 + data.len() as u64;
        let covered = layout.desc.push_constants().iter().any(|range| {
            range.stages.contains(stages)
                && range.offset <= offset
                && end <= range.offset as u64 + range.size as u64
        });
        if !covered {
            crate::ferrite_invalid!(
                "ferrite::recorder",
                "Push constants {:?} [{}..{}) not covered by the pipeline layout",
                stages, offset, end
            );
        }
        self.device.backend.cmd_push_constants(cmd, layout.handle, stages, offset, data);
        Ok(())
    }

    /// Push a plain-old-data value as constants
    pub fn push_constant_value<T: bytemuck::Pod>(&mut self, stages: ShaderStages, offset: u32, value: &T) -> Result<()> {
        self.push_constants(stages, offset, bytemuck::bytes_of(value))
    }

    // ===== DRAW / DISPATCH =====

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        self.expect_state("draw", &[RenderPassActive])?;
        let cmd = self.cmd()?;
        self.prepare_graphics(cmd)?;
        self.device.backend.cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance);
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.expect_state("draw_indexed", &[RenderPassActive])?;
        let cmd = self.cmd()?;
        self.prepare_graphics(cmd)?;
        self.device.backend.cmd_draw_indexed(cmd, index_count, instance_count, first_index, vertex_offset, first_instance);
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.expect_state("dispatch", &[Recording])?;
        let cmd = self.cmd()?;
        self.prepare_compute(cmd)?;
        self.device.backend.cmd_dispatch(cmd, x, y, z);
        Ok(())
    }

    fn prepare_graphics(&mut self, cmd: CommandBufferHandle) -> Result<()> {
        let Some((desc, layout)) = &self.graphics else {
            crate::ferrite_invalid!("ferrite::recorder", "draw without a bound graphics pipeline");
        };
        let layout = Arc::clone(layout);

        let cached = if self.graphics_dirty { None } else { self.resolved_graphics.clone() };
        let pipeline = match cached {
            Some(pipeline) => pipeline,
            None => {
                let Some(pass) = &self.pass else {
                    crate::ferrite_invalid!("ferrite::recorder", "draw outside a render pass");
                };
                let key = PipelineKey::Graphics(PipelineState::new(
                    desc,
                    pass.render_pass.handle,
                    pass.framebuffer.handle,
                    layout.handle,
                    self.viewports.len() as u32,
                ));
                let pipeline = self.device.pipelines.get(&key)?;
                self.used.pipelines.push(key);
                self.resolved_graphics = Some(Arc::clone(&pipeline));
                self.graphics_dirty = false;
                pipeline
            }
        };

        if self.bound_graphics != Some(pipeline.handle) {
            self.device.backend.cmd_bind_pipeline(cmd, PipelineBindPoint::Graphics, pipeline.handle);
            self.bound_graphics = Some(pipeline.handle);
            self.viewports_dirty = true;
        }
        if self.viewports_dirty {
            self.device.backend.cmd_set_viewports(cmd, &self.viewports);
            self.device.backend.cmd_set_scissors(cmd, &self.scissors);
            self.viewports_dirty = false;
        }

        self.prepare_textures(cmd, &layout)?;
        self.prepare_bindings(cmd, PipelineBindPoint::Graphics, &layout)
    }

    fn prepare_compute(&mut self, cmd: CommandBufferHandle) -> Result<()> {
        let Some((desc, layout)) = &self.compute else {
            crate::ferrite_invalid!("ferrite::recorder", "dispatch without a bound compute pipeline");
        };
        let layout = Arc::clone(layout);

        let cached = if self.compute_dirty { None } else { self.resolved_compute.clone() };
        let pipeline = match cached {
            Some(pipeline) => pipeline,
            None => {
                let key = PipelineKey::Compute(ComputePipelineState {
                    shader: desc.shader.clone(),
                    layout: layout.handle,
                });
                let pipeline = self.device.pipelines.get(&key)?;
                self.used.pipelines.push(key);
                self.resolved_compute = Some(Arc::clone(&pipeline));
                self.compute_dirty = false;
                pipeline
            }
        };

        if self.bound_compute != Some(pipeline.handle) {
            self.device.backend.cmd_bind_pipeline(cmd, PipelineBindPoint::Compute, pipeline.handle);
            self.bound_compute = Some(pipeline.handle);
        }

        self.prepare_textures(cmd, &layout)?;
        self.prepare_bindings(cmd, PipelineBindPoint::Compute, &layout)
    }

    /// Bring every declared texture binding into its required layout
    ///
    /// Inside a render pass a texture in the wrong layout is an error.
    fn prepare_textures(&mut self, cmd: CommandBufferHandle, layout: &PipelineLayout) -> Result<()> {
        let declared = layout.desc.bindings();
        let mut pending: Vec<(Arc<Texture>, ImageLayout)> = Vec::new();
        for (slot, binding) in self.table.textures() {
            let Some(decl) = declared.find(slot) else { continue };
            let Some(required) = required_layout(&binding.texture, decl.descriptor_type) else { continue };
            let range = binding.texture.desc().full_range();
            if !self.tracker.is_in_layout(&binding.texture, &range, required) {
                pending.push((Arc::clone(&binding.texture), required));
            }
        }

        for (texture, required) in pending {
            if self.state == RenderPassActive {
                crate::ferrite_invalid!(
                    "ferrite::recorder",
                    "Texture {:?} is not in {:?} and cannot be transitioned inside a render pass",
                    texture.handle(), required
                );
            }
            let range = texture.desc().full_range();
            self.tracker.transition(&texture, &[range], required, &mut self.barriers)?;
        }
        self.flush_barriers(cmd)?;
        Ok(())
    }

    fn prepare_bindings(
        &mut self,
        cmd: CommandBufferHandle,
        bind_point: PipelineBindPoint,
        layout: &Arc<PipelineLayout>,
    ) -> Result<()> {
        let stale = self
            .bound_set
            .as_ref()
            .map_or(true, |bound| bound.set_layout != layout.set_layout.handle);
        if self.table.is_dirty() || stale {
            return self.rebuild_set(cmd, bind_point, layout);
        }

        if let Some(bound) = &mut self.bound_set {
            if bound.bind_point != bind_point || bound.layout != layout.handle {
                if let Some(set) = bound.set {
                    self.device.backend.cmd_bind_descriptor_set(cmd, bind_point, layout.handle, set);
                }
                bound.bind_point = bind_point;
                bound.layout = layout.handle;
            }
        }
        Ok(())
    }

    /// Allocate a set, write every bound slot the layout declares and bind it
    ///
    /// Slots the layout does not declare, or declares with another kind, are
    /// skipped with a warning.
    fn rebuild_set(
        &mut self,
        cmd: CommandBufferHandle,
        bind_point: PipelineBindPoint,
        layout: &Arc<PipelineLayout>,
    ) -> Result<()> {
        let set_layout = Arc::clone(&layout.set_layout);
        let declared = &set_layout.desc;

        if declared.is_empty() {
            for (slot, _) in self.table.drain() {
                crate::ferrite_warn!(
                    "ferrite::recorder",
                    "Binding {} is not declared in the pipeline layout, skipped",
                    slot
                );
            }
            self.bound_set = Some(BoundSet {
                bind_point,
                layout: layout.handle,
                set_layout: set_layout.handle,
                set: None,
            });
            return Ok(());
        }

        let allocation = set_layout.allocator().allocate()?;
        let set = allocation.set();
        self.used.sets.push((Arc::clone(&set_layout), allocation));

        let slots = self.table.drain();
        let mut writes = Vec::with_capacity(slots.len());
        for (slot, resource) in &slots {
            let Some(decl) = declared.find(*slot) else {
                crate::ferrite_warn!(
                    "ferrite::recorder",
                    "Binding {} is not declared in the pipeline layout, skipped",
                    slot
                );
                continue;
            };
            match resource.to_write(set, decl) {
                Ok(write) => writes.push(write),
                Err(reason) => {
                    crate::ferrite_warn!("ferrite::recorder", "Binding {} skipped: {}", slot, reason);
                }
            }
        }

        if !writes.is_empty() {
            if let Err(err) = self.device.backend.update_descriptor_sets(&writes) {
                // The set stays allocated until reset; the next draw rebuilds
                self.table.mark_dirty();
                return Err(err);
            }
        }
        self.device.backend.cmd_bind_descriptor_set(cmd, bind_point, layout.handle, set);
        self.bound_set = Some(BoundSet {
            bind_point,
            layout: layout.handle,
            set_layout: set_layout.handle,
            set: Some(set),
        });

        crate::ferrite_trace!(
            "ferrite::recorder",
            "Descriptor set {:?} built with {} of {} slot(s)",
            set, writes.len(), slots.len()
        );
        Ok(())
    }

    // ===== TRANSFERS =====

    /// Record a transfer; textures are moved to the transfer layouts first
    pub fn copy(&mut self, command: CopyCommand) -> Result<()> {
        self.expect_state("copy", &[Recording])?;
        let cmd = self.cmd()?;
        let kind = command.name();

        match command {
            CopyCommand::BufferToBuffer { src, dst, regions } => {
                check_transfer_buffers(&src, &dst)?;
                if regions.is_empty() {
                    crate::ferrite_invalid!("ferrite::recorder", "{} copy without regions", kind);
                }
                for region in &regions {
                    check_buffer_range(&src, region.src_offset, region.size)?;
                    check_buffer_range(&dst, region.dst_offset, region.size)?;
                }
                self.device.backend.cmd_copy_buffer(cmd, src.handle(), dst.handle(), &regions);
                self.used.buffers.push(src);
                self.used.buffers.push(dst);
            }
            CopyCommand::BufferToTexture { src, dst, regions } => {
                check_buffer_usage(&src, BufferUsage::TRANSFER_SRC)?;
                check_texture_usage(&dst, TextureUsage::TRANSFER_DST)?;
                let ranges = texture_regions(&dst, &src, &regions)?;
                self.tracker.transition(&dst, &ranges, ImageLayout::TransferDst, &mut self.barriers)?;
                self.flush_barriers(cmd)?;
                self.device.backend.cmd_copy_buffer_to_texture(cmd, src.handle(), dst.handle(), &regions);
                self.used.buffers.push(src);
            }
            CopyCommand::TextureToBuffer { src, dst, regions } => {
                check_texture_usage(&src, TextureUsage::TRANSFER_SRC)?;
                check_buffer_usage(&dst, BufferUsage::TRANSFER_DST)?;
                let ranges = texture_regions(&src, &dst, &regions)?;
                self.tracker.transition(&src, &ranges, ImageLayout::TransferSrc, &mut self.barriers)?;
                self.flush_barriers(cmd)?;
                self.device.backend.cmd_copy_texture_to_buffer(cmd, src.handle(), dst.handle(), &regions);
                self.used.buffers.push(dst);
            }
            CopyCommand::Resolve { .. } | CopyCommand::Blit { .. } => {
                let message = format!("{} copies are not supported", kind);
                crate::ferrite_error!("ferrite::recorder", "{}", message);
                return Err(Error::UnsupportedOperation(message));
            }
        }
        Ok(())
    }
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        if let Some(cmd) = self.cmd.take() {
            if self.worker.is_current() {
                if let Err(err) = self.pool.recycle(&self.worker, cmd) {
                    crate::ferrite_warn!("ferrite::recorder", "Command buffer not recycled: {}", err);
                }
            } else {
                crate::ferrite_warn!(
                    "ferrite::recorder",
                    "Recorder of worker #{} dropped on another thread, command buffer not recycled",
                    self.worker.id()
                );
            }
        }
        if let Err(err) = self.release_used() {
            crate::ferrite_warn!("ferrite::recorder", "Releasing recorder objects failed: {}", err);
        }
        if let Err(err) = self.device.command_pools.release(&self.worker) {
            crate::ferrite_warn!("ferrite::recorder", "Command pool of worker #{} not released: {}", self.worker.id(), err);
        }
    }
}

// ===== VALIDATION =====

fn validate_attachments(desc: &RenderPassDesc, color: &[Arc<Texture>], depth: Option<&Arc<Texture>>) -> Result<()> {
    if desc.attachment_count() == 0 {
        crate::ferrite_invalid!("ferrite::recorder", "Render pass without attachments");
    }
    if color.len() != desc.color_attachments.len() {
        crate::ferrite_invalid!(
            "ferrite::recorder",
            "Render pass declares {} color attachment(s), {} given",
            desc.color_attachments.len(), color.len()
        );
    }
    for (index, (texture, attachment)) in color.iter().zip(&desc.color_attachments).enumerate() {
        let texture_desc = texture.desc();
        if texture_desc.format != attachment.format
            || !texture_desc.usage.contains(TextureUsage::COLOR_ATTACHMENT)
        {
            crate::ferrite_invalid!(
                "ferrite::recorder",
                "Color attachment {} ({:?}, {:?}) does not match {:?} attachment",
                index, texture_desc.format, texture_desc.usage, attachment.format
            );
        }
    }
    match (depth, &desc.depth_stencil_attachment) {
        (Some(texture), Some(attachment)) => {
            let texture_desc = texture.desc();
            if texture_desc.format != attachment.format
                || !texture_desc.usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT)
            {
                crate::ferrite_invalid!(
                    "ferrite::recorder",
                    "Depth attachment ({:?}, {:?}) does not match {:?} attachment",
                    texture_desc.format, texture_desc.usage, attachment.format
                );
            }
        }
        (None, None) => {}
        (given, declared) => {
            crate::ferrite_invalid!(
                "ferrite::recorder",
                "Depth attachment given: {}, declared: {}",
                given.is_some(), declared.is_some()
            );
        }
    }
    Ok(())
}

fn check_buffer_usage(buffer: &Buffer, usage: BufferUsage) -> Result<()> {
    if !buffer.desc().usage.contains(usage) {
        crate::ferrite_invalid!(
            "ferrite::recorder",
            "Buffer {:?} lacks {:?} usage",
            buffer.handle(), usage
        );
    }
    Ok(())
}

fn check_texture_usage(texture: &Texture, usage: TextureUsage) -> Result<()> {
    if !texture.desc().usage.contains(usage) {
        crate::ferrite_invalid!(
            "ferrite::recorder",
            "Texture {:?} lacks {:?} usage",
            texture.handle(), usage
        );
    }
    Ok(())
}

fn check_buffer_binding(buffer: &Buffer, offset: u64, usage: BufferUsage) -> Result<()> {
    check_buffer_usage(buffer, usage)?;
    if offset >= buffer.size() {
        crate::ferrite_invalid!(
            "ferrite::recorder",
            "Offset {} past the end of buffer {:?} ({} bytes)",
            offset, buffer.handle(), buffer.size()
        );
    }
    Ok(())
}

fn check_transfer_buffers(src: &Buffer, dst: &Buffer) -> Result<()> {
    check_buffer_usage(src, BufferUsage::TRANSFER_SRC)?;
    check_buffer_usage(dst, BufferUsage::TRANSFER_DST)
}

fn check_buffer_range(buffer: &Buffer, offset: u64, size: u64) -> Result<()> {
    let end = offset.checked_add(size);
    if size == 0 || end.map_or(true, |end| end > buffer.size()) {
        crate::ferrite_invalid!(
            "ferrite::recorder",
            "Copy range {}+{} outside buffer {:?} of {} bytes",
            offset, size, buffer.handle(), buffer.size()
        );
    }
    Ok(())
}

/// Layout-grid ranges touched by buffer/texture copy regions
///
/// Checks every region against the texture extent and the buffer size.
fn texture_regions(
    texture: &Texture,
    buffer: &Buffer,
    regions: &[BufferTextureCopyRegion],
) -> Result<Vec<SubresourceRange>> {
    if regions.is_empty() {
        crate::ferrite_invalid!("ferrite::recorder", "Texture copy without regions");
    }
    let desc = texture.desc();
    let mut ranges = Vec::with_capacity(regions.len());

    for region in regions {
        if region.mip_level >= desc.mip_levels {
            crate::ferrite_invalid!(
                "ferrite::recorder",
                "Copy mip level {} outside texture {:?} ({} mips)",
                region.mip_level, texture.handle(), desc.mip_levels
            );
        }
        let mip_size = |size: u32| u64::from((size >> region.mip_level).max(1));
        let [x, y, z] = region.texture_offset;
        let [width, height, depth] = region.texture_extent;
        let fits = |offset: i32, extent: u32, size: u32| {
            offset >= 0 && extent > 0 && offset as u64 + u64::from(extent) <= mip_size(size)
        };
        if !fits(x, width, desc.extent.width)
            || !fits(y, height, desc.extent.height)
            || !fits(z, depth, desc.extent.depth)
        {
            crate::ferrite_invalid!(
                "ferrite::recorder",
                "Copy box {:?}+{:?} outside mip {} of texture {:?}",
                region.texture_offset, region.texture_extent, region.mip_level, texture.handle()
            );
        }

        let layers = match desc.dimension {
            TextureDimension::D3 => 1,
            _ => region.layer_count,
        };
        let row = u64::from(region.buffer_row_length.max(width));
        let bytes = row * u64::from(height) * u64::from(depth) * u64::from(layers)
            * u64::from(desc.format.texel_size());
        check_buffer_range(buffer, region.buffer_offset, bytes)?;

        ranges.push(match desc.dimension {
            TextureDimension::D3 => SubresourceRange::new(region.mip_level, 1, z as u32, depth),
            _ => SubresourceRange::new(region.mip_level, 1, region.base_layer, region.layer_count),
        });
    }
    Ok(ranges)
}

#[cfg(test)]
#[path = "command_recorder_tests.rs"]
mod tests;
