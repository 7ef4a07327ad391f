/// VulkanBackend - ferrite `Backend` implementation over ash
///
/// Ferrite handles carry the raw Vulkan handle. Textures are keyed by their
/// `VkImage`; the default view and the creation descriptor live in a registry
/// next to it.

use ash::vk;
use ash::vk::Handle;
use rustc_hash::FxHashMap;
use std::ffi::CString;
use std::sync::{Arc, Mutex, MutexGuard};
use ferrite_gpu::ferrite::backend::{
    Backend, BufferCopyRegion, BufferHandle, BufferTextureCopyRegion, ClearValue, CommandBufferHandle,
    CommandPoolHandle, DescriptorPoolHandle, DescriptorResource, DescriptorSetHandle, DescriptorWrite,
    FenceHandle, FramebufferHandle, IndexType, MemoryAllocation, MemoryRequirements, PipelineBindPoint,
    PipelineHandle, PipelineLayoutHandle, Rect2D, RenderPassHandle, SamplerHandle, SetLayoutHandle,
    ShaderModuleHandle, TextureHandle, Viewport,
};
use ferrite_gpu::ferrite::pipeline::{
    AttachmentDesc, BindingLayoutDesc, ComputePipelineState, DescriptorPoolSize, FramebufferKey,
    PipelineState, PushConstantRange, RenderPassDesc,
};
use ferrite_gpu::ferrite::resource::{BufferDesc, ImageAspect, SamplerDesc, ShaderStages, TextureDesc, TextureUsage};
use ferrite_gpu::ferrite::sync::{FenceStatus, ImageBarrier, ImageLayout, Timeout};
use ferrite_gpu::ferrite::{Error, Result};
use ferrite_gpu::{ferrite_debug, ferrite_err, ferrite_invalid, ferrite_trace, ferrite_warn};

use crate::vulkan_context::VulkanContext;
use crate::vulkan_conversions as conv;

/// Image, default view and descriptor of one texture
struct TextureEntry {
    image: vk::Image,
    /// Null until memory is bound
    view: vk::ImageView,
    desc: TextureDesc,
}

/// Vulkan backend
pub struct VulkanBackend {
    textures: Mutex<FxHashMap<u64, TextureEntry>>,
    /// Transient pool for one-shot work recorded by the backend itself
    upload_pool: Mutex<vk::CommandPool>,
    ctx: Arc<VulkanContext>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::BackendFailure(format!("{} lock poisoned", what)))
}

fn raw<H: Handle>(value: u64) -> H {
    H::from_raw(value)
}

/// Pool and memory limits are recoverable (the caller may open another pool)
fn pool_error(operation: &str, e: vk::Result) -> Error {
    match e {
        vk::Result::ERROR_OUT_OF_POOL_MEMORY
        | vk::Result::ERROR_FRAGMENTED_POOL
        | vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            ferrite_debug!("ferrite::vulkan", "{} exhausted: {:?}", operation, e);
            Error::ResourceExhausted(format!("{}: {:?}", operation, e))
        }
        _ => ferrite_err!("ferrite::vulkan", "{} failed: {:?}", operation, e),
    }
}

fn requirements(req: vk::MemoryRequirements, linear: bool) -> MemoryRequirements {
    MemoryRequirements {
        size: req.size,
        alignment: req.alignment,
        memory_type_bits: req.memory_type_bits,
        linear,
    }
}

fn attachment_to_vk(attachment: &AttachmentDesc, layout: vk::ImageLayout) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(conv::format_to_vk(attachment.format))
        .samples(conv::sample_count_to_vk(attachment.samples))
        .load_op(conv::load_op_to_vk(attachment.load_op))
        .store_op(conv::store_op_to_vk(attachment.store_op))
        .stencil_load_op(conv::load_op_to_vk(attachment.stencil_load_op))
        .stencil_store_op(conv::store_op_to_vk(attachment.stencil_store_op))
        .initial_layout(layout)
        .final_layout(layout)
}

fn buffer_image_copy(region: &BufferTextureCopyRegion) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: region.buffer_offset,
        buffer_row_length: region.buffer_row_length,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: conv::aspect_to_vk(region.aspect),
            mip_level: region.mip_level,
            base_array_layer: region.base_layer,
            layer_count: region.layer_count,
        },
        image_offset: vk::Offset3D {
            x: region.texture_offset[0],
            y: region.texture_offset[1],
            z: region.texture_offset[2],
        },
        image_extent: vk::Extent3D {
            width: region.texture_extent[0],
            height: region.texture_extent[1],
            depth: region.texture_extent[2],
        },
    }
}

impl VulkanBackend {
    pub fn new(ctx: Arc<VulkanContext>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(ctx.queue_family);
        let upload_pool = unsafe { ctx.device.create_command_pool(&pool_info, None) }
            .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create upload command pool: {:?}", e))?;

        Ok(Self {
            textures: Mutex::new(FxHashMap::default()),
            upload_pool: Mutex::new(upload_pool),
            ctx,
        })
    }

    pub fn context(&self) -> &Arc<VulkanContext> {
        &self.ctx
    }

    fn device(&self) -> &ash::Device {
        &self.ctx.device
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.textures.lock().map(|textures| textures.len()).unwrap_or(0)
    }

    /// Record `record` into a transient command buffer, submit it and wait for completion
    fn one_shot(&self, record: impl FnOnce(vk::CommandBuffer) -> Result<()>) -> Result<()> {
        let device = self.device();
        let pool = lock(&self.upload_pool, "upload pool")?;

        unsafe {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let cmd = device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to allocate upload command buffer: {:?}", e))?
                .first()
                .copied()
                .ok_or_else(|| Error::BackendFailure("no upload command buffer allocated".to_string()))?;

            let result = self.submit_and_wait(cmd, record);
            device.free_command_buffers(*pool, &[cmd]);
            result
        }
    }

    unsafe fn submit_and_wait(
        &self,
        cmd: vk::CommandBuffer,
        record: impl FnOnce(vk::CommandBuffer) -> Result<()>,
    ) -> Result<()> {
        let device = self.device();
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to begin upload command buffer: {:?}", e))?;
        record(cmd)?;
        device
            .end_command_buffer(cmd)
            .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to end upload command buffer: {:?}", e))?;

        let fence = device
            .create_fence(&vk::FenceCreateInfo::default(), None)
            .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create upload fence: {:?}", e))?;
        let submit_info = vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&cmd));
        let submitted = match self.ctx.queue() {
            Ok(queue) => device
                .queue_submit(*queue, &[submit_info], fence)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to submit upload commands: {:?}", e)),
            Err(err) => Err(err),
        };
        let result = submitted.and_then(|_| {
            device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to wait for upload fence: {:?}", e))
        });
        device.destroy_fence(fence, None);
        result
    }

    /// One `vkCmdPipelineBarrier` carrying every image barrier
    ///
    /// Slices of a 3D texture transition the whole image, so identical
    /// barriers are emitted once. Nothing is recorded if any barrier names an
    /// unknown texture.
    fn record_barriers(&self, cmd: vk::CommandBuffer, barriers: &[ImageBarrier]) -> Result<()> {
        if barriers.is_empty() {
            return Ok(());
        }
        let textures = lock(&self.textures, "texture registry")?;

        let mut src_stages = vk::PipelineStageFlags::empty();
        let mut dst_stages = vk::PipelineStageFlags::empty();
        let mut emitted = Vec::with_capacity(barriers.len());
        let mut image_barriers = Vec::with_capacity(barriers.len());

        for barrier in barriers {
            let Some(entry) = textures.get(&barrier.texture.raw()) else {
                ferrite_invalid!("ferrite::vulkan", "Barrier on unknown texture {:#x}", barrier.texture.raw());
            };
            let range = conv::subresource_range_to_vk(&barrier.range, barrier.aspect, entry.desc.dimension);
            let old_layout = conv::image_layout_to_vk(barrier.old_layout);
            let new_layout = conv::image_layout_to_vk(barrier.new_layout);
            let key = (
                entry.image.as_raw(),
                range.base_mip_level,
                range.level_count,
                range.base_array_layer,
                range.layer_count,
                old_layout,
                new_layout,
            );
            if emitted.contains(&key) {
                continue;
            }
            emitted.push(key);

            src_stages |= conv::pipeline_stages_to_vk(barrier.src.stages);
            dst_stages |= conv::pipeline_stages_to_vk(barrier.dst.stages);
            image_barriers.push(
                vk::ImageMemoryBarrier::default()
                    .src_access_mask(conv::access_flags_to_vk(barrier.src.access))
                    .dst_access_mask(conv::access_flags_to_vk(barrier.dst.access))
                    .old_layout(old_layout)
                    .new_layout(new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(entry.image)
                    .subresource_range(range),
            );
        }
        drop(textures);

        if src_stages.is_empty() {
            src_stages = vk::PipelineStageFlags::TOP_OF_PIPE;
        }
        if dst_stages.is_empty() {
            dst_stages = vk::PipelineStageFlags::BOTTOM_OF_PIPE;
        }

        unsafe {
            self.device().cmd_pipeline_barrier(
                cmd,
                src_stages,
                dst_stages,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &image_barriers,
            );
        }
        Ok(())
    }
}

impl Backend for VulkanBackend {
    // ===== RESOURCES =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<(BufferHandle, MemoryRequirements)> {
        unsafe {
            let info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(conv::buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let buffer = self
                .device()
                .create_buffer(&info, None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create buffer: {:?}", e))?;
            let req = self.device().get_buffer_memory_requirements(buffer);
            ferrite_trace!("ferrite::vulkan", "Created buffer of {} bytes ({:?})", desc.size, desc.usage);
            Ok((BufferHandle(buffer.as_raw()), requirements(req, true)))
        }
    }

    fn bind_buffer_memory(&self, buffer: BufferHandle, memory: &MemoryAllocation) -> Result<()> {
        unsafe {
            self.device()
                .bind_buffer_memory(raw(buffer.raw()), raw(memory.handle.raw()), memory.offset)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to bind buffer memory: {:?}", e))
        }
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        unsafe {
            self.device().destroy_buffer(raw(buffer.raw()), None);
        }
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<(TextureHandle, MemoryRequirements)> {
        let mut textures = lock(&self.textures, "texture registry")?;
        unsafe {
            let info = vk::ImageCreateInfo::default()
                .image_type(conv::image_type_to_vk(desc.dimension))
                .format(conv::format_to_vk(desc.format))
                .extent(vk::Extent3D {
                    width: desc.extent.width,
                    height: desc.extent.height,
                    depth: desc.extent.depth,
                })
                .mip_levels(desc.mip_levels)
                .array_layers(desc.array_layers)
                .samples(conv::sample_count_to_vk(desc.samples))
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(conv::texture_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = self
                .device()
                .create_image(&info, None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create image: {:?}", e))?;
            let req = self.device().get_image_memory_requirements(image);

            textures.insert(
                image.as_raw(),
                TextureEntry {
                    image,
                    view: vk::ImageView::null(),
                    desc: desc.clone(),
                },
            );
            ferrite_debug!(
                "ferrite::vulkan",
                "Created texture {}x{}x{} {:?} ({} mips, {} layers)",
                desc.extent.width,
                desc.extent.height,
                desc.extent.depth,
                desc.format,
                desc.mip_levels,
                desc.array_layers
            );
            Ok((TextureHandle(image.as_raw()), requirements(req, false)))
        }
    }

    fn bind_texture_memory(
        &self,
        texture: TextureHandle,
        memory: &MemoryAllocation,
        initial_layout: ImageLayout,
    ) -> Result<()> {
        let (image, desc) = {
            let textures = lock(&self.textures, "texture registry")?;
            let found = textures.get(&texture.raw()).map(|entry| (entry.image, entry.desc.clone()));
            match found {
                Some(found) => found,
                None => ferrite_invalid!("ferrite::vulkan", "bind of unknown texture {:#x}", texture.raw()),
            }
        };

        let aspect = if desc.format.is_depth() && desc.usage.contains(TextureUsage::SAMPLED) {
            ImageAspect::DEPTH
        } else {
            desc.format.aspect()
        };

        let view = unsafe {
            self.device()
                .bind_image_memory(image, raw(memory.handle.raw()), memory.offset)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to bind image memory: {:?}", e))?;

            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(conv::view_type_to_vk(desc.dimension, desc.array_layers))
                .format(conv::format_to_vk(desc.format))
                .subresource_range(conv::subresource_range_to_vk(&desc.full_range(), aspect, desc.dimension));
            self.device()
                .create_image_view(&view_info, None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create image view: {:?}", e))?
        };

        if let Some(entry) = lock(&self.textures, "texture registry")?.get_mut(&texture.raw()) {
            entry.view = view;
        }

        if initial_layout == ImageLayout::Undefined {
            return Ok(());
        }
        let barrier = ImageBarrier::new(
            texture,
            desc.format.aspect(),
            desc.full_range(),
            ImageLayout::Undefined,
            initial_layout,
        );
        self.one_shot(|cmd| self.record_barriers(cmd, std::slice::from_ref(&barrier)))
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        let entry = match self.textures.lock() {
            Ok(mut textures) => textures.remove(&texture.raw()),
            Err(_) => None,
        };
        let Some(entry) = entry else {
            ferrite_warn!("ferrite::vulkan", "destroy of unknown texture {:#x}", texture.raw());
            return;
        };
        unsafe {
            if entry.view != vk::ImageView::null() {
                self.device().destroy_image_view(entry.view, None);
            }
            self.device().destroy_image(entry.image, None);
        }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let mut info = vk::SamplerCreateInfo::default()
            .mag_filter(conv::filter_to_vk(desc.mag_filter))
            .min_filter(conv::filter_to_vk(desc.min_filter))
            .mipmap_mode(conv::mipmap_mode_to_vk(desc.mipmap_mode))
            .address_mode_u(conv::address_mode_to_vk(desc.address_u))
            .address_mode_v(conv::address_mode_to_vk(desc.address_v))
            .address_mode_w(conv::address_mode_to_vk(desc.address_w))
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);

        if let Some(level) = desc.max_anisotropy {
            if level > 1 && self.ctx.features.sampler_anisotropy == vk::TRUE {
                info = info.anisotropy_enable(true).max_anisotropy(f32::from(level));
            }
        }

        unsafe {
            let sampler = self
                .device()
                .create_sampler(&info, None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create sampler: {:?}", e))?;
            Ok(SamplerHandle(sampler.as_raw()))
        }
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        unsafe {
            self.device().destroy_sampler(raw(sampler.raw()), None);
        }
    }

    fn create_shader_module(&self, code: &[u32]) -> Result<ShaderModuleHandle> {
        unsafe {
            let info = vk::ShaderModuleCreateInfo::default().code(code);
            let module = self
                .device()
                .create_shader_module(&info, None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create shader module: {:?}", e))?;
            Ok(ShaderModuleHandle(module.as_raw()))
        }
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        unsafe {
            self.device().destroy_shader_module(raw(module.raw()), None);
        }
    }

    // ===== LAYOUTS, PASSES, PIPELINES =====

    fn create_set_layout(&self, desc: &BindingLayoutDesc) -> Result<SetLayoutHandle> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .entries()
            .iter()
            .map(|decl| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(decl.binding)
                    .descriptor_type(conv::descriptor_type_to_vk(decl.descriptor_type))
                    .descriptor_count(decl.count)
                    .stage_flags(conv::shader_stages_to_vk(decl.stages))
            })
            .collect();

        unsafe {
            let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            let layout = self
                .device()
                .create_descriptor_set_layout(&info, None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create descriptor set layout: {:?}", e))?;
            Ok(SetLayoutHandle(layout.as_raw()))
        }
    }

    fn destroy_set_layout(&self, layout: SetLayoutHandle) {
        unsafe {
            self.device().destroy_descriptor_set_layout(raw(layout.raw()), None);
        }
    }

    fn create_pipeline_layout(
        &self,
        set_layout: SetLayoutHandle,
        push_constants: &[PushConstantRange],
    ) -> Result<PipelineLayoutHandle> {
        let set_layouts: Vec<vk::DescriptorSetLayout> = if set_layout.is_null() {
            Vec::new()
        } else {
            vec![raw(set_layout.raw())]
        };
        let ranges: Vec<vk::PushConstantRange> = push_constants
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: conv::shader_stages_to_vk(range.stages),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        unsafe {
            let info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&set_layouts)
                .push_constant_ranges(&ranges);
            let layout = self
                .device()
                .create_pipeline_layout(&info, None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create pipeline layout: {:?}", e))?;
            Ok(PipelineLayoutHandle(layout.as_raw()))
        }
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        unsafe {
            self.device().destroy_pipeline_layout(raw(layout.raw()), None);
        }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        // Attachments enter and leave the pass in their attachment layout;
        // every other transition is an explicit barrier
        let mut attachments: Vec<vk::AttachmentDescription> = desc
            .color_attachments
            .iter()
            .map(|attachment| attachment_to_vk(attachment, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
            .collect();
        let color_refs: Vec<vk::AttachmentReference> = (0..attachments.len() as u32)
            .map(|i| {
                vk::AttachmentReference::default()
                    .attachment(i)
                    .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            })
            .collect();

        let depth_ref = desc.depth_stencil_attachment.as_ref().map(|depth| {
            let index = attachments.len() as u32;
            attachments.push(attachment_to_vk(depth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));
            vk::AttachmentReference::default()
                .attachment(index)
                .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(ref depth_ref) = depth_ref {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let (stage_mask, access_mask) = if depth_ref.is_some() {
            (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
        } else {
            (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )
        };
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stage_mask)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stage_mask)
            .dst_access_mask(access_mask);

        unsafe {
            let info = vk::RenderPassCreateInfo::default()
                .attachments(&attachments)
                .subpasses(std::slice::from_ref(&subpass))
                .dependencies(std::slice::from_ref(&dependency));
            let render_pass = self
                .device()
                .create_render_pass(&info, None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create render pass: {:?}", e))?;
            Ok(RenderPassHandle(render_pass.as_raw()))
        }
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        unsafe {
            self.device().destroy_render_pass(raw(render_pass.raw()), None);
        }
    }

    fn create_framebuffer(&self, key: &FramebufferKey) -> Result<FramebufferHandle> {
        let views: Option<Vec<vk::ImageView>> = {
            let textures = lock(&self.textures, "texture registry")?;
            let views = key
                .attachments
                .iter()
                .map(|texture| {
                    textures
                        .get(&texture.raw())
                        .map(|entry| entry.view)
                        .filter(|view| *view != vk::ImageView::null())
                })
                .collect();
            views
        };
        let Some(views) = views else {
            ferrite_invalid!("ferrite::vulkan", "framebuffer attachment is unknown or has no memory bound");
        };

        unsafe {
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(raw(key.render_pass.raw()))
                .attachments(&views)
                .width(key.width)
                .height(key.height)
                .layers(1);
            let framebuffer = self
                .device()
                .create_framebuffer(&info, None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create framebuffer: {:?}", e))?;
            Ok(FramebufferHandle(framebuffer.as_raw()))
        }
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        unsafe {
            self.device().destroy_framebuffer(raw(framebuffer.raw()), None);
        }
    }

    fn create_graphics_pipeline(&self, state: &PipelineState) -> Result<PipelineHandle> {
        let entry_points = state
            .shader_stages()
            .iter()
            .map(|stage| CString::new(stage.entry_point.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidUsage("shader entry point contains a NUL byte".to_string()))?;
        let stages: Vec<vk::PipelineShaderStageCreateInfo> = state
            .shader_stages()
            .iter()
            .zip(&entry_points)
            .map(|(stage, name)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(conv::shader_stage_to_vk(stage.stage))
                    .module(raw(stage.module.raw()))
                    .name(name)
            })
            .collect();

        // Vertex input
        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = state
            .vertex_layouts()
            .iter()
            .map(|layout| vk::VertexInputBindingDescription {
                binding: layout.binding,
                stride: layout.stride,
                input_rate: conv::input_rate_to_vk(layout.input_rate),
            })
            .collect();
        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = state
            .vertex_layouts()
            .iter()
            .flat_map(|layout| {
                layout.attributes.iter().map(move |attribute| vk::VertexInputAttributeDescription {
                    location: attribute.location,
                    binding: layout.binding,
                    format: conv::vertex_format_to_vk(attribute.format),
                    offset: attribute.offset,
                })
            })
            .collect();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly = state.input_assembly();
        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(conv::topology_to_vk(input_assembly.topology))
            .primitive_restart_enable(input_assembly.primitive_restart);

        // Viewports and scissors are dynamic, only their count is baked
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(state.viewport_count())
            .scissor_count(state.viewport_count());

        let rasterization = state.rasterization();
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(rasterization.depth_clamp)
            .rasterizer_discard_enable(false)
            .polygon_mode(conv::polygon_mode_to_vk(rasterization.polygon_mode))
            .cull_mode(conv::cull_mode_to_vk(rasterization.cull_mode))
            .front_face(conv::front_face_to_vk(rasterization.front_face))
            .line_width(1.0);

        let multisample = state.multisample();
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(conv::sample_count_to_vk(multisample.samples))
            .sample_shading_enable(false)
            .alpha_to_coverage_enable(multisample.alpha_to_coverage);

        let depth_stencil = state.depth_stencil();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_stencil.depth_test)
            .depth_write_enable(depth_stencil.depth_write)
            .depth_compare_op(conv::compare_op_to_vk(depth_stencil.compare_op))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(depth_stencil.stencil_test);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = state
            .blend()
            .attachments
            .iter()
            .map(|blend| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(blend.enabled)
                    .src_color_blend_factor(conv::blend_factor_to_vk(blend.src_color))
                    .dst_color_blend_factor(conv::blend_factor_to_vk(blend.dst_color))
                    .color_blend_op(conv::blend_op_to_vk(blend.color_op))
                    .src_alpha_blend_factor(conv::blend_factor_to_vk(blend.src_alpha))
                    .dst_alpha_blend_factor(conv::blend_factor_to_vk(blend.dst_alpha))
                    .alpha_blend_op(conv::blend_op_to_vk(blend.alpha_op))
                    .color_write_mask(conv::color_write_mask_to_vk(blend.write_mask))
            })
            .collect();
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(raw(state.layout().raw()))
            .render_pass(raw(state.render_pass().raw()))
            .subpass(0);

        unsafe {
            let pipelines = self
                .device()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
                .map_err(|(_, e)| ferrite_err!("ferrite::vulkan", "Failed to create graphics pipeline: {:?}", e))?;
            let pipeline = pipelines
                .first()
                .copied()
                .ok_or_else(|| Error::BackendFailure("no graphics pipeline created".to_string()))?;
            ferrite_debug!(
                "ferrite::vulkan",
                "Created graphics pipeline ({} stages, {} vertex bindings)",
                stages.len(),
                vertex_bindings.len()
            );
            Ok(PipelineHandle(pipeline.as_raw()))
        }
    }

    fn create_compute_pipeline(&self, state: &ComputePipelineState) -> Result<PipelineHandle> {
        let name = CString::new(state.shader.entry_point.as_str())
            .map_err(|_| Error::InvalidUsage("shader entry point contains a NUL byte".to_string()))?;
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(conv::shader_stage_to_vk(state.shader.stage))
            .module(raw(state.shader.module.raw()))
            .name(&name);
        let info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(raw(state.layout.raw()));

        unsafe {
            let pipelines = self
                .device()
                .create_compute_pipelines(vk::PipelineCache::null(), &[info], None)
                .map_err(|(_, e)| ferrite_err!("ferrite::vulkan", "Failed to create compute pipeline: {:?}", e))?;
            let pipeline = pipelines
                .first()
                .copied()
                .ok_or_else(|| Error::BackendFailure("no compute pipeline created".to_string()))?;
            Ok(PipelineHandle(pipeline.as_raw()))
        }
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        unsafe {
            self.device().destroy_pipeline(raw(pipeline.raw()), None);
        }
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_pool(&self, max_sets: u32, sizes: &[DescriptorPoolSize]) -> Result<DescriptorPoolHandle> {
        let mut pool_sizes: Vec<vk::DescriptorPoolSize> = sizes
            .iter()
            .filter(|size| size.count > 0)
            .map(|size| vk::DescriptorPoolSize {
                ty: conv::descriptor_type_to_vk(size.descriptor_type),
                descriptor_count: size.count,
            })
            .collect();
        if pool_sizes.is_empty() {
            // At least one pool size is required
            pool_sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1,
            });
        }

        unsafe {
            let info = vk::DescriptorPoolCreateInfo::default()
                .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
                .max_sets(max_sets)
                .pool_sizes(&pool_sizes);
            let pool = self
                .device()
                .create_descriptor_pool(&info, None)
                .map_err(|e| pool_error("descriptor pool creation", e))?;
            ferrite_debug!("ferrite::vulkan", "Created descriptor pool for {} sets", max_sets);
            Ok(DescriptorPoolHandle(pool.as_raw()))
        }
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        unsafe {
            self.device().destroy_descriptor_pool(raw(pool.raw()), None);
        }
    }

    fn allocate_descriptor_set(&self, pool: DescriptorPoolHandle, layout: SetLayoutHandle) -> Result<DescriptorSetHandle> {
        let layouts = [raw::<vk::DescriptorSetLayout>(layout.raw())];
        unsafe {
            let info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(raw(pool.raw()))
                .set_layouts(&layouts);
            let sets = self
                .device()
                .allocate_descriptor_sets(&info)
                .map_err(|e| pool_error("descriptor set allocation", e))?;
            let set = sets
                .first()
                .copied()
                .ok_or_else(|| Error::BackendFailure("no descriptor set allocated".to_string()))?;
            Ok(DescriptorSetHandle(set.as_raw()))
        }
    }

    fn free_descriptor_set(&self, pool: DescriptorPoolHandle, set: DescriptorSetHandle) -> Result<()> {
        unsafe {
            self.device()
                .free_descriptor_sets(raw(pool.raw()), &[raw(set.raw())])
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to free descriptor set: {:?}", e))
        }
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) -> Result<()> {
        enum Info {
            Buffer(usize),
            Image(usize),
        }

        let textures = lock(&self.textures, "texture registry")?;

        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        let mut targets = Vec::with_capacity(writes.len());
        for write in writes {
            match &write.resource {
                DescriptorResource::Buffer { buffer, offset, size } => {
                    buffer_infos.push(vk::DescriptorBufferInfo {
                        buffer: raw(buffer.raw()),
                        offset: *offset,
                        range: *size,
                    });
                    targets.push((write, Info::Buffer(buffer_infos.len() - 1)));
                }
                DescriptorResource::Texture { texture, sampler, layout } => {
                    let view = textures.get(&texture.raw()).map(|entry| entry.view);
                    let Some(view) = view.filter(|view| *view != vk::ImageView::null()) else {
                        ferrite_invalid!(
                            "ferrite::vulkan",
                            "Descriptor write of unknown or unbound texture {:#x}",
                            texture.raw()
                        );
                    };
                    image_infos.push(vk::DescriptorImageInfo {
                        sampler: sampler.map(|s| raw(s.raw())).unwrap_or(vk::Sampler::null()),
                        image_view: view,
                        image_layout: conv::image_layout_to_vk(*layout),
                    });
                    targets.push((write, Info::Image(image_infos.len() - 1)));
                }
            }
        }
        drop(textures);

        let vk_writes: Vec<vk::WriteDescriptorSet> = targets
            .iter()
            .map(|(write, info)| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(raw(write.set.raw()))
                    .dst_binding(write.binding)
                    .descriptor_type(conv::descriptor_type_to_vk(write.descriptor_type));
                match info {
                    Info::Buffer(i) => base.buffer_info(std::slice::from_ref(&buffer_infos[*i])),
                    Info::Image(i) => base.image_info(std::slice::from_ref(&image_infos[*i])),
                }
            })
            .collect();

        unsafe {
            self.device().update_descriptor_sets(&vk_writes, &[]);
        }
        Ok(())
    }

    // ===== COMMAND BUFFERS =====

    fn create_command_pool(&self) -> Result<CommandPoolHandle> {
        unsafe {
            let info = vk::CommandPoolCreateInfo::default()
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                .queue_family_index(self.ctx.queue_family);
            let pool = self
                .device()
                .create_command_pool(&info, None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create command pool: {:?}", e))?;
            Ok(CommandPoolHandle(pool.as_raw()))
        }
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        unsafe {
            self.device().destroy_command_pool(raw(pool.raw()), None);
        }
    }

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        unsafe {
            let info = vk::CommandBufferAllocateInfo::default()
                .command_pool(raw(pool.raw()))
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let buffers = self
                .device()
                .allocate_command_buffers(&info)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to allocate command buffer: {:?}", e))?;
            let cmd = buffers
                .first()
                .copied()
                .ok_or_else(|| Error::BackendFailure("no command buffer allocated".to_string()))?;
            Ok(CommandBufferHandle(cmd.as_raw()))
        }
    }

    fn reset_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        unsafe {
            self.device()
                .reset_command_buffer(raw(cmd.raw()), vk::CommandBufferResetFlags::empty())
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to reset command buffer: {:?}", e))
        }
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        unsafe {
            let info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device()
                .begin_command_buffer(raw(cmd.raw()), &info)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to begin command buffer: {:?}", e))
        }
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        unsafe {
            self.device()
                .end_command_buffer(raw(cmd.raw()))
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to end command buffer: {:?}", e))
        }
    }

    // ===== RECORDING =====

    fn cmd_begin_render_pass(
        &self,
        cmd: CommandBufferHandle,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        render_area: Rect2D,
        clear_values: &[ClearValue],
    ) {
        let clears: Vec<vk::ClearValue> = clear_values.iter().map(conv::clear_value_to_vk).collect();
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(raw(render_pass.raw()))
            .framebuffer(raw(framebuffer.raw()))
            .render_area(conv::rect_to_vk(&render_area))
            .clear_values(&clears);
        unsafe {
            self.device()
                .cmd_begin_render_pass(raw(cmd.raw()), &info, vk::SubpassContents::INLINE);
        }
    }

    fn cmd_end_render_pass(&self, cmd: CommandBufferHandle) {
        unsafe {
            self.device().cmd_end_render_pass(raw(cmd.raw()));
        }
    }

    fn cmd_bind_pipeline(&self, cmd: CommandBufferHandle, bind_point: PipelineBindPoint, pipeline: PipelineHandle) {
        unsafe {
            self.device()
                .cmd_bind_pipeline(raw(cmd.raw()), conv::bind_point_to_vk(bind_point), raw(pipeline.raw()));
        }
    }

    fn cmd_set_viewports(&self, cmd: CommandBufferHandle, viewports: &[Viewport]) {
        let viewports: Vec<vk::Viewport> = viewports.iter().map(conv::viewport_to_vk).collect();
        unsafe {
            self.device().cmd_set_viewport(raw(cmd.raw()), 0, &viewports);
        }
    }

    fn cmd_set_scissors(&self, cmd: CommandBufferHandle, scissors: &[Rect2D]) {
        let scissors: Vec<vk::Rect2D> = scissors.iter().map(conv::rect_to_vk).collect();
        unsafe {
            self.device().cmd_set_scissor(raw(cmd.raw()), 0, &scissors);
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: CommandBufferHandle,
        bind_point: PipelineBindPoint,
        layout: PipelineLayoutHandle,
        set: DescriptorSetHandle,
    ) {
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                raw(cmd.raw()),
                conv::bind_point_to_vk(bind_point),
                raw(layout.raw()),
                0,
                &[raw(set.raw())],
                &[],
            );
        }
    }

    fn cmd_bind_vertex_buffer(&self, cmd: CommandBufferHandle, binding: u32, buffer: BufferHandle, offset: u64) {
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(raw(cmd.raw()), binding, &[raw(buffer.raw())], &[offset]);
        }
    }

    fn cmd_bind_index_buffer(&self, cmd: CommandBufferHandle, buffer: BufferHandle, offset: u64, index_type: IndexType) {
        unsafe {
            self.device().cmd_bind_index_buffer(
                raw(cmd.raw()),
                raw(buffer.raw()),
                offset,
                conv::index_type_to_vk(index_type),
            );
        }
    }

    fn cmd_push_constants(
        &self,
        cmd: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device().cmd_push_constants(
                raw(cmd.raw()),
                raw(layout.raw()),
                conv::shader_stages_to_vk(stages),
                offset,
                data,
            );
        }
    }

    fn cmd_draw(&self, cmd: CommandBufferHandle, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device()
                .cmd_draw(raw(cmd.raw()), vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    fn cmd_draw_indexed(
        &self,
        cmd: CommandBufferHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device().cmd_draw_indexed(
                raw(cmd.raw()),
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn cmd_dispatch(&self, cmd: CommandBufferHandle, x: u32, y: u32, z: u32) {
        unsafe {
            self.device().cmd_dispatch(raw(cmd.raw()), x, y, z);
        }
    }

    fn cmd_pipeline_barrier(&self, cmd: CommandBufferHandle, barriers: &[ImageBarrier]) -> Result<()> {
        self.record_barriers(raw(cmd.raw()), barriers)
    }

    fn cmd_copy_buffer(&self, cmd: CommandBufferHandle, src: BufferHandle, dst: BufferHandle, regions: &[BufferCopyRegion]) {
        let regions: Vec<vk::BufferCopy> = regions
            .iter()
            .map(|region| vk::BufferCopy {
                src_offset: region.src_offset,
                dst_offset: region.dst_offset,
                size: region.size,
            })
            .collect();
        unsafe {
            self.device()
                .cmd_copy_buffer(raw(cmd.raw()), raw(src.raw()), raw(dst.raw()), &regions);
        }
    }

    fn cmd_copy_buffer_to_texture(
        &self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        dst: TextureHandle,
        regions: &[BufferTextureCopyRegion],
    ) {
        let regions: Vec<vk::BufferImageCopy> = regions.iter().map(buffer_image_copy).collect();
        unsafe {
            self.device().cmd_copy_buffer_to_image(
                raw(cmd.raw()),
                raw(src.raw()),
                raw(dst.raw()),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            );
        }
    }

    fn cmd_copy_texture_to_buffer(
        &self,
        cmd: CommandBufferHandle,
        src: TextureHandle,
        dst: BufferHandle,
        regions: &[BufferTextureCopyRegion],
    ) {
        let regions: Vec<vk::BufferImageCopy> = regions.iter().map(buffer_image_copy).collect();
        unsafe {
            self.device().cmd_copy_image_to_buffer(
                raw(cmd.raw()),
                raw(src.raw()),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                raw(dst.raw()),
                &regions,
            );
        }
    }

    // ===== SUBMISSION =====

    fn submit(&self, cmd: CommandBufferHandle) -> Result<FenceHandle> {
        let queue = self.ctx.queue()?;
        unsafe {
            let fence = self
                .device()
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create fence: {:?}", e))?;
            let cmd: vk::CommandBuffer = raw(cmd.raw());
            let submit_info = vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&cmd));

            if let Err(e) = self.device().queue_submit(*queue, &[submit_info], fence) {
                self.device().destroy_fence(fence, None);
                return Err(ferrite_err!("ferrite::vulkan", "Failed to submit command buffer: {:?}", e));
            }
            Ok(FenceHandle(fence.as_raw()))
        }
    }

    fn wait_fence(&self, fence: FenceHandle, timeout: Timeout) -> Result<FenceStatus> {
        unsafe {
            match self
                .device()
                .wait_for_fences(&[raw(fence.raw())], true, timeout.as_nanos())
            {
                Ok(()) => Ok(FenceStatus::Signaled),
                Err(vk::Result::TIMEOUT) => Ok(FenceStatus::TimedOut),
                Err(e) => Err(ferrite_err!("ferrite::vulkan", "Failed to wait for fence: {:?}", e)),
            }
        }
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe {
            self.device().destroy_fence(raw(fence.raw()), None);
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();

            if let Ok(textures) = self.textures.get_mut() {
                if !textures.is_empty() {
                    ferrite_warn!("ferrite::vulkan", "{} texture(s) still alive at backend shutdown", textures.len());
                }
                for (_, entry) in textures.drain() {
                    if entry.view != vk::ImageView::null() {
                        self.ctx.device.destroy_image_view(entry.view, None);
                    }
                    self.ctx.device.destroy_image(entry.image, None);
                }
            }

            if let Ok(pool) = self.upload_pool.get_mut() {
                self.ctx.device.destroy_command_pool(*pool, None);
            }
        }
    }
}
