/// Conversions from ferrite descriptors to Vulkan enums and flags
///
/// Pure functions, testable without a GPU.

use ash::vk;
use ferrite_gpu::ferrite::backend::{ClearValue, IndexType, MemoryUsage, PipelineBindPoint, Rect2D, Viewport};
use ferrite_gpu::ferrite::pipeline::{
    BlendFactor, BlendOp, ColorWriteMask, CompareOp, CullMode, DescriptorType, FrontFace, LoadOp,
    PolygonMode, PrimitiveTopology, StoreOp, VertexFormat, VertexInputRate,
};
use ferrite_gpu::ferrite::resource::{
    AddressMode, BufferUsage, Filter, ImageAspect, MipmapMode, ShaderStage, ShaderStages,
    SubresourceRange, TextureDimension, TextureFormat, TextureUsage,
};
use ferrite_gpu::ferrite::sync::{AccessFlags, ImageLayout, PipelineStages};
use gpu_allocator::MemoryLocation;

// ===== FORMATS =====

pub fn format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8_UNORM => vk::Format::R8_UNORM,
        TextureFormat::R8G8_UNORM => vk::Format::R8G8_UNORM,
        TextureFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        TextureFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::D16_UNORM => vk::Format::D16_UNORM,
        TextureFormat::D32_SFLOAT => vk::Format::D32_SFLOAT,
        TextureFormat::D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::D32_SFLOAT_S8_UINT => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

pub fn vertex_format_to_vk(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float32 => vk::Format::R32_SFLOAT,
        VertexFormat::Float32x2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float32x3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float32x4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexFormat::Uint32 => vk::Format::R32_UINT,
        VertexFormat::Uint32x2 => vk::Format::R32G32_UINT,
        VertexFormat::Sint32 => vk::Format::R32_SINT,
        VertexFormat::Unorm8x4 => vk::Format::R8G8B8A8_UNORM,
        VertexFormat::Uint8x4 => vk::Format::R8G8B8A8_UINT,
    }
}

pub fn input_rate_to_vk(rate: VertexInputRate) -> vk::VertexInputRate {
    match rate {
        VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
        VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
    }
}

pub fn sample_count_to_vk(samples: u32) -> vk::SampleCountFlags {
    match samples {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

// ===== IMAGES =====

pub fn image_type_to_vk(dimension: TextureDimension) -> vk::ImageType {
    match dimension {
        TextureDimension::D1 => vk::ImageType::TYPE_1D,
        TextureDimension::D2 => vk::ImageType::TYPE_2D,
        TextureDimension::D3 => vk::ImageType::TYPE_3D,
    }
}

/// View type of the default view: array views whenever more than one layer exists
pub fn view_type_to_vk(dimension: TextureDimension, array_layers: u32) -> vk::ImageViewType {
    match (dimension, array_layers > 1) {
        (TextureDimension::D1, false) => vk::ImageViewType::TYPE_1D,
        (TextureDimension::D1, true) => vk::ImageViewType::TYPE_1D_ARRAY,
        (TextureDimension::D2, false) => vk::ImageViewType::TYPE_2D,
        (TextureDimension::D2, true) => vk::ImageViewType::TYPE_2D_ARRAY,
        (TextureDimension::D3, _) => vk::ImageViewType::TYPE_3D,
    }
}

pub fn texture_usage_to_vk(usage: TextureUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::TRANSFER_SRC) { flags |= vk::ImageUsageFlags::TRANSFER_SRC; }
    if usage.contains(TextureUsage::TRANSFER_DST) { flags |= vk::ImageUsageFlags::TRANSFER_DST; }
    if usage.contains(TextureUsage::SAMPLED) { flags |= vk::ImageUsageFlags::SAMPLED; }
    if usage.contains(TextureUsage::STORAGE) { flags |= vk::ImageUsageFlags::STORAGE; }
    if usage.contains(TextureUsage::COLOR_ATTACHMENT) { flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT; }
    if usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    flags
}

pub fn aspect_to_vk(aspect: ImageAspect) -> vk::ImageAspectFlags {
    let mut flags = vk::ImageAspectFlags::empty();
    if aspect.contains(ImageAspect::COLOR) { flags |= vk::ImageAspectFlags::COLOR; }
    if aspect.contains(ImageAspect::DEPTH) { flags |= vk::ImageAspectFlags::DEPTH; }
    if aspect.contains(ImageAspect::STENCIL) { flags |= vk::ImageAspectFlags::STENCIL; }
    flags
}

pub fn image_layout_to_vk(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    }
}

/// Subresource range of a barrier
///
/// The layout grid of a 3D texture spreads depth slices over the layer axis;
/// Vulkan transitions a 3D image as a whole, so the layer part collapses to
/// the single array layer.
pub fn subresource_range_to_vk(
    range: &SubresourceRange,
    aspect: ImageAspect,
    dimension: TextureDimension,
) -> vk::ImageSubresourceRange {
    let (base_array_layer, layer_count) = match dimension {
        TextureDimension::D3 => (0, 1),
        _ => (range.base_layer, range.layer_count),
    };
    vk::ImageSubresourceRange {
        aspect_mask: aspect_to_vk(aspect),
        base_mip_level: range.base_mip,
        level_count: range.mip_count,
        base_array_layer,
        layer_count,
    }
}

// ===== SYNCHRONIZATION =====

pub fn pipeline_stages_to_vk(stages: PipelineStages) -> vk::PipelineStageFlags {
    const PAIRS: [(PipelineStages, vk::PipelineStageFlags); 12] = [
        (PipelineStages::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
        (PipelineStages::DRAW_INDIRECT, vk::PipelineStageFlags::DRAW_INDIRECT),
        (PipelineStages::VERTEX_INPUT, vk::PipelineStageFlags::VERTEX_INPUT),
        (PipelineStages::VERTEX_SHADER, vk::PipelineStageFlags::VERTEX_SHADER),
        (PipelineStages::FRAGMENT_SHADER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        (PipelineStages::EARLY_FRAGMENT_TESTS, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS),
        (PipelineStages::LATE_FRAGMENT_TESTS, vk::PipelineStageFlags::LATE_FRAGMENT_TESTS),
        (PipelineStages::COLOR_ATTACHMENT_OUTPUT, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT),
        (PipelineStages::COMPUTE_SHADER, vk::PipelineStageFlags::COMPUTE_SHADER),
        (PipelineStages::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        (PipelineStages::BOTTOM_OF_PIPE, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
        (PipelineStages::ALL_COMMANDS, vk::PipelineStageFlags::ALL_COMMANDS),
    ];
    PAIRS
        .iter()
        .filter(|(ours, _)| stages.contains(*ours))
        .fold(vk::PipelineStageFlags::empty(), |flags, (_, theirs)| flags | *theirs)
}

pub fn access_flags_to_vk(access: AccessFlags) -> vk::AccessFlags {
    const PAIRS: [(AccessFlags, vk::AccessFlags); 10] = [
        (AccessFlags::SHADER_READ, vk::AccessFlags::SHADER_READ),
        (AccessFlags::SHADER_WRITE, vk::AccessFlags::SHADER_WRITE),
        (AccessFlags::COLOR_ATTACHMENT_READ, vk::AccessFlags::COLOR_ATTACHMENT_READ),
        (AccessFlags::COLOR_ATTACHMENT_WRITE, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
        (AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ),
        (AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
        (AccessFlags::TRANSFER_READ, vk::AccessFlags::TRANSFER_READ),
        (AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_WRITE),
        (AccessFlags::MEMORY_READ, vk::AccessFlags::MEMORY_READ),
        (AccessFlags::MEMORY_WRITE, vk::AccessFlags::MEMORY_WRITE),
    ];
    PAIRS
        .iter()
        .filter(|(ours, _)| access.contains(*ours))
        .fold(vk::AccessFlags::empty(), |flags, (_, theirs)| flags | *theirs)
}

// ===== BUFFERS / MEMORY =====

pub fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::TRANSFER_SRC) { flags |= vk::BufferUsageFlags::TRANSFER_SRC; }
    if usage.contains(BufferUsage::TRANSFER_DST) { flags |= vk::BufferUsageFlags::TRANSFER_DST; }
    if usage.contains(BufferUsage::UNIFORM) { flags |= vk::BufferUsageFlags::UNIFORM_BUFFER; }
    if usage.contains(BufferUsage::STORAGE) { flags |= vk::BufferUsageFlags::STORAGE_BUFFER; }
    if usage.contains(BufferUsage::VERTEX) { flags |= vk::BufferUsageFlags::VERTEX_BUFFER; }
    if usage.contains(BufferUsage::INDEX) { flags |= vk::BufferUsageFlags::INDEX_BUFFER; }
    if usage.contains(BufferUsage::INDIRECT) { flags |= vk::BufferUsageFlags::INDIRECT_BUFFER; }
    flags
}

pub fn memory_location(usage: MemoryUsage) -> MemoryLocation {
    match usage {
        MemoryUsage::GpuOnly => MemoryLocation::GpuOnly,
        MemoryUsage::CpuToGpu => MemoryLocation::CpuToGpu,
        MemoryUsage::GpuToCpu => MemoryLocation::GpuToCpu,
    }
}

pub fn index_type_to_vk(index_type: IndexType) -> vk::IndexType {
    match index_type {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
    }
}

// ===== SHADERS / DESCRIPTORS =====

pub fn shader_stage_to_vk(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

pub fn shader_stages_to_vk(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) { flags |= vk::ShaderStageFlags::VERTEX; }
    if stages.contains(ShaderStages::FRAGMENT) { flags |= vk::ShaderStageFlags::FRAGMENT; }
    if stages.contains(ShaderStages::COMPUTE) { flags |= vk::ShaderStageFlags::COMPUTE; }
    flags
}

pub fn descriptor_type_to_vk(descriptor_type: DescriptorType) -> vk::DescriptorType {
    match descriptor_type {
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorType::SampledTexture => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorType::StorageTexture => vk::DescriptorType::STORAGE_IMAGE,
    }
}

pub fn bind_point_to_vk(bind_point: PipelineBindPoint) -> vk::PipelineBindPoint {
    match bind_point {
        PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
        PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
    }
}

// ===== SAMPLERS =====

pub fn filter_to_vk(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub fn mipmap_mode_to_vk(mode: MipmapMode) -> vk::SamplerMipmapMode {
    match mode {
        MipmapMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        MipmapMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn address_mode_to_vk(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

// ===== RENDER PASSES =====

pub fn load_op_to_vk(load_op: LoadOp) -> vk::AttachmentLoadOp {
    match load_op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub fn store_op_to_vk(store_op: StoreOp) -> vk::AttachmentStoreOp {
    match store_op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn clear_value_to_vk(value: &ClearValue) -> vk::ClearValue {
    match *value {
        ClearValue::Color(color) => vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        },
    }
}

pub fn viewport_to_vk(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

pub fn rect_to_vk(rect: &Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: rect.x, y: rect.y },
        extent: vk::Extent2D { width: rect.width, height: rect.height },
    }
}

// ===== PIPELINE STATE =====

pub fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

pub fn polygon_mode_to_vk(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

pub fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub fn front_face_to_vk(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn blend_factor_to_vk(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
    }
}

pub fn blend_op_to_vk(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

pub fn color_write_mask_to_vk(mask: ColorWriteMask) -> vk::ColorComponentFlags {
    let mut flags = vk::ColorComponentFlags::empty();
    if mask.contains(ColorWriteMask::R) { flags |= vk::ColorComponentFlags::R; }
    if mask.contains(ColorWriteMask::G) { flags |= vk::ColorComponentFlags::G; }
    if mask.contains(ColorWriteMask::B) { flags |= vk::ColorComponentFlags::B; }
    if mask.contains(ColorWriteMask::A) { flags |= vk::ColorComponentFlags::A; }
    flags
}

#[cfg(test)]
#[path = "vulkan_conversions_tests.rs"]
mod tests;
