/// Pipeline descriptors and the pipeline state cache key
///
/// Applications bind a [`GraphicsPipelineDesc`]; at draw time the recorder
/// combines it with the active render pass, framebuffer, resolved pipeline layout
/// and viewport count into a [`PipelineState`], the key of the pipeline cache.

use bitflags::bitflags;
use crate::backend::{FramebufferHandle, PipelineHandle, PipelineLayoutHandle, RenderPassHandle};
use crate::pipeline::PipelineLayoutDesc;
use crate::resource::ShaderStageDesc;

// ===== VERTEX INPUT =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Uint32x2,
    Sint32,
    Unorm8x4,
    Uint8x4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Layout of one vertex buffer binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexBufferLayout {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexBufferLayout {
    pub fn new(binding: u32, stride: u32, input_rate: VertexInputRate, attributes: impl IntoIterator<Item = VertexAttribute>) -> Self {
        let mut attributes: Vec<VertexAttribute> = attributes.into_iter().collect();
        attributes.sort();
        Self { binding, stride, input_rate, attributes }
    }
}

// ===== FIXED FUNCTION STATE =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    SrcColor,
    OneMinusSrcColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
        const ALL = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputAssemblyState {
    pub topology: PrimitiveTopology,
    pub primitive_restart: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            primitive_restart: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizationState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_clamp: bool,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_clamp: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MultisampleState {
    pub samples: u32,
    pub alpha_to_coverage: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self { samples: 1, alpha_to_coverage: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare_op: CompareOp,
    pub stencil_test: bool,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            compare_op: CompareOp::Always,
            stencil_test: false,
        }
    }
}

impl DepthStencilState {
    /// Standard less-than depth testing with writes
    pub fn depth_less() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare_op: CompareOp::Less,
            stencil_test: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorBlendAttachment {
    pub enabled: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
    pub write_mask: ColorWriteMask,
}

impl ColorBlendAttachment {
    pub fn opaque() -> Self {
        Self {
            enabled: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: ColorWriteMask::ALL,
        }
    }

    pub fn alpha_blend() -> Self {
        Self {
            enabled: true,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::OneMinusSrcAlpha,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
            ..Self::opaque()
        }
    }
}

/// Per-attachment blend state, in color attachment order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BlendState {
    pub attachments: Vec<ColorBlendAttachment>,
}

// ===== PIPELINE DESCRIPTORS =====

/// Graphics pipeline as bound by the application
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineDesc {
    pub shader_stages: Vec<ShaderStageDesc>,
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub input_assembly: InputAssemblyState,
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,
    pub blend: BlendState,
    pub layout: PipelineLayoutDesc,
}

/// Compute pipeline as bound by the application
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineDesc {
    pub shader: ShaderStageDesc,
    pub layout: PipelineLayoutDesc,
}

/// Full draw-time configuration, key of compiled graphics pipelines
///
/// Vertex layouts and shader stages are stored sorted, so two states that list
/// the same entries in a different order are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineState {
    viewport_count: u32,
    shader_stages: Vec<ShaderStageDesc>,
    vertex_layouts: Vec<VertexBufferLayout>,
    input_assembly: InputAssemblyState,
    rasterization: RasterizationState,
    multisample: MultisampleState,
    depth_stencil: DepthStencilState,
    blend: BlendState,
    render_pass: RenderPassHandle,
    framebuffer: FramebufferHandle,
    layout: PipelineLayoutHandle,
}

impl PipelineState {
    pub fn new(
        desc: &GraphicsPipelineDesc,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        layout: PipelineLayoutHandle,
        viewport_count: u32,
    ) -> Self {
        let mut shader_stages = desc.shader_stages.clone();
        shader_stages.sort();
        let mut vertex_layouts = desc.vertex_layouts.clone();
        vertex_layouts.sort();
        vertex_layouts.dedup();

        Self {
            viewport_count,
            shader_stages,
            vertex_layouts,
            input_assembly: desc.input_assembly,
            rasterization: desc.rasterization,
            multisample: desc.multisample,
            depth_stencil: desc.depth_stencil,
            blend: desc.blend.clone(),
            render_pass,
            framebuffer,
            layout,
        }
    }

    pub fn viewport_count(&self) -> u32 {
        self.viewport_count
    }

    pub fn shader_stages(&self) -> &[ShaderStageDesc] {
        &self.shader_stages
    }

    pub fn vertex_layouts(&self) -> &[VertexBufferLayout] {
        &self.vertex_layouts
    }

    pub fn input_assembly(&self) -> &InputAssemblyState {
        &self.input_assembly
    }

    pub fn rasterization(&self) -> &RasterizationState {
        &self.rasterization
    }

    pub fn multisample(&self) -> &MultisampleState {
        &self.multisample
    }

    pub fn depth_stencil(&self) -> &DepthStencilState {
        &self.depth_stencil
    }

    pub fn blend(&self) -> &BlendState {
        &self.blend
    }

    pub fn render_pass(&self) -> RenderPassHandle {
        self.render_pass
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    pub fn layout(&self) -> PipelineLayoutHandle {
        self.layout
    }
}

/// Key of compiled compute pipelines
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineState {
    pub shader: ShaderStageDesc,
    pub layout: PipelineLayoutHandle,
}

/// Key of the shared pipeline cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineKey {
    Graphics(PipelineState),
    Compute(ComputePipelineState),
}

/// Cached pipeline object
#[derive(Debug)]
pub struct Pipeline {
    pub handle: PipelineHandle,
    pub key: PipelineKey,
}

#[cfg(test)]
#[path = "pipeline_state_tests.rs"]
mod tests;
