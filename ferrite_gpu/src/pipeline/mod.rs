/// Pipeline, layout and render pass descriptors

pub mod binding_layout;
pub mod pipeline_state;
pub mod render_pass;

pub use binding_layout::{
    BindingDecl, BindingLayoutDesc, DescriptorPoolSize, DescriptorType,
    PipelineLayoutDesc, PushConstantRange,
};
pub use pipeline_state::{
    BlendFactor, BlendOp, BlendState, ColorBlendAttachment, ColorWriteMask, CompareOp,
    ComputePipelineDesc, ComputePipelineState, CullMode, DepthStencilState, FrontFace,
    GraphicsPipelineDesc, InputAssemblyState, MultisampleState, Pipeline, PipelineKey,
    PipelineState, PolygonMode, PrimitiveTopology, RasterizationState, VertexAttribute,
    VertexBufferLayout, VertexFormat, VertexInputRate,
};
pub use render_pass::{
    AttachmentDesc, Framebuffer, FramebufferKey, LoadOp, RenderPass, RenderPassDesc, StoreOp,
};
