/// Resources: textures, buffers, samplers and shader modules

pub mod texture;
pub mod buffer;
pub mod sampler;
pub mod shader;

pub use texture::{
    Texture, TextureDesc, TextureUsage, TextureFormat, TextureDimension,
    Extent3D, SubresourceRange, ImageAspect,
};
pub use buffer::{Buffer, BufferDesc, BufferUsage, BufferSpan};
pub use sampler::{Sampler, SamplerDesc, Filter, MipmapMode, AddressMode};
pub use shader::{ShaderModule, ShaderStage, ShaderStages, ShaderStageDesc};
