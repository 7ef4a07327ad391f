/// Opaque backend object handles
///
/// Every handle is a plain 64-bit value produced by a [`Backend`](crate::backend::Backend).
/// Vulkan handles are 64-bit on every platform, so the Vulkan backend stores the
/// raw `vk` handle directly. `0` is never handed out and means "no object".

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u64);

        impl $name {
            /// The "no object" handle
            pub const NULL: Self = Self(0);

            /// Raw 64-bit value
            pub fn raw(self) -> u64 {
                self.0
            }

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

define_handle!(
    /// GPU buffer
    BufferHandle
);
define_handle!(
    /// GPU texture (image plus its default view)
    TextureHandle
);
define_handle!(SamplerHandle);
define_handle!(ShaderModuleHandle);
define_handle!(
    /// Descriptor set layout
    SetLayoutHandle
);
define_handle!(PipelineLayoutHandle);
define_handle!(RenderPassHandle);
define_handle!(FramebufferHandle);
define_handle!(
    /// Compiled graphics or compute pipeline
    PipelineHandle
);
define_handle!(DescriptorPoolHandle);
define_handle!(DescriptorSetHandle);
define_handle!(CommandPoolHandle);
define_handle!(CommandBufferHandle);
define_handle!(FenceHandle);
define_handle!(
    /// Device memory block returned by a [`MemoryAllocator`](crate::backend::MemoryAllocator)
    MemoryHandle
);
