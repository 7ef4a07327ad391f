/// Descriptor sets: pooled allocation and binding tables

pub mod pooled_set_allocator;
pub mod binding_table;

pub use pooled_set_allocator::{PooledSetAllocator, SetAllocation, PoolKey, PoolStats};
pub use binding_table::{
    ResourceBindingTable, BoundResource, BufferBinding, BufferBindingUsage, TextureBinding,
    required_layout,
};
