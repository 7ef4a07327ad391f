/// Backend module - the low-level graphics API seam

pub mod handles;
pub mod commands;
pub mod memory;
#[allow(clippy::module_inception)]
pub mod backend;
#[cfg(test)]
pub mod mock_backend;

pub use handles::*;
pub use commands::*;
pub use memory::{MemoryAllocation, MemoryAllocator, MemoryRequirements, MemoryUsage};
pub use backend::Backend;
