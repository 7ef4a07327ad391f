/// Device memory allocation interface
///
/// Buffers and textures are created unbound; the device context asks the
/// allocator for memory matching the object's requirements and binds it.

use crate::backend::MemoryHandle;
use crate::error::Result;

/// Where an allocation should live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryUsage {
    /// Device local, not host visible
    GpuOnly,
    /// Host visible, written by the CPU and read by the GPU (uploads, uniforms)
    CpuToGpu,
    /// Host visible, written by the GPU and read back by the CPU
    GpuToCpu,
}

/// Size and placement constraints of an unbound object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequirements {
    pub size: u64,
    pub alignment: u64,
    /// Bit `i` set when memory type `i` is compatible
    pub memory_type_bits: u32,
    /// Linear resources (buffers, linear images) versus optimally tiled images
    pub linear: bool,
}

/// Memory block bound to one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryAllocation {
    pub handle: MemoryHandle,
    pub offset: u64,
    pub size: u64,
}

/// Device memory allocator
///
/// `allocate` fails with `ResourceExhausted` when no compatible memory type
/// exists or the heap is full.
pub trait MemoryAllocator: Send + Sync {
    fn allocate(&self, usage: MemoryUsage, requirements: &MemoryRequirements) -> Result<MemoryAllocation>;

    /// Copy `data` into host-visible memory at `offset` bytes from the allocation start
    fn write(&self, allocation: &MemoryAllocation, offset: u64, data: &[u8]) -> Result<()>;

    /// Copy host-visible memory at `offset` into `out`
    fn read(&self, allocation: &MemoryAllocation, offset: u64, out: &mut [u8]) -> Result<()>;

    fn free(&self, allocation: &MemoryAllocation);
}
