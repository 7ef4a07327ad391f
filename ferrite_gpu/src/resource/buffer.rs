/// Buffer descriptor, buffer resource and buffer spans

use std::sync::Arc;
use bitflags::bitflags;
use crate::backend::{Backend, BufferHandle, MemoryAllocation, MemoryAllocator, MemoryUsage};
use crate::error::Result;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const VERTEX = 1 << 4;
        const INDEX = 1 << 5;
        const INDIRECT = 1 << 6;
    }
}

/// Buffer creation descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    pub usage: BufferUsage,
    /// Memory placement requested from the allocator
    pub memory: MemoryUsage,
}

/// GPU buffer
///
/// Destroys the backend buffer and frees its memory when dropped.
pub struct Buffer {
    handle: BufferHandle,
    desc: BufferDesc,
    memory: MemoryAllocation,
    backend: Arc<dyn Backend>,
    allocator: Arc<dyn MemoryAllocator>,
}

impl Buffer {
    pub(crate) fn new(
        handle: BufferHandle,
        desc: BufferDesc,
        memory: MemoryAllocation,
        backend: Arc<dyn Backend>,
        allocator: Arc<dyn MemoryAllocator>,
    ) -> Self {
        Self { handle, desc, memory, backend, allocator }
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn memory(&self) -> &MemoryAllocation {
        &self.memory
    }

    /// Write bytes into host-visible buffer memory
    pub fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > self.desc.size) {
            crate::ferrite_invalid!(
                "ferrite::resource",
                "Buffer update out of bounds: offset {} + {} bytes > size {}",
                offset, data.len(), self.desc.size
            );
        }
        self.allocator.write(&self.memory, offset, data)
    }

    /// Read bytes back from host-visible buffer memory
    pub fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let end = offset.checked_add(out.len() as u64);
        if end.map_or(true, |end| end > self.desc.size) {
            crate::ferrite_invalid!(
                "ferrite::resource",
                "Buffer read out of bounds: offset {} + {} bytes > size {}",
                offset, out.len(), self.desc.size
            );
        }
        self.allocator.read(&self.memory, offset, out)
    }

    /// Span covering the whole buffer
    pub fn whole(self: &Arc<Self>) -> BufferSpan {
        BufferSpan::new(Arc::clone(self), 0, self.desc.size)
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("handle", &self.handle)
            .field("desc", &self.desc)
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.backend.destroy_buffer(self.handle);
        self.allocator.free(&self.memory);
    }
}

/// Byte range of a buffer
///
/// Two spans are equal when they address the same buffer object with the same
/// offset and size.
#[derive(Debug, Clone)]
pub struct BufferSpan {
    pub buffer: Arc<Buffer>,
    pub offset: u64,
    pub size: u64,
}

impl BufferSpan {
    pub fn new(buffer: Arc<Buffer>, offset: u64, size: u64) -> Self {
        Self { buffer, offset, size }
    }

    pub fn handle(&self) -> BufferHandle {
        self.buffer.handle()
    }
}

impl PartialEq for BufferSpan {
    fn eq(&self, other: &Self) -> bool {
        self.buffer.handle() == other.buffer.handle()
            && self.offset == other.offset
            && self.size == other.size
    }
}

impl Eq for BufferSpan {}
