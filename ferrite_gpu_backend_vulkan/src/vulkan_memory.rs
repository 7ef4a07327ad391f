/// VulkanMemory - MemoryAllocator over gpu-allocator
///
/// Allocations are handed out as `(memory, offset)` pairs; the gpu-allocator
/// `Allocation` objects stay here, keyed by that pair, until freed.

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::AllocationError;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};
use ferrite_gpu::ferrite::backend::{MemoryAllocation, MemoryAllocator, MemoryHandle, MemoryRequirements, MemoryUsage};
use ferrite_gpu::ferrite::{Error, Result};
use ferrite_gpu::{ferrite_err, ferrite_error, ferrite_invalid, ferrite_trace};

use crate::vulkan_context::VulkanContext;
use crate::vulkan_conversions::memory_location;

/// Device memory allocator of one Vulkan context
pub struct VulkanMemory {
    // Declared before `ctx`: the allocator must be dropped while the device is alive
    allocator: Mutex<Allocator>,
    allocations: Mutex<FxHashMap<(u64, u64), Allocation>>,
    ctx: Arc<VulkanContext>,
}

impl VulkanMemory {
    pub fn new(ctx: Arc<VulkanContext>) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: ctx.instance.clone(),
            device: ctx.device.clone(),
            physical_device: ctx.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create GPU allocator: {:?}", e))?;

        Ok(Self {
            allocator: Mutex::new(allocator),
            allocations: Mutex::new(FxHashMap::default()),
            ctx,
        })
    }

    pub fn context(&self) -> &Arc<VulkanContext> {
        &self.ctx
    }

    /// Number of live allocations
    pub fn allocation_count(&self) -> usize {
        self.allocations.lock().map(|map| map.len()).unwrap_or(0)
    }

    fn key(allocation: &MemoryAllocation) -> (u64, u64) {
        (allocation.handle.raw(), allocation.offset)
    }

    /// Host mapping of `len` bytes at `offset` inside `allocation`
    fn mapped<'a>(
        allocations: &'a mut FxHashMap<(u64, u64), Allocation>,
        allocation: &MemoryAllocation,
        offset: u64,
        len: usize,
    ) -> Result<&'a mut [u8]> {
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > allocation.size) {
            ferrite_invalid!(
                "ferrite::vulkan",
                "access of {} bytes at offset {} exceeds allocation size {}",
                len,
                offset,
                allocation.size
            );
        }
        let Some(entry) = allocations.get_mut(&Self::key(allocation)) else {
            ferrite_invalid!("ferrite::vulkan", "access to an allocation not owned by this allocator");
        };
        let Some(mapped) = entry.mapped_slice_mut() else {
            ferrite_invalid!("ferrite::vulkan", "access to memory that is not host visible");
        };
        let start = offset as usize;
        Ok(&mut mapped[start..start + len])
    }
}

impl MemoryAllocator for VulkanMemory {
    fn allocate(&self, usage: MemoryUsage, requirements: &MemoryRequirements) -> Result<MemoryAllocation> {
        let vk_requirements = vk::MemoryRequirements {
            size: requirements.size,
            alignment: requirements.alignment,
            memory_type_bits: requirements.memory_type_bits,
        };

        let allocation = {
            let mut allocator = self
                .allocator
                .lock()
                .map_err(|_| Error::BackendFailure("allocator lock poisoned".to_string()))?;
            allocator.allocate(&AllocationCreateDesc {
                name: "ferrite",
                requirements: vk_requirements,
                location: memory_location(usage),
                linear: requirements.linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };

        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e @ (AllocationError::OutOfMemory | AllocationError::NoCompatibleMemoryTypeFound)) => {
                ferrite_error!("ferrite::vulkan", "Memory allocation of {} bytes failed: {:?}", requirements.size, e);
                return Err(Error::ResourceExhausted(format!(
                    "memory allocation of {} bytes failed: {:?}",
                    requirements.size, e
                )));
            }
            Err(e) => {
                return Err(ferrite_err!("ferrite::vulkan", "Memory allocation failed: {:?}", e));
            }
        };

        let memory = MemoryAllocation {
            handle: MemoryHandle(unsafe { allocation.memory() }.as_raw()),
            offset: allocation.offset(),
            size: allocation.size(),
        };
        ferrite_trace!(
            "ferrite::vulkan",
            "Allocated {} bytes ({:?}) at {:#x}+{}",
            memory.size,
            usage,
            memory.handle.raw(),
            memory.offset
        );

        self.allocations
            .lock()
            .map_err(|_| Error::BackendFailure("allocation map lock poisoned".to_string()))?
            .insert(Self::key(&memory), allocation);
        Ok(memory)
    }

    fn write(&self, allocation: &MemoryAllocation, offset: u64, data: &[u8]) -> Result<()> {
        let mut allocations = self
            .allocations
            .lock()
            .map_err(|_| Error::BackendFailure("allocation map lock poisoned".to_string()))?;
        let mapped = Self::mapped(&mut allocations, allocation, offset, data.len())?;
        mapped.copy_from_slice(data);
        Ok(())
    }

    fn read(&self, allocation: &MemoryAllocation, offset: u64, out: &mut [u8]) -> Result<()> {
        let mut allocations = self
            .allocations
            .lock()
            .map_err(|_| Error::BackendFailure("allocation map lock poisoned".to_string()))?;
        let mapped = Self::mapped(&mut allocations, allocation, offset, out.len())?;
        out.copy_from_slice(mapped);
        Ok(())
    }

    fn free(&self, allocation: &MemoryAllocation) {
        let entry = match self.allocations.lock() {
            Ok(mut allocations) => allocations.remove(&Self::key(allocation)),
            Err(_) => None,
        };
        let Some(entry) = entry else {
            ferrite_error!("ferrite::vulkan", "free of an allocation not owned by this allocator");
            return;
        };

        match self.allocator.lock() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(entry) {
                    ferrite_error!("ferrite::vulkan", "Failed to free GPU memory: {:?}", e);
                }
            }
            Err(_) => ferrite_error!("ferrite::vulkan", "allocator lock poisoned, memory leaked"),
        }
    }
}

impl Drop for VulkanMemory {
    fn drop(&mut self) {
        // Leftover allocations go back to the allocator before it is destroyed
        let leftovers: Vec<Allocation> = match self.allocations.get_mut() {
            Ok(allocations) => allocations.drain().map(|(_, allocation)| allocation).collect(),
            Err(_) => Vec::new(),
        };
        if leftovers.is_empty() {
            return;
        }
        ferrite_error!("ferrite::vulkan", "{} allocation(s) still alive at allocator shutdown", leftovers.len());
        if let Ok(allocator) = self.allocator.get_mut() {
            for allocation in leftovers {
                allocator.free(allocation).ok();
            }
        }
    }
}
