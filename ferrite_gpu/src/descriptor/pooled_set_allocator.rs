/// Pooled descriptor set allocation for one set layout
///
/// Pools live in an arena and are referred to by [`PoolKey`]; an allocation
/// remembers the key of its owning pool and the id of the allocator that made
/// it. Pools with spare capacity sit on an availability stack. `allocate` pops a
/// pool, takes one set from it and pushes it back only while it still has room,
/// so an exhausted pool is never asked for another set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use slotmap::{new_key_type, SlotMap};
use crate::backend::{Backend, DescriptorPoolHandle, DescriptorSetHandle, SetLayoutHandle};
use crate::config::{DeviceConfig, PoolReusePolicy};
use crate::error::{lock, Error, Result};
use crate::pipeline::DescriptorPoolSize;

new_key_type! {
    /// Arena index of a descriptor pool
    pub struct PoolKey;
}

static NEXT_ALLOCATOR_ID: AtomicU64 = AtomicU64::new(1);

/// One descriptor set handed out by a [`PooledSetAllocator`]
///
/// Not `Clone`: a set is released exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct SetAllocation {
    allocator: u64,
    pool: PoolKey,
    set: DescriptorSetHandle,
}

impl SetAllocation {
    pub fn set(&self) -> DescriptorSetHandle {
        self.set
    }

    pub fn pool(&self) -> PoolKey {
        self.pool
    }
}

#[derive(Debug)]
struct SetPool {
    handle: DescriptorPoolHandle,
    max: u32,
    allocated: u32,
    on_stack: bool,
}

impl SetPool {
    fn available(&self) -> u32 {
        self.max - self.allocated
    }
}

#[derive(Default)]
struct PoolArena {
    pools: SlotMap<PoolKey, SetPool>,
    available: Vec<PoolKey>,
}

/// Counters of an allocator, for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub pools: usize,
    pub allocated: u32,
    pub capacity: u32,
    pub available_pools: usize,
}

pub struct PooledSetAllocator {
    id: u64,
    backend: Arc<dyn Backend>,
    layout: SetLayoutHandle,
    /// Per-type descriptor counts of a whole pool
    pool_sizes: Vec<DescriptorPoolSize>,
    sets_per_pool: u32,
    max_pools: Option<u32>,
    reuse: PoolReusePolicy,
    arena: Mutex<PoolArena>,
}

impl PooledSetAllocator {
    /// Allocator for sets of `layout`, whose one-set descriptor counts are `set_counts`
    pub fn new(
        backend: Arc<dyn Backend>,
        layout: SetLayoutHandle,
        set_counts: &[DescriptorPoolSize],
        config: &DeviceConfig,
    ) -> Self {
        let sets_per_pool = config.sets_per_pool.max(1);
        let pool_sizes = set_counts
            .iter()
            .map(|size| DescriptorPoolSize {
                descriptor_type: size.descriptor_type,
                count: size.count.saturating_mul(sets_per_pool),
            })
            .collect();

        Self {
            id: NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            layout,
            pool_sizes,
            sets_per_pool,
            max_pools: config.max_pools_per_layout,
            reuse: config.pool_reuse,
            arena: Mutex::new(PoolArena::default()),
        }
    }

    pub fn layout(&self) -> SetLayoutHandle {
        self.layout
    }

    /// Allocate one set, growing a new pool when none has spare capacity
    ///
    /// Fails with `ResourceExhausted` when the growth limit is reached or the
    /// backend refuses to create another pool.
    pub fn allocate(&self) -> Result<SetAllocation> {
        let mut guard = lock(&self.arena, "descriptor pool arena")?;
        let PoolArena { pools, available } = &mut *guard;

        let key = match available.pop() {
            Some(key) => key,
            None => self.grow(pools)?,
        };
        let pool = pools
            .get_mut(key)
            .ok_or_else(|| Error::BackendFailure("availability stack holds a dead pool".to_string()))?;
        pool.on_stack = false;
        debug_assert!(pool.allocated < pool.max);

        let set = match self.backend.allocate_descriptor_set(pool.handle, self.layout) {
            Ok(set) => set,
            Err(err) => {
                if pool.available() > 0 {
                    pool.on_stack = true;
                    available.push(key);
                }
                return Err(err);
            }
        };

        pool.allocated += 1;
        if pool.available() > 0 {
            pool.on_stack = true;
            available.push(key);
        }

        Ok(SetAllocation { allocator: self.id, pool: key, set })
    }

    fn grow(&self, pools: &mut SlotMap<PoolKey, SetPool>) -> Result<PoolKey> {
        if let Some(max) = self.max_pools {
            if pools.len() >= max as usize {
                return Err(Error::ResourceExhausted(format!(
                    "Descriptor pool limit reached for set layout {:?} ({} pools of {} sets)",
                    self.layout, max, self.sets_per_pool
                )));
            }
        }

        let handle = self
            .backend
            .create_descriptor_pool(self.sets_per_pool, &self.pool_sizes)
            .map_err(|err| {
                Error::ResourceExhausted(format!(
                    "Backend refused a new descriptor pool for set layout {:?}: {}",
                    self.layout, err
                ))
            })?;

        let key = pools.insert(SetPool {
            handle,
            max: self.sets_per_pool,
            allocated: 0,
            on_stack: false,
        });
        crate::ferrite_info!(
            "ferrite::descriptor",
            "Descriptor pool #{} created for set layout {:?} ({} sets)",
            pools.len(), self.layout, self.sets_per_pool
        );
        Ok(key)
    }

    /// Return a set to its owning pool
    ///
    /// An allocation made by another allocator is `InvalidUsage`.
    pub fn release(&self, allocation: SetAllocation) -> Result<()> {
        if allocation.allocator != self.id {
            crate::ferrite_invalid!(
                "ferrite::descriptor",
                "Descriptor set {:?} released to an allocator that does not own it",
                allocation.set
            );
        }

        let mut guard = lock(&self.arena, "descriptor pool arena")?;
        let PoolArena { pools, available } = &mut *guard;

        let Some(pool) = pools.get_mut(allocation.pool) else {
            crate::ferrite_invalid!(
                "ferrite::descriptor",
                "Descriptor set {:?} refers to a pool that no longer exists",
                allocation.set
            );
        };
        if pool.allocated == 0 {
            crate::ferrite_invalid!(
                "ferrite::descriptor",
                "Descriptor set {:?} released to a pool with no live sets",
                allocation.set
            );
        }

        self.backend.free_descriptor_set(pool.handle, allocation.set)?;
        pool.allocated -= 1;

        if self.reuse == PoolReusePolicy::Reclaim && !pool.on_stack {
            pool.on_stack = true;
            available.push(allocation.pool);
        }
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        match self.arena.lock() {
            Ok(arena) => PoolStats {
                pools: arena.pools.len(),
                allocated: arena.pools.values().map(|p| p.allocated).sum(),
                capacity: arena.pools.values().map(|p| p.max).sum(),
                available_pools: arena.available.len(),
            },
            Err(_) => PoolStats::default(),
        }
    }

    /// Destroy every pool (and with them every set)
    ///
    /// Allocations still held become dangling and must not be released afterwards.
    pub fn destroy_pools(&self) {
        let mut arena = match self.arena.lock() {
            Ok(arena) => arena,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, pool) in arena.pools.drain() {
            self.backend.destroy_descriptor_pool(pool.handle);
        }
        arena.available.clear();
    }
}

impl Drop for PooledSetAllocator {
    fn drop(&mut self) {
        self.destroy_pools();
    }
}

#[cfg(test)]
#[path = "pooled_set_allocator_tests.rs"]
mod tests;
