/// Device configuration - tunables shared by every cache and allocator

use crate::sync::Timeout;

/// What a descriptor pool does when it regains capacity after being exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolReusePolicy {
    /// Push the pool back onto the availability stack as soon as one of its
    /// sets is released
    Reclaim,
    /// Never hand out sets from a pool once it has been exhausted; released
    /// sets only lower its allocation count
    RetainExhausted,
}

/// Configuration for a [`DeviceContext`](crate::device::DeviceContext)
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Number of sets each descriptor pool holds. Per-type descriptor counts of a
    /// pool are the layout's counts multiplied by this value.
    pub sets_per_pool: u32,
    /// Maximum number of descriptor pools a single set layout may grow to.
    /// `None` lets the allocator grow until the backend refuses.
    pub max_pools_per_layout: Option<u32>,
    /// Availability handling for pools that were exhausted
    pub pool_reuse: PoolReusePolicy,
    /// Timeout used by [`Fence::wait_default`](crate::device::Fence::wait_default)
    pub default_fence_timeout: Timeout,
    /// Viewport count a fresh recording starts with
    pub initial_viewport_count: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sets_per_pool: 64,
            max_pools_per_layout: None,
            pool_reuse: PoolReusePolicy::Reclaim,
            default_fence_timeout: Timeout::Indefinite,
            initial_viewport_count: 1,
        }
    }
}

impl DeviceConfig {
    /// Configuration with a hard cap on descriptor pool growth
    pub fn with_pool_limit(mut self, max_pools: u32) -> Self {
        self.max_pools_per_layout = Some(max_pools);
        self
    }

    /// Configuration with a custom pool capacity
    pub fn with_sets_per_pool(mut self, sets_per_pool: u32) -> Self {
        self.sets_per_pool = sets_per_pool.max(1);
        self
    }

    pub fn with_pool_reuse(mut self, policy: PoolReusePolicy) -> Self {
        self.pool_reuse = policy;
        self
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
