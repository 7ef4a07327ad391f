//! Unit tests for pooled_set_allocator.rs

use crate::backend::mock_backend::MockBackend;
use crate::backend::{Backend, SetLayoutHandle};
use crate::config::{DeviceConfig, PoolReusePolicy};
use crate::descriptor::pooled_set_allocator::*;
use crate::pipeline::{DescriptorPoolSize, DescriptorType};
use crate::Error;
use std::sync::Arc;
use std::thread;

fn counts() -> Vec<DescriptorPoolSize> {
    vec![
        DescriptorPoolSize { descriptor_type: DescriptorType::UniformBuffer, count: 1 },
        DescriptorPoolSize { descriptor_type: DescriptorType::SampledTexture, count: 2 },
    ]
}

fn allocator(config: DeviceConfig) -> (Arc<MockBackend>, PooledSetAllocator) {
    let mock = Arc::new(MockBackend::new());
    let backend: Arc<dyn Backend> = mock.clone();
    let allocator = PooledSetAllocator::new(backend, SetLayoutHandle(1), &counts(), &config);
    (mock, allocator)
}

// ============================================================================
// SIZING TESTS
// ============================================================================

#[test]
fn test_pool_sized_from_layout_counts_times_multiplier() {
    let (mock, allocator) = allocator(DeviceConfig::default());
    let _set = allocator.allocate().unwrap();

    let sizes = mock.pool_sizes();
    assert_eq!(sizes.len(), 1);
    assert_eq!(
        sizes[0],
        vec![
            DescriptorPoolSize { descriptor_type: DescriptorType::UniformBuffer, count: 64 },
            DescriptorPoolSize { descriptor_type: DescriptorType::SampledTexture, count: 128 },
        ]
    );
}

// ============================================================================
// ROUND-TRIP TESTS
// ============================================================================

#[test]
fn test_fill_pool_then_fail_when_growth_disallowed() {
    let (mock, allocator) = allocator(DeviceConfig::default().with_sets_per_pool(4).with_pool_limit(1));

    let sets: Vec<SetAllocation> = (0..4).map(|_| allocator.allocate().unwrap()).collect();
    assert_eq!(allocator.stats().allocated, 4);
    assert_eq!(allocator.stats().available_pools, 0);

    assert!(matches!(allocator.allocate(), Err(Error::ResourceExhausted(_))));
    assert!(matches!(allocator.allocate(), Err(Error::ResourceExhausted(_))));
    assert_eq!(mock.created("descriptor_pool"), 1);

    for set in sets {
        allocator.release(set).unwrap();
    }
    assert_eq!(allocator.stats().allocated, 0);

    let again: Vec<SetAllocation> = (0..4).map(|_| allocator.allocate().unwrap()).collect();
    assert_eq!(again.len(), 4);
    assert_eq!(mock.created("descriptor_pool"), 1);
}

#[test]
fn test_allocation_past_capacity_grows_new_pool() {
    let (mock, allocator) = allocator(DeviceConfig::default().with_sets_per_pool(2));

    let a = allocator.allocate().unwrap();
    let b = allocator.allocate().unwrap();
    let c = allocator.allocate().unwrap();

    assert_eq!(a.pool(), b.pool());
    assert_ne!(a.pool(), c.pool());
    assert_eq!(mock.created("descriptor_pool"), 2);

    let stats = allocator.stats();
    assert_eq!(stats.pools, 2);
    assert_eq!(stats.capacity, 4);
    assert_eq!(stats.allocated, 3);
}

#[test]
fn test_pool_never_asked_past_capacity() {
    let (mock, allocator) = allocator(DeviceConfig::default().with_sets_per_pool(3));

    // The mock fails any allocation from a full pool
    let sets: Vec<SetAllocation> = (0..10).map(|_| allocator.allocate().unwrap()).collect();
    assert_eq!(sets.len(), 10);
    assert_eq!(mock.created("descriptor_pool"), 4);
    assert_eq!(allocator.stats().allocated, 10);
}

#[test]
fn test_backend_refusal_is_resource_exhausted() {
    let (mock, allocator) = allocator(DeviceConfig::default().with_sets_per_pool(1));
    let _first = allocator.allocate().unwrap();

    mock.refuse_descriptor_pools(true);
    assert!(matches!(allocator.allocate(), Err(Error::ResourceExhausted(_))));
}

// ============================================================================
// RELEASE TESTS
// ============================================================================

#[test]
fn test_release_to_wrong_allocator_is_invalid() {
    let (_mock_a, a) = allocator(DeviceConfig::default());
    let (_mock_b, b) = allocator(DeviceConfig::default());

    let set = a.allocate().unwrap();
    assert!(matches!(b.release(set), Err(Error::InvalidUsage(_))));
    assert_eq!(a.stats().allocated, 1);
}

#[test]
fn test_reclaim_policy_reuses_exhausted_pool() {
    let config = DeviceConfig::default().with_sets_per_pool(2);
    let (mock, allocator) = allocator(config);

    let a = allocator.allocate().unwrap();
    let _b = allocator.allocate().unwrap();
    assert_eq!(allocator.stats().available_pools, 0);

    let pool = a.pool();
    allocator.release(a).unwrap();
    assert_eq!(allocator.stats().available_pools, 1);

    let c = allocator.allocate().unwrap();
    assert_eq!(c.pool(), pool);
    assert_eq!(mock.created("descriptor_pool"), 1);
}

#[test]
fn test_retain_exhausted_policy_grows_instead_of_reusing() {
    let config = DeviceConfig::default()
        .with_sets_per_pool(2)
        .with_pool_reuse(PoolReusePolicy::RetainExhausted);
    let (mock, allocator) = allocator(config);

    let a = allocator.allocate().unwrap();
    let _b = allocator.allocate().unwrap();
    let pool = a.pool();
    allocator.release(a).unwrap();

    assert_eq!(allocator.stats().available_pools, 0);
    let c = allocator.allocate().unwrap();
    assert_ne!(c.pool(), pool);
    assert_eq!(mock.created("descriptor_pool"), 2);
}

#[test]
fn test_release_of_partially_used_pool_keeps_single_stack_entry() {
    let (_mock, allocator) = allocator(DeviceConfig::default().with_sets_per_pool(4));
    let a = allocator.allocate().unwrap();
    let b = allocator.allocate().unwrap();

    allocator.release(a).unwrap();
    allocator.release(b).unwrap();
    assert_eq!(allocator.stats().available_pools, 1);
}

// ============================================================================
// TEARDOWN / CONCURRENCY TESTS
// ============================================================================

#[test]
fn test_destroy_pools() {
    let (mock, allocator) = allocator(DeviceConfig::default().with_sets_per_pool(1));
    let _a = allocator.allocate().unwrap();
    let _b = allocator.allocate().unwrap();

    allocator.destroy_pools();
    assert_eq!(mock.destroyed("descriptor_pool"), 2);
    assert_eq!(allocator.stats(), PoolStats::default());

    allocator.destroy_pools();
    assert_eq!(mock.destroyed("descriptor_pool"), 2);
}

#[test]
fn test_concurrent_allocation_respects_capacity() {
    let (mock, allocator) = allocator(DeviceConfig::default().with_sets_per_pool(5));
    let allocator = Arc::new(allocator);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            thread::spawn(move || {
                (0..10).map(|_| allocator.allocate().unwrap()).collect::<Vec<_>>()
            })
        })
        .collect();
    let sets: Vec<SetAllocation> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();

    assert_eq!(sets.len(), 40);
    assert_eq!(mock.created("descriptor_pool"), 8);
    assert_eq!(allocator.stats().allocated, 40);
}
