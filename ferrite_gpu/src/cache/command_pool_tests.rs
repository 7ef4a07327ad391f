//! Unit tests for command_pool.rs

use crate::backend::mock_backend::MockBackend;
use crate::backend::Backend;
use crate::cache::command_pool::*;
use crate::Error;
use std::sync::Arc;
use std::thread;

fn cache() -> (Arc<MockBackend>, CommandPoolCache) {
    let mock = Arc::new(MockBackend::new());
    let backend: Arc<dyn Backend> = mock.clone();
    (mock, CommandPoolCache::new(CommandPoolFactory::new(backend)))
}

#[test]
fn test_worker_tokens_are_distinct() {
    let a = WorkerToken::current();
    let b = WorkerToken::current();
    assert_ne!(a, b);
    assert_eq!(a.thread(), b.thread());
    assert!(a.is_current());
}

#[test]
fn test_one_pool_per_worker() {
    let (mock, pools) = cache();
    let worker = WorkerToken::current();

    let a = pools.get(&worker).unwrap();
    let b = pools.get(&worker).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let other = WorkerToken::current();
    let c = pools.get(&other).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(mock.created("command_pool"), 2);
}

#[test]
fn test_recycled_buffers_are_reused() {
    let (mock, pools) = cache();
    let worker = WorkerToken::current();
    let pool = pools.get(&worker).unwrap();

    let cmd = pool.acquire(&worker).unwrap();
    pool.recycle(&worker, cmd).unwrap();
    assert_eq!(pool.free_count(), 1);

    let again = pool.acquire(&worker).unwrap();
    assert_eq!(again, cmd);
    assert_eq!(mock.created("command_buffer"), 1);
    assert_eq!(mock.count_calls("reset"), 1);
}

#[test]
fn test_pool_rejects_foreign_worker() {
    let (_mock, pools) = cache();
    let owner = WorkerToken::current();
    let pool = pools.get(&owner).unwrap();

    let intruder = WorkerToken::current();
    assert!(matches!(pool.acquire(&intruder), Err(Error::InvalidUsage(_))));
}

#[test]
fn test_pool_rejects_other_thread() {
    let (_mock, pools) = cache();
    let owner = WorkerToken::current();
    let pool = pools.get(&owner).unwrap();

    let result = thread::spawn(move || pool.acquire(&owner)).join().unwrap();
    assert!(matches!(result, Err(Error::InvalidUsage(_))));
}

#[test]
fn test_pool_creation_requires_owning_thread() {
    let (mock, pools) = cache();
    let pools = Arc::new(pools);
    let token = WorkerToken::current();

    let remote = Arc::clone(&pools);
    let result = thread::spawn(move || remote.get(&token).map(|_| ())).join().unwrap();

    assert!(matches!(result, Err(Error::InvalidUsage(_))));
    assert_eq!(mock.created("command_pool"), 0);
}

#[test]
fn test_clear_destroys_pools() {
    let (mock, pools) = cache();
    pools.get(&WorkerToken::current()).unwrap();
    pools.get(&WorkerToken::current()).unwrap();
    pools.clear();
    assert_eq!(mock.destroyed("command_pool"), 2);
}
