/// Thread-affine command pools
///
/// Command pools are not safe for concurrent allocation, so each worker thread
/// gets its own. A [`WorkerToken`] names the worker explicitly: it is created on
/// the worker thread and handed to the device when a recorder is created. Every
/// pool operation checks that it runs on the token's thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use crate::backend::{Backend, CommandBufferHandle, CommandPoolHandle};
use crate::cache::{CacheFactory, StructuralCache};
use crate::error::{lock, Result};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one worker thread
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerToken {
    id: u64,
    thread: ThreadId,
}

impl WorkerToken {
    /// Token bound to the calling thread
    pub fn current() -> Self {
        Self {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed),
            thread: thread::current().id(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// True when called from the token's thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread
    }

    /// `InvalidUsage` unless called from the token's thread
    pub fn check_thread(&self, operation: &str) -> Result<()> {
        if !self.is_current() {
            crate::ferrite_invalid!(
                "ferrite::command",
                "{} called from {:?}, but worker #{} is bound to {:?}",
                operation, thread::current().id(), self.id, self.thread
            );
        }
        Ok(())
    }
}

/// Command pool owned by one worker
pub struct CommandPool {
    handle: CommandPoolHandle,
    owner: WorkerToken,
    free: Mutex<Vec<CommandBufferHandle>>,
    backend: Arc<dyn Backend>,
}

impl CommandPool {
    pub fn handle(&self) -> CommandPoolHandle {
        self.handle
    }

    pub fn owner(&self) -> &WorkerToken {
        &self.owner
    }

    fn check_owner(&self, caller: &WorkerToken, operation: &str) -> Result<()> {
        if *caller != self.owner {
            crate::ferrite_invalid!(
                "ferrite::command",
                "{} on the command pool of worker #{} by worker #{}",
                operation, self.owner.id, caller.id
            );
        }
        self.owner.check_thread(operation)
    }

    /// Take a command buffer, reusing a recycled one when possible
    pub fn acquire(&self, caller: &WorkerToken) -> Result<CommandBufferHandle> {
        self.check_owner(caller, "acquire")?;
        if let Some(cmd) = lock(&self.free, "command pool")?.pop() {
            return Ok(cmd);
        }
        self.backend.allocate_command_buffer(self.handle)
    }

    /// Reset a command buffer and return it to the pool
    pub fn recycle(&self, caller: &WorkerToken, cmd: CommandBufferHandle) -> Result<()> {
        self.check_owner(caller, "recycle")?;
        self.backend.reset_command_buffer(cmd)?;
        lock(&self.free, "command pool")?.push(cmd);
        Ok(())
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }
}

pub struct CommandPoolFactory {
    backend: Arc<dyn Backend>,
}

impl CommandPoolFactory {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl CacheFactory for CommandPoolFactory {
    type Key = WorkerToken;
    type Value = Arc<CommandPool>;

    fn name(&self) -> &'static str {
        "command pool"
    }

    fn create_cached(&self, key: &WorkerToken) -> Result<Arc<CommandPool>> {
        key.check_thread("create command pool")?;
        let handle = self.backend.create_command_pool()?;
        Ok(Arc::new(CommandPool {
            handle,
            owner: key.clone(),
            free: Mutex::new(Vec::new()),
            backend: Arc::clone(&self.backend),
        }))
    }

    fn destroy_cached(&self, value: &Arc<CommandPool>) {
        self.backend.destroy_command_pool(value.handle);
    }
}

/// Per-worker command pools
pub type CommandPoolCache = StructuralCache<CommandPoolFactory>;

#[cfg(test)]
#[path = "command_pool_tests.rs"]
mod tests;
