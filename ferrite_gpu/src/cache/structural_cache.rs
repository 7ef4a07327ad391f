/// Generic memoizing cache keyed by structural descriptors
///
/// A [`CacheFactory`] supplies the backend object for a key on a miss; the cache
/// makes sure each distinct key is built exactly once. The map lock is held across
/// creation, so concurrent misses on the same key are serialized and the second
/// caller gets the object the first one built.
///
/// Entries carry a use count: [`get`](StructuralCache::get) acquires a use,
/// [`release`](StructuralCache::release) returns it. Objects are destroyed when
/// the cache is torn down, or earlier through [`evict`](StructuralCache::evict)
/// once something they reference is gone.

use std::hash::Hash;
use std::sync::Mutex;
use rustc_hash::FxHashMap;
use crate::error::{lock, Result};

/// Builds and destroys the objects of one concrete cache
pub trait CacheFactory: Send + Sync {
    type Key: Eq + Hash + Clone + Send;
    type Value: Clone + Send;

    /// Short name used in logs ("render pass", "pipeline", ...)
    fn name(&self) -> &'static str;

    /// Build the object for `key`, called only on a miss
    fn create_cached(&self, key: &Self::Key) -> Result<Self::Value>;

    /// Destroy an object at cache teardown or eviction
    fn destroy_cached(&self, value: &Self::Value);
}

struct CacheEntry<V> {
    value: V,
    uses: u32,
}

/// Hit/miss counters of a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

struct CacheState<K, V> {
    entries: FxHashMap<K, CacheEntry<V>>,
    stats: CacheStats,
}

pub struct StructuralCache<F: CacheFactory> {
    factory: F,
    state: Mutex<CacheState<F::Key, F::Value>>,
}

impl<F: CacheFactory> StructuralCache<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            state: Mutex::new(CacheState {
                entries: FxHashMap::default(),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Return the object for `key`, creating it on the first request
    ///
    /// Acquires one use of the entry. Creation failures propagate unchanged and
    /// leave no entry behind.
    pub fn get(&self, key: &F::Key) -> Result<F::Value> {
        self.lookup(key, 1)
    }

    /// Like [`get`](Self::get), without acquiring a use
    pub fn resolve(&self, key: &F::Key) -> Result<F::Value> {
        self.lookup(key, 0)
    }

    fn lookup(&self, key: &F::Key, acquire: u32) -> Result<F::Value> {
        let mut state = lock(&self.state, self.factory.name())?;

        if let Some(entry) = state.entries.get_mut(key) {
            entry.uses += acquire;
            let value = entry.value.clone();
            state.stats.hits += 1;
            return Ok(value);
        }

        let value = self.factory.create_cached(key)?;
        state.entries.insert(key.clone(), CacheEntry { value: value.clone(), uses: acquire });
        state.stats.misses += 1;
        crate::ferrite_debug!(
            "ferrite::cache",
            "Created {} ({} cached)",
            self.factory.name(),
            state.entries.len()
        );
        Ok(value)
    }

    /// Look up `key` without creating or acquiring anything
    pub fn peek(&self, key: &F::Key) -> Result<Option<F::Value>> {
        let state = lock(&self.state, self.factory.name())?;
        Ok(state.entries.get(key).map(|entry| entry.value.clone()))
    }

    /// Return one use of `key`; the object stays cached
    pub fn release(&self, key: &F::Key) -> Result<()> {
        let mut state = lock(&self.state, self.factory.name())?;
        match state.entries.get_mut(key) {
            Some(entry) if entry.uses > 0 => {
                entry.uses -= 1;
                Ok(())
            }
            Some(_) => {
                crate::ferrite_invalid!(
                    "ferrite::cache",
                    "Released a {} with no outstanding use",
                    self.factory.name()
                );
            }
            None => {
                crate::ferrite_invalid!(
                    "ferrite::cache",
                    "Released a {} that is not in the cache",
                    self.factory.name()
                );
            }
        }
    }

    /// Outstanding uses of `key`, `None` if not cached
    pub fn uses(&self, key: &F::Key) -> Result<Option<u32>> {
        let state = lock(&self.state, self.factory.name())?;
        Ok(state.entries.get(key).map(|entry| entry.uses))
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().map(|state| state.stats).unwrap_or_default()
    }

    /// Run `f` on every cached object
    pub fn for_each(&self, mut f: impl FnMut(&F::Value)) -> Result<()> {
        let state = lock(&self.state, self.factory.name())?;
        state.entries.values().for_each(|entry| f(&entry.value));
        Ok(())
    }

    /// Destroy every cached object whose key matches `stale`; returns how many were destroyed
    pub fn evict(&self, mut stale: impl FnMut(&F::Key) -> bool) -> Result<usize> {
        let mut state = lock(&self.state, self.factory.name())?;
        let keys: Vec<F::Key> = state.entries.keys().filter(|key| stale(key)).cloned().collect();
        for key in &keys {
            let Some(entry) = state.entries.remove(key) else {
                continue;
            };
            if entry.uses > 0 {
                crate::ferrite_warn!(
                    "ferrite::cache",
                    "Evicting {} with {} outstanding use(s)",
                    self.factory.name(),
                    entry.uses
                );
            }
            self.factory.destroy_cached(&entry.value);
        }
        Ok(keys.len())
    }

    /// Destroy every cached object; returns how many were destroyed
    ///
    /// Poisoned state is still torn down.
    pub fn clear(&self) -> usize {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = state.entries.len();
        for (_, entry) in state.entries.drain() {
            if entry.uses > 0 {
                crate::ferrite_trace!(
                    "ferrite::cache",
                    "Destroying {} with {} outstanding use(s)",
                    self.factory.name(),
                    entry.uses
                );
            }
            self.factory.destroy_cached(&entry.value);
        }
        count
    }
}

impl<F: CacheFactory> Drop for StructuralCache<F> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
#[path = "structural_cache_tests.rs"]
mod tests;
