//! A lazily populated, compute-once map.
//!
//! Each key owns its own [`OnceLock`] cell. The map lock is only held to
//! find or create a cell, never while a value is computed, so computing one
//! key does not block readers or writers of any other key. Concurrent
//! requests for the same key wait for the first computation and share its
//! result; entries never change once set.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

/// Hit/miss counters of a [`OnceMap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by an existing entry.
    pub hits: u64,
    /// Lookups that ran the initializer.
    pub misses: u64,
}

/// A concurrent map whose values are computed at most once per key.
#[derive(Debug)]
pub struct OnceMap<K, V> {
    cells: RwLock<HashMap<K, Arc<OnceLock<V>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> OnceMap<K, V> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, computing it with `init` on first use.
    pub fn get_or_init(&self, key: &K, init: impl FnOnce() -> V) -> V {
        let cell = self.cell(key);
        let mut computed = false;
        let value = cell
            .get_or_init(|| {
                computed = true;
                init()
            })
            .clone();
        let counter = if computed { &self.misses } else { &self.hits };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Returns the value for `key` if it has been computed.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.cells.read().get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of keys with a cell.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    /// True if no key has been requested yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Returns the hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn cell(&self, key: &K) -> Arc<OnceLock<V>> {
        if let Some(cell) = self.cells.read().get(key) {
            return Arc::clone(cell);
        }
        Arc::clone(self.cells.write().entry(key.clone()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    #[test]
    fn computes_once_per_key() {
        let map: OnceMap<&str, u32> = OnceMap::new();
        assert_eq!(map.get_or_init(&"a", || 1), 1);
        assert_eq!(map.get_or_init(&"a", || 2), 1);
        assert_eq!(map.get_or_init(&"b", || 3), 3);
        assert_eq!(map.get(&"a"), Some(1));
        assert_eq!(map.get(&"missing"), None);
        assert_eq!(map.len(), 2);
        assert_eq!(map.stats(), CacheStats { hits: 1, misses: 2 });
    }

    #[test]
    fn concurrent_first_use_runs_initializer_once() {
        let map: Arc<OnceMap<u32, u32>> = Arc::new(OnceMap::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let map = Arc::clone(&map);
                let runs = Arc::clone(&runs);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    map.get_or_init(&7, || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        49
                    })
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().expect("thread"), 49);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(map.stats().misses, 1);
    }
}
