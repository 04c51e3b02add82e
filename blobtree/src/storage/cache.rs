//! Bounded cache for decoded tree pages.
//!
//! The cache maps a key (a page address for the tree) to an owned value and
//! evicts the least recently used entry once it holds `capacity` entries. The
//! usage order is the intrusive doubly-linked list of `lru::LruCache`, so
//! marking a use and evicting are both O(1).
//!
//! An optional release hook sees every value that leaves the cache through
//! eviction or `clear`. Replacing a value under an existing key does not call
//! the hook.
//!
//! # Invariants
//!
//! - `len() <= capacity()`
//! - `has` never changes the usage order

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// Callback receiving values dropped from the cache.
pub type ReleaseHook<K, V> = Box<dyn FnMut(K, V)>;

/// Hit and miss counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A capacity-bounded LRU map.
pub struct NodeCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    release: Option<ReleaseHook<K, V>>,
    stats: CacheStats,
}

impl<K: Hash + Eq + Clone, V> NodeCache<K, V> {
    /// Create an empty cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            release: None,
            stats: CacheStats::default(),
        }
    }

    /// Create an empty cache that passes evicted values to `hook`.
    #[must_use]
    pub fn with_release_hook(capacity: NonZeroUsize, hook: ReleaseHook<K, V>) -> Self {
        Self {
            entries: LruCache::new(capacity),
            release: Some(hook),
            stats: CacheStats::default(),
        }
    }

    /// Insert or replace `key`, making it the most recently used entry.
    pub fn put(&mut self, key: K, value: V) {
        if self.entries.contains(&key) {
            self.entries.put(key, value);
            return;
        }

        if self.entries.len() == self.entries.cap().get() {
            if let Some((old_key, old_value)) = self.entries.pop_lru() {
                self.stats.evictions += 1;
                self.release(old_key, old_value);
            }
        }
        self.entries.put(key, value);
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let value = self.entries.get(key);
        if value.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        value
    }

    /// Membership test that leaves the usage order alone.
    #[must_use]
    pub fn has(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Release every resident value and empty the cache.
    pub fn clear(&mut self) {
        while let Some((key, value)) = self.entries.pop_lru() {
            self.release(key, value);
        }
    }

    /// Number of resident entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Resident keys, least recently used first.
    #[must_use]
    pub fn resident_keys(&self) -> Vec<K> {
        self.entries.iter().rev().map(|(k, _)| k.clone()).collect()
    }

    /// Lookup counters since creation.
    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    fn release(&mut self, key: K, value: V) {
        if let Some(hook) = self.release.as_mut() {
            hook(key, value);
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for NodeCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.entries.cap())
            .field("has_release_hook", &self.release.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("non-zero capacity")
    }

    fn recording_cache(n: usize) -> (NodeCache<u64, &'static str>, Rc<RefCell<Vec<u64>>>) {
        let released = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&released);
        let cache = NodeCache::with_release_hook(
            cap(n),
            Box::new(move |key, _value| sink.borrow_mut().push(key)),
        );
        (cache, released)
    }

    #[test]
    fn test_put_and_get() {
        let mut cache = NodeCache::new(cap(2));
        cache.put(1u64, "one");
        cache.put(2, "two");

        assert_eq!(cache.get(&1), Some(&"one"));
        assert_eq!(cache.get(&3), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let (mut cache, released) = recording_cache(2);
        cache.put(1, "one");
        cache.put(2, "two");

        // Touch 1 so that 2 becomes the eviction candidate.
        assert!(cache.get(&1).is_some());
        cache.put(3, "three");

        assert!(cache.has(&1));
        assert!(!cache.has(&2));
        assert!(cache.has(&3));
        assert_eq!(*released.borrow(), vec![2]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_has_does_not_touch_order() {
        let (mut cache, released) = recording_cache(2);
        cache.put(1, "one");
        cache.put(2, "two");

        assert!(cache.has(&1));
        cache.put(3, "three");

        assert!(!cache.has(&1));
        assert_eq!(*released.borrow(), vec![1]);
    }

    #[test]
    fn test_replace_marks_use_without_release() {
        let (mut cache, released) = recording_cache(2);
        cache.put(1, "one");
        cache.put(2, "two");
        cache.put(1, "uno");

        assert_eq!(cache.len(), 2);
        assert!(released.borrow().is_empty());
        assert_eq!(cache.resident_keys(), vec![2, 1]);

        cache.put(3, "three");
        assert_eq!(*released.borrow(), vec![2]);
        assert_eq!(cache.get(&1), Some(&"uno"));
    }

    #[test]
    fn test_clear_releases_everything() {
        let (mut cache, released) = recording_cache(4);
        cache.put(1, "one");
        cache.put(2, "two");
        cache.put(3, "three");

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(*released.borrow(), vec![1, 2, 3]);
        assert_eq!(cache.capacity(), 4);
    }

    #[test]
    fn test_default_hook_is_noop() {
        let mut cache = NodeCache::new(cap(1));
        cache.put(1u64, String::from("one"));
        cache.put(2, String::from("two"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hit_rate() {
        let mut cache = NodeCache::new(cap(1));
        assert!(cache.stats().hit_rate().abs() < f64::EPSILON);
        cache.put(1u64, ());
        let _ = cache.get(&1);
        let _ = cache.get(&2);
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
