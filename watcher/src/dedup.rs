// LRU Dedup Set, spec §4.2. Bounded, thread-safe set of recently processed
// transaction hashes.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

pub struct DedupSet {
    inner: Mutex<LruCache<String, ()>>,
}

impl DedupSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Checks membership, moving the key to most-recently-used on a hit.
    pub fn contains(&self, key: &str) -> bool {
        let mut cache = self.inner.lock().unwrap();
        cache.get(key).is_some()
    }

    /// Inserts the key, bumping it if already present; evicts the
    /// least-recently-used entry if this insert is over capacity.
    pub fn add(&self, key: impl Into<String>) {
        let mut cache = self.inner.lock().unwrap();
        cache.put(key.into(), ());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_contains_is_true() {
        let set = DedupSet::new(4);
        set.add("0xabc");
        assert!(set.contains("0xabc"));
        assert!(!set.contains("0xdef"));
    }

    #[test]
    fn evicts_least_recently_used_over_capacity() {
        let set = DedupSet::new(2);
        set.add("a");
        set.add("b");
        set.add("c"); // evicts "a"
        assert!(!set.contains("a"));
        assert!(set.contains("b"));
        assert!(set.contains("c"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn contains_hit_refreshes_recency() {
        let set = DedupSet::new(2);
        set.add("a");
        set.add("b");
        assert!(set.contains("a")); // bump a to most-recent
        set.add("c"); // should evict "b", not "a"
        assert!(set.contains("a"));
        assert!(!set.contains("b"));
    }

    #[test]
    fn adding_existing_key_does_not_grow_len() {
        let set = DedupSet::new(4);
        set.add("a");
        set.add("a");
        assert_eq!(set.len(), 1);
    }
}
