use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::consensus::ExtendedState;
use crate::crypto::Hash;

/// An LRU cache of recent post-block states, keyed by block id.
///
/// Every lookup hands back a deep copy of the cached `ExtendedState` so
/// callers can mutate it (to walk a block forward) without corrupting the
/// cache.
pub struct StateCache {
    inner: Mutex<LruCache<Hash, ExtendedState>>,
}

impl StateCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).expect("state cache capacity must be non-zero");
        Self { inner: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn insert(&self, key: Hash, value: ExtendedState) {
        self.inner.lock().expect("state cache mutex poisoned").put(key, value);
    }

    pub fn get(&self, key: &Hash) -> Option<ExtendedState> {
        self.inner.lock().expect("state cache mutex poisoned").get(key).cloned()
    }

    pub fn contains(&self, key: &Hash) -> bool {
        self.inner.lock().expect("state cache mutex poisoned").contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_of_null;

    fn id(tag: u8) -> Hash {
        let mut h = [0u8; 32];
        h[0] = tag;
        h
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = StateCache::new(2);
        cache.insert(id(1), ExtendedState::new());
        cache.insert(id(2), ExtendedState::new());
        // touch id(1) so it becomes MRU
        assert!(cache.get(&id(1)).is_some());
        cache.insert(id(3), ExtendedState::new());
        assert!(cache.contains(&id(1)));
        assert!(!cache.contains(&id(2)));
        assert!(cache.contains(&id(3)));
    }

    #[test]
    fn returns_independent_copies() {
        let cache = StateCache::new(2);
        cache.insert(hash_of_null(), ExtendedState::new());
        let mut copy = cache.get(&hash_of_null()).unwrap();
        copy.age = 99;
        assert_eq!(cache.get(&hash_of_null()).unwrap().age, 0);
    }
}
