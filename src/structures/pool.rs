use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use crate::error::PoolError;

struct Inner<K, V> {
    obj_dict: HashMap<K, V>,
    obj_list: Vec<Option<K>>,
    index: usize,
}

/// A thread-safe bounded ring of recently seen objects, used to dedup gossip.
/// Inserting past capacity evicts the oldest entry (FIFO).
pub struct Pool<K, V = ()> {
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V> Pool<K, V> {
    pub fn new(size: usize) -> Self {
        assert!(size > 0);
        let obj_list = std::iter::repeat_with(|| None).take(size).collect();
        Self { inner: Mutex::new(Inner { obj_dict: HashMap::new(), obj_list, index: 0 }) }
    }

    /// Try to add an object, evicting the oldest one if the pool is full.
    /// Returns `true` if the object was actually added (i.e. it was not
    /// already present) — this makes duplicate suppression race-free.
    pub fn add(&self, obj: K, val: V) -> bool {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        if inner.obj_dict.contains_key(&obj) {
            return false;
        }

        let index = inner.index;
        if let Some(oldest) = inner.obj_list[index].take() {
            inner.obj_dict.remove(&oldest);
        }

        inner.obj_list[index] = Some(obj.clone());
        inner.obj_dict.insert(obj, val);
        inner.index = (index + 1) % inner.obj_list.len();
        true
    }

    /// Remove and return the value associated with `obj`, if present.
    pub fn pop(&self, obj: &K) -> Result<V, PoolError> {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        inner.obj_dict.remove(obj).ok_or(PoolError::NotFound)
    }

    pub fn contains(&self, obj: &K) -> bool {
        self.inner.lock().expect("pool mutex poisoned").obj_dict.contains_key(obj)
    }
}

impl<K: Eq + Hash + Clone> Pool<K, ()> {
    /// Convenience for pools that only track membership (tx/block/addr id pools).
    pub fn add_id(&self, obj: K) -> bool {
        self.add(obj, ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_until_eviction() {
        let pool: Pool<u32> = Pool::new(2);
        assert!(pool.add_id(1));
        assert!(!pool.add_id(1));
        assert!(pool.add_id(2));
        // capacity 2 full; adding a third evicts the oldest (1)
        assert!(pool.add_id(3));
        assert!(pool.add_id(1));
    }

    #[test]
    fn pop_removes_and_returns_value() {
        let pool: Pool<[u8; 4], &'static str> = Pool::new(4);
        pool.add([1, 2, 3, 4], "token-owner");
        assert_eq!(pool.pop(&[1, 2, 3, 4]).unwrap(), "token-owner");
        assert!(matches!(pool.pop(&[1, 2, 3, 4]), Err(PoolError::NotFound)));
    }
}
