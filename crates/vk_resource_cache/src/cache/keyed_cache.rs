//! Content-addressed object cache
//!
//! Each key owns a slot. The first caller for a key builds the object while
//! holding the slot lock, so concurrent callers for the same key wait and then
//! share the result; callers for other keys are not blocked. A failed build
//! caches nothing: the next caller builds again, and the slot is removed once
//! no other caller holds it.

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::error::ResourceResult;

type Slot<V> = Arc<Mutex<Option<Arc<V>>>>;

/// Produces the object for a key on a cache miss
pub trait Builder<K, V> {
    /// Build the object for `key`
    fn build(self, key: &K) -> ResourceResult<V>;
}

impl<K, V, F> Builder<K, V> for F
where
    F: FnOnce(&K) -> ResourceResult<V>,
{
    fn build(self, key: &K) -> ResourceResult<V> {
        self(key)
    }
}

/// Cache of immutable objects keyed by their full description
///
/// Entries are never evicted implicitly; [`KeyedCache::clear`] drops them all.
pub struct KeyedCache<K, V> {
    slots: RwLock<FxHashMap<K, Slot<V>>>,
}

impl<K, V> Default for KeyedCache<K, V> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(FxHashMap::default()),
        }
    }
}

impl<K, V> KeyedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &K) -> Slot<V> {
        if let Some(slot) = self.slots.read().get(key) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().entry(key.clone()).or_default())
    }

    /// Return the object for `key`, building it on a miss
    ///
    /// The second element is `true` when this call built the object. The
    /// builder runs at most once per successful insertion.
    pub fn get_or_build(&self, key: &K, builder: impl Builder<K, V>) -> ResourceResult<(Arc<V>, bool)> {
        let slot = self.slot(key);
        let mut entry = slot.lock();

        if let Some(value) = entry.as_ref() {
            return Ok((Arc::clone(value), false));
        }

        match builder.build(key) {
            Ok(value) => {
                let value = Arc::new(value);
                *entry = Some(Arc::clone(&value));
                Ok((value, true))
            }
            Err(error) => {
                drop(entry);
                self.remove_empty_slot(key, &slot);
                Err(error)
            }
        }
    }

    /// Drop the slot of a failed build unless another caller still holds it
    ///
    /// Slots are only cloned under the map lock, so with the write lock held
    /// a strong count of two (map and `slot`) means no waiter can appear.
    fn remove_empty_slot(&self, key: &K, slot: &Slot<V>) {
        let mut slots = self.slots.write();
        let unused = slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && Arc::strong_count(slot) == 2);
        if unused && slot.lock().is_none() {
            slots.remove(key);
        }
    }

    /// Return the object for `key` if it has been built
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let slot = self.slots.read().get(key).map(Arc::clone)?;
        let entry = slot.lock();
        entry.clone()
    }

    /// Number of built objects
    ///
    /// Waits for builds in progress; keys whose build failed are not counted.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot<V>> = self.slots.read().values().map(Arc::clone).collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    /// Whether no object has been built
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached object
    ///
    /// Objects still referenced elsewhere stay alive until those references go.
    pub fn clear(&self) {
        self.slots.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::error::ResourceError;

    #[test]
    fn test_second_request_returns_same_object() {
        let cache = KeyedCache::<u32, String>::new();

        let (first, built) = cache
            .get_or_build(&1, |key: &u32| -> ResourceResult<String> { Ok(format!("object {key}")) })
            .unwrap();
        assert!(built);
        let (second, built) = cache
            .get_or_build(&1, |_: &u32| -> ResourceResult<String> { panic!("must not rebuild") })
            .unwrap();

        assert!(!built);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_keys_build_distinct_objects() {
        let cache = KeyedCache::<u32, u32>::new();

        let (a, _) = cache.get_or_build(&1, |key: &u32| -> ResourceResult<u32> { Ok(key * 10) }).unwrap();
        let (b, _) = cache.get_or_build(&2, |key: &u32| -> ResourceResult<u32> { Ok(key * 10) }).unwrap();

        assert_eq!((*a, *b), (10, 20));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failed_build_is_retried() {
        let cache = KeyedCache::<u32, u32>::new();

        let result = cache.get_or_build(&7, |_: &u32| -> ResourceResult<u32> {
            Err(ResourceError::invalid("nope"))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
        assert!(cache.get(&7).is_none());

        let (value, built) = cache.get_or_build(&7, |_: &u32| -> ResourceResult<u32> { Ok(49) }).unwrap();
        assert!(built);
        assert_eq!(*value, 49);
    }

    #[test]
    fn test_failed_builds_leave_no_slots() {
        let cache = KeyedCache::<u32, u32>::new();

        for key in 0..1000 {
            let result = cache.get_or_build(&key, |_: &u32| -> ResourceResult<u32> {
                Err(ResourceError::invalid("rejected"))
            });
            assert!(result.is_err());
        }

        assert!(cache.slots.read().is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_len_counts_entries_locked_by_readers() {
        let cache = KeyedCache::<u32, u32>::new();
        cache.get_or_build(&1, |_: &u32| -> ResourceResult<u32> { Ok(1) }).unwrap();
        let slot = cache.slot(&1);
        let barrier = Barrier::new(2);

        thread::scope(|scope| {
            scope.spawn(|| {
                let entry = slot.lock();
                barrier.wait();
                thread::sleep(std::time::Duration::from_millis(20));
                drop(entry);
            });

            barrier.wait();
            assert_eq!(cache.len(), 1);
        });
    }

    #[test]
    fn test_concurrent_requests_build_once() {
        const THREADS: usize = 8;
        let cache = KeyedCache::<&'static str, usize>::new();
        let builds = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);

        let results: Vec<Arc<usize>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        let (value, _) = cache
                            .get_or_build(&"shared", |_: &&'static str| -> ResourceResult<usize> {
                                thread::sleep(std::time::Duration::from_millis(5));
                                Ok(builds.fetch_add(1, Ordering::SeqCst))
                            })
                            .unwrap();
                        value
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|value| Arc::ptr_eq(value, &results[0])));
    }

    #[test]
    fn test_clear_drops_entries() {
        let cache = KeyedCache::<u32, u32>::new();
        let (kept, _) = cache.get_or_build(&1, |_: &u32| -> ResourceResult<u32> { Ok(1) }).unwrap();

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(*kept, 1);
        let (rebuilt, built) = cache.get_or_build(&1, |_: &u32| -> ResourceResult<u32> { Ok(1) }).unwrap();
        assert!(built);
        assert!(!Arc::ptr_eq(&kept, &rebuilt));
    }
}
