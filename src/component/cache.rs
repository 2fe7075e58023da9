//! Memoized transforms.
//!
//! Transforming is pure, so results (including failures) are cached by a
//! digest of the source and requested export. The cache holds a fixed number
//! of entries and evicts the least recently used one when full.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::{ComponentFactory, Transform, TransformError};

type Key = [u8; 32];
type Cached = Arc<Result<ComponentFactory, TransformError>>;

/// Entries kept by [`TransformCache::new`].
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

#[derive(Default)]
struct Entries {
    map: HashMap<Key, (Cached, u64)>,
    clock: u64,
}

impl Entries {
    fn get(&mut self, key: &Key) -> Option<Cached> {
        self.clock += 1;
        let clock = self.clock;
        self.map.get_mut(key).map(|(result, used)| {
            *used = clock;
            result.clone()
        })
    }

    fn insert(&mut self, key: Key, result: Cached, capacity: usize) {
        self.clock += 1;
        if !self.map.contains_key(&key) && self.map.len() >= capacity {
            let oldest = self
                .map
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                self.map.remove(&oldest);
            }
        }
        self.map.insert(key, (result, self.clock));
    }
}

/// Bounded LRU cache in front of a [`Transform`].
pub struct TransformCache<T: Transform> {
    inner: T,
    capacity: usize,
    entries: Mutex<Entries>,
}

impl<T: Transform> TransformCache<T> {
    /// Wrap `inner`, keeping up to [`DEFAULT_CACHE_CAPACITY`] results.
    pub fn new(inner: T) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    /// Wrap `inner`, keeping up to `capacity` results (at least one).
    pub fn with_capacity(inner: T, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    fn key(source: &str, export_name: Option<&str>) -> Key {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(source.len() as u64).to_le_bytes());
        hasher.update(source.as_bytes());
        match export_name {
            Some(name) => {
                hasher.update(&[1]);
                hasher.update(name.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        *hasher.finalize().as_bytes()
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    /// Most results kept at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().map.is_empty()
    }

    /// Drop every cached result.
    pub fn clear(&self) {
        self.entries.lock().map.clear();
    }
}

impl<T: Transform> Transform for TransformCache<T> {
    fn transform(
        &self,
        source: &str,
        export_name: Option<&str>,
    ) -> Result<ComponentFactory, TransformError> {
        let key = Self::key(source, export_name);
        if let Some(hit) = self.entries.lock().get(&key) {
            trace!(export = ?export_name, "transform cache hit");
            return (*hit).clone();
        }
        let result = Arc::new(self.inner.transform(source, export_name));
        self.entries.lock().insert(key, result.clone(), self.capacity);
        (*result).clone()
    }
}

impl<T: Transform + std::fmt::Debug> std::fmt::Debug for TransformCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformCache")
            .field("inner", &self.inner)
            .field("capacity", &self.capacity)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::component::JsxTransform;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Transform for Counting {
        fn transform(
            &self,
            source: &str,
            export_name: Option<&str>,
        ) -> Result<ComponentFactory, TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            JsxTransform.transform(source, export_name)
        }
    }

    #[test]
    fn test_repeat_transforms_hit_cache() {
        let cache = TransformCache::new(Counting::default());
        let source = "export const A = () => <a/>; export const B = () => <b/>;";
        let first = cache.transform(source, Some("A")).unwrap();
        let again = cache.transform(source, Some("A")).unwrap();
        assert_eq!(first.id(), again.id());
        cache.transform(source, Some("B")).unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failures_are_cached() {
        let cache = TransformCache::new(Counting::default());
        let a = cache.transform("const = ;", None).unwrap_err();
        let b = cache.transform("const = ;", None).unwrap_err();
        assert_eq!(a, b);
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_stays_bounded_and_evicts_least_recent() {
        let cache = TransformCache::with_capacity(Counting::default(), 3);
        let source = |n: usize| format!("export default () => <p>{n}</p>;");

        for n in 0..50 {
            cache.transform(&source(n), None).unwrap();
            assert!(cache.len() <= cache.capacity());
        }
        assert_eq!(cache.len(), 3);

        // Touch 47 so that 48 becomes the oldest.
        cache.transform(&source(47), None).unwrap();
        cache.transform(&source(50), None).unwrap();
        let calls = cache.inner.calls.load(Ordering::SeqCst);

        cache.transform(&source(47), None).unwrap();
        cache.transform(&source(49), None).unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), calls);

        cache.transform(&source(48), None).unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), calls + 1);
        assert_eq!(cache.len(), 3);
    }
}
