use std::sync::Arc;

/// Represents a back-end cache storage.
pub trait CacheStorage<V>: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<V>;

    /// Stores `value` under `key` unless the key is already present.
    ///
    /// Returns the value held by the cache after the call: `value` itself if
    /// it was inserted, otherwise the existing value.
    fn insert_if_absent(&self, key: &str, value: V) -> V;
}

impl<V, T: CacheStorage<V> + ?Sized> CacheStorage<V> for Arc<T> {
    #[inline]
    fn get(&self, key: &str) -> Option<V> {
        T::get(self, key)
    }

    #[inline]
    fn insert_if_absent(&self, key: &str, value: V) -> V {
        T::insert_if_absent(self, key, value)
    }
}
