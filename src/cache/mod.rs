//! Shared caches.
//!
//! A [`CacheStorage`] is shared by every request of a process (or, for
//! external backends, of a deployment). Writes use insert-if-absent
//! semantics, so two requests racing to build the same entry end up sharing
//! whichever value was stored first.

mod cache_storage;
mod memory_storage;

pub use cache_storage::CacheStorage;
pub use memory_storage::MemoryStorage;
