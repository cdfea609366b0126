//! Local credential cache.
//!
//! The session store persists exactly two records, `user` and `tokens`,
//! through a [`CacheManager`]. Where they live is decided by the
//! [`KeyValueCache`] behind it: JSON files in the user's cache directory, or
//! process memory.

pub mod manager;
pub mod store;

pub use manager::{CacheManager, CachedData};
pub use store::{FileCache, KeyValueCache, MemoryCache};
