//! Content-addressed caching of pipeline objects

pub mod keyed_cache;
pub mod resource_cache;

pub use keyed_cache::{Builder, KeyedCache};
pub use resource_cache::{CacheStats, ResourceCache};
