//! # Cache System
//!
//! On-disk cache of whole remote objects, keyed by source URI, with LRU
//! eviction against a byte budget and optional idle TTL.

mod eviction;
mod index;
mod store;
mod types;

pub use store::CacheStore;
pub(crate) use store::PARTIAL_SUFFIX;
pub use types::{
    CacheConfig, CacheEntry, CacheStats, DEFAULT_MAX_BYTES, ENV_CACHE_DIR, ENV_CACHE_MAX_BYTES,
    ENV_CACHE_TTL_DAYS, ObjectMetadata,
};
