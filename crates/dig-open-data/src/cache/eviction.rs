//! # Eviction
//!
//! Size-bounded LRU eviction over the cache index.

use std::fs;
use std::io;
use std::path::Path;

use humansize::{BINARY, format_size};
use tracing::{debug, info};

use crate::cache::index::CacheIndex;
use crate::cache::types::CacheEntry;
use crate::error::Result;

/// Evict least-recently-used entries until the index fits in `max_bytes`.
///
/// The last remaining entry is never evicted, even when it alone exceeds the
/// budget. `persist` is called after every removal. Returns the evicted
/// entries in eviction order.
pub(crate) fn evict_to_budget(
    index: &mut CacheIndex,
    max_bytes: u64,
    mut persist: impl FnMut(&CacheIndex) -> Result<()>,
) -> Result<Vec<(String, CacheEntry)>> {
    let mut evicted = Vec::new();
    let mut total = index.total_size();

    while total > max_bytes && index.len() > 1 {
        let Some(key) = index.least_recently_used().map(str::to_owned) else {
            break;
        };
        let Some(entry) = index.remove(&key) else {
            break;
        };

        remove_backing_file(&entry.path);
        persist(index)?;
        total = index.total_size();

        info!(
            key = %key,
            size = %format_size(entry.size, BINARY),
            remaining = %format_size(total, BINARY),
            "Evicted cache entry"
        );
        evicted.push((key, entry));
    }

    Ok(evicted)
}

/// Delete a cached file, ignoring files that are already gone or cannot be removed
pub(crate) fn remove_backing_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = ?path, error = %e, "Could not remove cached file"),
    }
}
