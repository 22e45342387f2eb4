//! # Cache Store
//!
//! Whole-object file cache keyed by source URI. Objects live under
//! `<dir>/objects/<sha256(key)>` and are described by `<dir>/index.jsonl`.
//!
//! The store assumes a single writer per directory. Processes sharing one
//! directory race on renames and index rewrites, and the last writer wins.

use std::fs;
use std::path::{Path, PathBuf};

use humansize::{BINARY, format_size};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::cache::eviction::{evict_to_budget, remove_backing_file};
use crate::cache::index::CacheIndex;
use crate::cache::types::{CacheConfig, CacheEntry, CacheStats, ObjectMetadata, unix_now};
use crate::error::{DataError, Result};

const OBJECTS_DIR: &str = "objects";
const INDEX_FILE: &str = "index.jsonl";
pub(crate) const PARTIAL_SUFFIX: &str = ".partial";

/// Handle on a cache directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    config: CacheConfig,
    objects_dir: PathBuf,
    index_path: PathBuf,
}

impl CacheStore {
    /// Open (and create if needed) the cache described by `config`.
    ///
    /// Leftover `*.partial` downloads from interrupted runs are removed.
    pub fn open(config: CacheConfig) -> Result<Self> {
        let root = std::path::absolute(&config.dir)?;
        let objects_dir = root.join(OBJECTS_DIR);
        let index_path = root.join(INDEX_FILE);
        fs::create_dir_all(&objects_dir)?;

        let store = Self {
            config,
            objects_dir,
            index_path,
        };
        store.cleanup_partials();
        Ok(store)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Directory holding committed objects. Downloads destined for the cache
    /// are staged here so the commit rename never crosses filesystems.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Look up `key`, returning its entry on a fresh hit.
    ///
    /// Entries whose file has disappeared or whose TTL has elapsed are removed
    /// and reported as misses. A hit refreshes `last_access`.
    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.get_at(key, unix_now())
    }

    pub(crate) fn get_at(&self, key: &str, now: f64) -> Result<Option<CacheEntry>> {
        let mut index = self.load_index()?;

        let Some(entry) = index.get_mut(key) else {
            debug!(key = %key, "Cache miss");
            return Ok(None);
        };

        if !entry.path.exists() {
            warn!(key = %key, path = ?entry.path, "Cached file is missing, dropping entry");
            index.remove(key);
            self.persist_index(&index)?;
            return Ok(None);
        }

        if entry.is_expired(self.config.ttl_seconds(), now) {
            debug!(key = %key, last_access = entry.last_access, "Cache entry expired");
            if let Some(entry) = index.remove(key) {
                remove_backing_file(&entry.path);
            }
            self.persist_index(&index)?;
            return Ok(None);
        }

        entry.last_access = now;
        let hit = entry.clone();
        self.persist_index(&index)?;

        debug!(key = %key, path = ?hit.path, "Cache hit");
        Ok(Some(hit))
    }

    /// Commit the file at `source` as the cached bytes for `key`
    pub fn put(&self, key: &str, source: &Path, size: u64) -> Result<PathBuf> {
        self.put_with_metadata(key, source, size, ObjectMetadata::default())
    }

    /// Commit the file at `source` for `key`, recording the remote validators.
    ///
    /// The file is renamed into the objects directory; a failed rename
    /// (including a cross-device one) is returned as [`DataError::Commit`].
    /// Eviction runs before returning.
    pub fn put_with_metadata(
        &self,
        key: &str,
        source: &Path,
        size: u64,
        metadata: ObjectMetadata,
    ) -> Result<PathBuf> {
        self.put_at(key, source, size, metadata, unix_now())
    }

    pub(crate) fn put_at(
        &self,
        key: &str,
        source: &Path,
        size: u64,
        metadata: ObjectMetadata,
        now: f64,
    ) -> Result<PathBuf> {
        let dest = self.object_path(key);
        fs::rename(source, &dest).map_err(|source| DataError::Commit {
            path: dest.clone(),
            source,
        })?;

        let mut index = self.load_index()?;
        index.insert(key, CacheEntry::new(&dest, size, metadata, now));
        self.persist_index(&index)?;

        info!(
            key = %key,
            path = ?dest,
            size = %format_size(size, BINARY),
            "Committed object to cache"
        );

        evict_to_budget(&mut index, self.config.max_bytes, |index| {
            self.persist_index(index)
        })?;

        Ok(dest)
    }

    /// Remove `key` and its file from the cache
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut index = self.load_index()?;
        if let Some(entry) = index.remove(key) {
            remove_backing_file(&entry.path);
            self.persist_index(&index)?;
            debug!(key = %key, "Deleted cache entry");
        }
        Ok(())
    }

    /// Count entries and bytes currently indexed
    pub fn stats(&self) -> Result<CacheStats> {
        let index = self.load_index()?;
        Ok(CacheStats {
            entries: index.len(),
            total_size: index.total_size(),
        })
    }

    /// All indexed keys with their entries, ordered by key
    pub fn entries(&self) -> Result<Vec<(String, CacheEntry)>> {
        let index = self.load_index()?;
        Ok(index
            .iter()
            .map(|(key, entry)| (key.to_string(), entry.clone()))
            .collect())
    }

    /// Deterministic location of the object for `key`
    pub fn object_path(&self, key: &str) -> PathBuf {
        self.objects_dir.join(object_name(key))
    }

    fn load_index(&self) -> Result<CacheIndex> {
        CacheIndex::load(&self.index_path)
    }

    fn persist_index(&self, index: &CacheIndex) -> Result<()> {
        index.persist(&self.index_path)
    }

    fn cleanup_partials(&self) {
        let entries = match fs::read_dir(&self.objects_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = ?self.objects_dir, error = %e, "Failed to scan cache objects");
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_partial = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(PARTIAL_SUFFIX));
            if is_partial {
                debug!(path = ?path, "Removing stale partial download");
                remove_backing_file(&path);
            }
        }
    }
}

/// Object filename for a key: the hex SHA-256 of the key string
pub(crate) fn object_name(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
