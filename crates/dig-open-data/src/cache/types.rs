//! # Cache Types
//!
//! Configuration and persisted records shared by the cache store and the opener.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Default byte budget for the on-disk cache (10 GiB)
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024 * 1024;

pub const ENV_CACHE_DIR: &str = "DIG_OPEN_DATA_CACHE_DIR";
pub const ENV_CACHE_MAX_BYTES: &str = "DIG_OPEN_DATA_CACHE_MAX_BYTES";
pub const ENV_CACHE_TTL_DAYS: &str = "DIG_OPEN_DATA_CACHE_TTL_DAYS";

const SECONDS_PER_DAY: f64 = 24.0 * 60.0 * 60.0;

/// Settings for the on-disk object cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Root directory holding the index and the objects directory
    pub dir: PathBuf,
    /// Byte budget enforced by eviction after every put
    pub max_bytes: u64,
    /// Entries idle for longer than this many days are treated as misses
    pub ttl_days: Option<f64>,
}

impl CacheConfig {
    /// Create a cache configuration rooted at `dir` with the default budget and no TTL
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_bytes: DEFAULT_MAX_BYTES,
            ttl_days: None,
        }
    }

    /// Set the byte budget
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set the time-to-live in days. Non-positive values disable expiry.
    pub fn with_ttl_days(mut self, ttl_days: f64) -> Self {
        self.ttl_days = (ttl_days > 0.0).then_some(ttl_days);
        self
    }

    /// TTL expressed in seconds, if one is configured
    pub fn ttl_seconds(&self) -> Option<f64> {
        self.ttl_days.map(|days| days * SECONDS_PER_DAY)
    }

    /// Build a configuration from the process environment.
    ///
    /// Returns `None` when no cache directory is set, which disables caching.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let dir = lookup(ENV_CACHE_DIR).filter(|value| !value.is_empty())?;
        let mut config = Self::new(dir);

        if let Some(max_bytes) = lookup(ENV_CACHE_MAX_BYTES).and_then(|v| v.trim().parse().ok()) {
            config.max_bytes = max_bytes;
        }
        let ttl_days = lookup(ENV_CACHE_TTL_DAYS).and_then(|v| v.trim().parse::<f64>().ok());
        if let Some(ttl_days) = ttl_days {
            config = config.with_ttl_days(ttl_days);
        }

        Some(config)
    }
}

/// Validators describing a remote object at the time it was fetched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
}

impl ObjectMetadata {
    /// Whether two descriptions of the same object disagree on any field both sides know
    pub fn conflicts_with(&self, other: &ObjectMetadata) -> bool {
        fn differs<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            matches!((a, b), (Some(a), Some(b)) if a != b)
        }

        differs(&self.etag, &other.etag)
            || differs(&self.last_modified, &other.last_modified)
            || differs(&self.content_length, &other.content_length)
    }
}

/// Persisted record locating the cached bytes for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub size: u64,
    pub created_at: f64,
    pub last_access: f64,
    #[serde(flatten)]
    pub metadata: ObjectMetadata,
}

impl CacheEntry {
    pub(crate) fn new(path: &Path, size: u64, metadata: ObjectMetadata, now: f64) -> Self {
        Self {
            path: path.to_path_buf(),
            size,
            created_at: now,
            last_access: now,
            metadata,
        }
    }

    pub(crate) fn is_expired(&self, ttl_seconds: Option<f64>, now: f64) -> bool {
        ttl_seconds.is_some_and(|ttl| now - self.last_access > ttl)
    }
}

/// Snapshot of what the cache currently holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
}

/// Current wall-clock time as fractional seconds since the Unix epoch
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
