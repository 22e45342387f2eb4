//! # Cache Index
//!
//! The index is a single JSON-lines file mapping each key to its entry. It is
//! read in full and rewritten in full on every mutation; a rewrite goes to a
//! temporary file in the cache root that is then renamed over the index, so
//! the file on disk is always a complete snapshot.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::types::CacheEntry;
use crate::error::Result;

#[derive(Deserialize)]
struct IndexRecord {
    key: String,
    entry: CacheEntry,
}

#[derive(Serialize)]
struct IndexRecordRef<'a> {
    key: &'a str,
    entry: &'a CacheEntry,
}

/// In-memory copy of the persisted index
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CacheIndex {
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheIndex {
    /// Load the index at `path`. A missing file is an empty index.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = BTreeMap::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<IndexRecord>(line) {
                Ok(record) => {
                    entries.insert(record.key, record.entry);
                }
                Err(e) => {
                    warn!(
                        path = ?path,
                        line = line_no + 1,
                        error = %e,
                        "Skipping unreadable cache index line"
                    );
                }
            }
        }

        Ok(Self { entries })
    }

    /// Replace the index at `path` with this snapshot
    pub(crate) fn persist(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::Builder::new()
            .prefix("dig-open-data-index-")
            .suffix(".jsonl")
            .tempfile_in(dir)?;

        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for (key, entry) in &self.entries {
                serde_json::to_writer(&mut writer, &IndexRecordRef { key, entry })?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }

        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key)
    }

    pub(crate) fn insert(&mut self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn total_size(&self) -> u64 {
        self.entries.values().map(|entry| entry.size).sum()
    }

    /// Key of the entry with the oldest `last_access`
    pub(crate) fn least_recently_used(&self) -> Option<&str> {
        self.entries
            .iter()
            .min_by(|(_, a), (_, b)| a.last_access.total_cmp(&b.last_access))
            .map(|(key, _)| key.as_str())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }
}
