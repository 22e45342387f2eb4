//! # Opener
//!
//! Entry point for reading datasets. An [`Opener`] classifies a URI, decides
//! between the cache, a throwaway staged download and a direct stream, and
//! hands back a decoded [`DataStream`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheEntry, CacheStore};
use crate::config::OpenerConfig;
use crate::downloader::{DownloadedFile, Downloader};
use crate::error::Result;
use crate::lines::{ResumableLines, TsvRecords};
use crate::location::{Location, resolve_uri};
use crate::source::{head_remote, open_local, open_source};
use crate::stream::DataStream;
use crate::transport::{HttpTransport, Transport};

/// Opens dataset URIs according to an [`OpenerConfig`]
pub struct Opener {
    config: OpenerConfig,
    transport: Arc<dyn Transport>,
    cache: Option<CacheStore>,
}

impl Opener {
    /// Create an opener backed by an HTTPS client built from `config`
    pub fn new(config: OpenerConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config.transport)?);
        Self::with_transport(config, transport)
    }

    /// Create an opener that fetches remote objects through `transport`
    pub fn with_transport(config: OpenerConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let cache = config.cache.clone().map(CacheStore::open).transpose()?;
        if let Some(store) = &cache {
            debug!(
                dir = ?store.config().dir,
                max_bytes = store.config().max_bytes,
                "Cache enabled"
            );
        }

        Ok(Self {
            config,
            transport,
            cache,
        })
    }

    /// Create an opener configured from the `DIG_OPEN_DATA_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenerConfig::from_env())
    }

    pub fn config(&self) -> &OpenerConfig {
        &self.config
    }

    /// The cache store, when caching is configured
    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    /// Open `uri` for reading.
    ///
    /// Remote objects go through the cache when one is configured; otherwise
    /// they are staged in a temp file if requested, or streamed directly.
    ///
    /// The returned stream does not recover from failures in the middle of a
    /// direct stream. Recovery works line by line through [`Opener::lines`].
    #[instrument(skip(self), level = "debug")]
    pub fn open(&self, uri: &str) -> Result<DataStream> {
        let location = Location::parse(uri)?;

        if !location.is_remote() {
            return self.stream(&location);
        }

        if let Some(store) = &self.cache {
            return self.open_cached(store, &resolve_uri(uri), &location);
        }

        if self.config.stage_locally {
            let file = self.downloader().download_with_retries(
                &location,
                self.config.retries,
                None,
            )?;
            debug!(uri = %uri, path = ?file.path, "Reading staged copy");
            let stream = DataStream::from_source(open_local(&file.path)?);
            return Ok(stream.with_staged(file.path));
        }

        self.stream(&location)
    }

    /// Whether `uri` names an existing file or object
    pub fn exists(&self, uri: &str) -> Result<bool> {
        match Location::parse(uri)? {
            Location::LocalFile(path) => Ok(path.exists()),
            location => Ok(head_remote(&location, self.transport.as_ref())?.is_some()),
        }
    }

    /// Download `uri` into a temporary file in the system temp directory,
    /// retrying the whole transfer up to `retries` more times.
    pub fn download_with_retries(&self, uri: &str, retries: u32) -> Result<DownloadedFile> {
        let location = Location::parse(uri)?;
        self.downloader()
            .download_with_retries(&location, retries, None)
    }

    /// Lines of `uri`, replaying from the start after mid-stream failures
    pub fn lines(&self, uri: &str) -> ResumableLines<'_> {
        ResumableLines::new(self, uri)
    }

    /// Every line of `uri`, or the last error once retries are exhausted
    pub fn read_lines(&self, uri: &str) -> Result<Vec<String>> {
        self.lines(uri).collect()
    }

    /// Header-keyed rows of a delimited text file
    pub fn tsv_records(&self, uri: &str, delimiter: char) -> TsvRecords<'_> {
        TsvRecords::new(self.lines(uri), delimiter)
    }

    fn downloader(&self) -> Downloader<'_> {
        Downloader::new(self.transport.as_ref(), &self.config.transport)
    }

    fn stream(&self, location: &Location) -> Result<DataStream> {
        let source = open_source(location, self.transport.as_ref(), &self.config.transport)?;
        Ok(DataStream::from_source(source))
    }

    fn open_cached(
        &self,
        store: &CacheStore,
        key: &str,
        location: &Location,
    ) -> Result<DataStream> {
        let hit = if self.config.cache_refresh {
            None
        } else {
            store.get(key)?
        };

        if let Some(entry) = hit {
            if !self.config.revalidate || self.is_current(store, key, &entry, location)? {
                return Ok(DataStream::from_source(open_local(&entry.path)?));
            }
        }

        let DownloadedFile {
            path: staged,
            size,
            metadata,
        } = self.downloader().download_with_retries(
            location,
            self.config.retries,
            Some(store.objects_dir()),
        )?;

        let committed = store.put_with_metadata(key, &staged, size, metadata)?;
        // Renamed into place; nothing left behind to clean up
        if let Err(err) = staged.keep() {
            debug!(key = %key, error = %err, "Could not release staged download");
        }

        info!(key = %key, path = ?committed, "Cached remote object");
        Ok(DataStream::from_source(open_local(&committed)?))
    }

    /// Compare a cache hit against the remote validators, dropping it when stale.
    /// An unreachable or missing remote keeps the cached copy.
    fn is_current(
        &self,
        store: &CacheStore,
        key: &str,
        entry: &CacheEntry,
        location: &Location,
    ) -> Result<bool> {
        match head_remote(location, self.transport.as_ref()) {
            Ok(Some(remote)) if entry.metadata.conflicts_with(&remote) => {
                info!(
                    key = %key,
                    cached = ?entry.metadata,
                    remote = ?remote,
                    "Cached copy is stale"
                );
                store.delete(key)?;
                Ok(false)
            }
            Ok(Some(_)) => Ok(true),
            Ok(None) => {
                warn!(key = %key, "Remote object is gone, keeping cached copy");
                Ok(true)
            }
            Err(err) => {
                warn!(key = %key, error = %err, "Revalidation failed, keeping cached copy");
                Ok(true)
            }
        }
    }
}

impl fmt::Debug for Opener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opener")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
