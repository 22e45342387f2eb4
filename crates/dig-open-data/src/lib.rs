//! # Dig Open Data
//!
//! Resilient, streaming reads of gzip-compressed tabular datasets kept on
//! local disk or in public S3-compatible object storage.
//!
//! ## Features
//!
//! - Endpoint fallback across virtual-hosted and path-style S3 URLs
//! - Gzip detection by magic number rather than file name
//! - Whole-transfer download retries with truncation detection
//! - Line reading that resumes after mid-stream failures
//! - Optional on-disk object cache with LRU and TTL eviction

pub mod builder;
pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod lines;
pub mod location;
pub mod opener;
pub mod source;
pub mod stream;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use builder::OpenerConfigBuilder;
pub use cache::{CacheConfig, CacheEntry, CacheStats, CacheStore, ObjectMetadata};
pub use config::{OpenerConfig, TransportConfig};
pub use downloader::{DownloadedFile, Downloader};
pub use error::{DataError, Result};
pub use lines::{ResumableLines, TsvRecords};
pub use location::{Location, resolve_uri};
pub use opener::Opener;
pub use stream::DataStream;
pub use transport::{HttpTransport, RemoteObject, Transport, create_client};

/// Open `uri` with an [`Opener`] configured from the environment
pub fn open(uri: &str) -> Result<DataStream> {
    Opener::from_env()?.open(uri)
}

/// Read every line of `uri` with an [`Opener`] configured from the environment
pub fn read_lines(uri: &str) -> Result<Vec<String>> {
    Opener::from_env()?.read_lines(uri)
}
