//! # Downloader
//!
//! Copies a resolved byte stream into a fresh temporary file, retrying the
//! whole transfer from scratch on any failure. The object is never held in
//! memory; bytes move through a fixed-size buffer.

use std::io::{self, BufWriter, Write};
use std::path::Path;

use humansize::{BINARY, format_size};
use tempfile::{NamedTempFile, TempPath};
use tracing::{info, instrument, warn};

use crate::cache::{ObjectMetadata, PARTIAL_SUFFIX};
use crate::config::TransportConfig;
use crate::error::{DataError, Result};
use crate::location::Location;
use crate::source::open_source;
use crate::transport::Transport;

const TEMP_PREFIX: &str = "dig-open-data-";
const TEMP_SUFFIX: &str = ".tmp";
const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// A completed download. The file is deleted when this is dropped unless it
/// has been moved elsewhere or kept.
#[derive(Debug)]
pub struct DownloadedFile {
    pub path: TempPath,
    /// Exact number of bytes written
    pub size: u64,
    pub metadata: ObjectMetadata,
}

/// Streams objects to local temporary files
pub struct Downloader<'a> {
    transport: &'a dyn Transport,
    config: &'a TransportConfig,
}

impl<'a> Downloader<'a> {
    pub fn new(transport: &'a dyn Transport, config: &'a TransportConfig) -> Self {
        Self { transport, config }
    }

    /// Download `location`, making up to `retries` further attempts after the
    /// first one fails.
    ///
    /// With `staging_dir` set, the temp file is created there with a
    /// `.partial` suffix; otherwise it goes to the system temp directory.
    /// Exhausting the attempts returns the last error.
    #[instrument(skip(self), level = "debug")]
    pub fn download_with_retries(
        &self,
        location: &Location,
        retries: u32,
        staging_dir: Option<&Path>,
    ) -> Result<DownloadedFile> {
        let attempts = u64::from(retries) + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.download_once(location, staging_dir) {
                Ok(file) => {
                    info!(
                        location = ?location,
                        attempt,
                        size = %format_size(file.size, BINARY),
                        "Download complete"
                    );
                    return Ok(file);
                }
                Err(err) => {
                    warn!(
                        location = ?location,
                        attempt,
                        attempts,
                        error = %err,
                        "Download attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::NoEndpoint(format!("{location:?}"))))
    }

    fn download_once(
        &self,
        location: &Location,
        staging_dir: Option<&Path>,
    ) -> Result<DownloadedFile> {
        let mut source = open_source(location, self.transport, self.config)?;
        let expected = source.metadata.content_length;

        let mut tmp = new_temp_file(staging_dir)?;
        let size = {
            let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, tmp.as_file_mut());
            let size = io::copy(&mut source.reader, &mut writer)?;
            writer.flush()?;
            size
        };

        match expected {
            Some(expected) if size < expected => {
                return Err(DataError::Truncated {
                    expected,
                    received: size,
                });
            }
            _ => {}
        }

        Ok(DownloadedFile {
            path: tmp.into_temp_path(),
            size,
            metadata: source.metadata,
        })
    }
}

fn new_temp_file(staging_dir: Option<&Path>) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_PREFIX);
    match staging_dir {
        Some(dir) => builder.suffix(PARTIAL_SUFFIX).tempfile_in(dir),
        None => builder.suffix(TEMP_SUFFIX).tempfile(),
    }
}
