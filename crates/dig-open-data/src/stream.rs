//! # Data Streams
//!
//! [`DataStream`] is what callers read from: a buffered byte stream that is
//! transparently gunzipped when the source starts with the gzip magic number,
//! whatever the file is called.

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tempfile::TempPath;

use crate::source::ByteSource;

const BUFFER_SIZE: usize = 64 * 1024;

/// Decoded dataset contents
pub struct DataStream {
    inner: Box<dyn BufRead + Send>,
    gzip: bool,
    origin: String,
    // Declared after `inner` so the file handle closes before the temp file is removed
    staged: Option<TempPath>,
}

impl DataStream {
    pub(crate) fn from_source(source: ByteSource) -> Self {
        let inner: Box<dyn BufRead + Send> = if source.gzip {
            Box::new(BufReader::with_capacity(
                BUFFER_SIZE,
                MultiGzDecoder::new(source.reader),
            ))
        } else {
            Box::new(BufReader::with_capacity(BUFFER_SIZE, source.reader))
        };

        Self {
            inner,
            gzip: source.gzip,
            origin: source.origin,
            staged: None,
        }
    }

    /// Tie a throwaway download to this stream; it is deleted on drop
    pub(crate) fn with_staged(mut self, staged: TempPath) -> Self {
        self.staged = Some(staged);
        self
    }

    /// Whether the underlying bytes were gzip-compressed
    pub fn is_gzip(&self) -> bool {
        self.gzip
    }

    /// Path or URL the bytes are read from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Temporary file backing this stream, when the object was staged locally
    pub fn staged_path(&self) -> Option<&Path> {
        self.staged.as_deref()
    }
}

impl std::fmt::Debug for DataStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStream")
            .field("gzip", &self.gzip)
            .field("origin", &self.origin)
            .field("staged", &self.staged_path())
            .finish_non_exhaustive()
    }
}

impl Read for DataStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for DataStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}
