//! # Source Selection
//!
//! Turns a [`Location`] into a readable byte stream. Remote objects are tried
//! endpoint by endpoint: an endpoint is selected once a GET succeeds and its
//! first two bytes can be read. Those bytes decide whether the payload is
//! gzip, and since they have been consumed the selected endpoint is opened a
//! second time so the caller starts at offset zero. Local files go through
//! the same sniff-then-reopen sequence.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::thread;

use tracing::{debug, warn};
use url::Url;

use crate::cache::ObjectMetadata;
use crate::config::TransportConfig;
use crate::error::{DataError, Result};
use crate::location::Location;
use crate::transport::{RemoteObject, Transport};

/// Leading bytes of every gzip member
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A raw byte stream at offset zero, with the outcome of gzip sniffing
pub struct ByteSource {
    pub reader: Box<dyn Read + Send>,
    pub gzip: bool,
    pub metadata: ObjectMetadata,
    /// Path or URL the bytes are read from
    pub origin: String,
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource")
            .field("gzip", &self.gzip)
            .field("metadata", &self.metadata)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Open `location` for reading
pub(crate) fn open_source(
    location: &Location,
    transport: &dyn Transport,
    config: &TransportConfig,
) -> Result<ByteSource> {
    match location {
        Location::LocalFile(path) => open_local(path),
        Location::ObjectStorage { .. } => open_remote(location, transport, config),
    }
}

pub(crate) fn open_local(path: &Path) -> Result<ByteSource> {
    let gzip = {
        let mut probe = File::open(path)?;
        sniff_gzip(&mut probe)?
    };

    let file = File::open(path)?;
    let metadata = ObjectMetadata {
        content_length: Some(file.metadata()?.len()),
        ..ObjectMetadata::default()
    };

    Ok(ByteSource {
        reader: Box::new(file),
        gzip,
        metadata,
        origin: path.display().to_string(),
    })
}

fn open_remote(
    location: &Location,
    transport: &dyn Transport,
    config: &TransportConfig,
) -> Result<ByteSource> {
    let endpoints = location.endpoints()?;
    let mut last_error = None;

    for url in &endpoints {
        let probe = get_with_backoff(transport, url, config)
            .and_then(|mut object| Ok(sniff_gzip(&mut object.reader)?));

        match probe {
            Ok(gzip) => {
                debug!(url = %url, gzip, "Selected endpoint");
                let object = get_with_backoff(transport, url, config)?;
                return Ok(ByteSource {
                    reader: object.reader,
                    gzip,
                    metadata: object.metadata,
                    origin: url.to_string(),
                });
            }
            Err(err) => {
                warn!(url = %url, error = %err, "Endpoint failed, trying next");
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| DataError::NoEndpoint(format!("{location:?}"))))
}

/// HEAD a storage object across its endpoints. The first endpoint that gives
/// a definite answer wins; if none does, the last error is returned.
pub(crate) fn head_remote(
    location: &Location,
    transport: &dyn Transport,
) -> Result<Option<ObjectMetadata>> {
    let endpoints = location.endpoints()?;
    let mut last_error = None;

    for url in &endpoints {
        match transport.head(url) {
            Ok(metadata) => return Ok(metadata),
            Err(err) => {
                warn!(url = %url, error = %err, "HEAD failed, trying next endpoint");
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| DataError::NoEndpoint(format!("{location:?}"))))
}

/// GET `url`, retrying transient failures with exponential backoff
fn get_with_backoff(
    transport: &dyn Transport,
    url: &Url,
    config: &TransportConfig,
) -> Result<RemoteObject> {
    let mut attempt = 0;
    loop {
        match transport.get(url) {
            Ok(object) => return Ok(object),
            Err(err) if err.is_transient() && attempt < config.endpoint_retries => {
                let delay = config.backoff.saturating_mul(1 << attempt.min(16));
                debug!(
                    url = %url,
                    attempt = attempt + 1,
                    delay = ?delay,
                    error = %err,
                    "Retrying endpoint"
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Read up to two bytes and report whether they are the gzip magic number.
/// Streams shorter than two bytes are not gzip.
pub(crate) fn sniff_gzip<R: Read + ?Sized>(reader: &mut R) -> io::Result<bool> {
    let mut magic = [0u8; 2];
    let mut filled = 0;
    while filled < magic.len() {
        match reader.read(&mut magic[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled == magic.len() && magic == GZIP_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_test_tracing;
    use crate::test_utils::{ScriptedTransport, Step, gzip_bytes, test_transport_config};
    use std::io::Cursor;

    fn location() -> Location {
        Location::parse("s3://bucket/data/file.tsv.gz").unwrap()
    }

    fn read_all(mut source: ByteSource) -> Vec<u8> {
        let mut out = Vec::new();
        source.reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_sniff_gzip() {
        assert!(sniff_gzip(&mut Cursor::new(gzip_bytes(b"a\n"))).unwrap());
        assert!(!sniff_gzip(&mut Cursor::new(b"a\tb\n".to_vec())).unwrap());
        assert!(!sniff_gzip(&mut Cursor::new(vec![0x1f])).unwrap());
        assert!(!sniff_gzip(&mut Cursor::new(Vec::new())).unwrap());
    }

    #[test]
    fn test_first_endpoint_is_reopened_after_sniffing() {
        init_test_tracing!();
        let payload = gzip_bytes(b"col1\tcol2\n");
        let transport = ScriptedTransport::new(payload.clone());

        let source = open_source(&location(), &transport, &test_transport_config()).unwrap();
        assert!(source.gzip);
        assert_eq!(source.origin, "https://bucket.s3.amazonaws.com/data/file.tsv.gz");

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(read_all(source), payload);
    }

    #[test]
    fn test_falls_back_to_later_endpoint() {
        let transport = ScriptedTransport::new(b"plain\n".to_vec())
            .refuse_prefix("https://bucket.s3.amazonaws.com/")
            .refuse_prefix("https://s3.amazonaws.com/");

        let source = open_source(&location(), &transport, &test_transport_config()).unwrap();
        assert!(!source.gzip);
        assert_eq!(
            source.origin,
            "https://bucket.s3.us-east-1.amazonaws.com/data/file.tsv.gz"
        );
        assert_eq!(transport.calls().len(), 4);
        assert_eq!(read_all(source), b"plain\n");
    }

    #[test]
    fn test_failed_sniff_moves_to_next_endpoint() {
        let transport =
            ScriptedTransport::new(b"plain\n".to_vec()).with_script([Step::FailAfter(0)]);

        let source = open_source(&location(), &transport, &test_transport_config()).unwrap();
        assert_eq!(source.origin, "https://s3.amazonaws.com/bucket/data/file.tsv.gz");
    }

    #[test]
    fn test_exhausted_endpoints_surface_last_error() {
        let transport = ScriptedTransport::new(b"plain\n".to_vec()).refuse_prefix("https://");

        let err = open_source(&location(), &transport, &test_transport_config()).unwrap_err();
        assert!(
            err.to_string()
                .contains("https://s3.us-east-1.amazonaws.com/bucket/data/file.tsv.gz"),
            "unexpected error: {err}"
        );
        assert_eq!(transport.calls().len(), 4);
    }

    #[test]
    fn test_transient_failures_retry_same_endpoint() {
        let transport = ScriptedTransport::new(b"ok\n".to_vec())
            .with_script([Step::Status(503), Step::Status(500)]);
        let config = TransportConfig {
            endpoint_retries: 2,
            ..test_transport_config()
        };

        let source = open_source(&location(), &transport, &config).unwrap();
        assert_eq!(source.origin, "https://bucket.s3.amazonaws.com/data/file.tsv.gz");
        assert_eq!(transport.calls().len(), 4);
    }

    #[test]
    fn test_client_errors_are_not_retried_per_endpoint() {
        let transport = ScriptedTransport::new(b"ok\n".to_vec()).with_script([Step::Status(403)]);
        let config = TransportConfig {
            endpoint_retries: 2,
            ..test_transport_config()
        };

        let source = open_source(&location(), &transport, &config).unwrap();
        assert_eq!(source.origin, "https://s3.amazonaws.com/bucket/data/file.tsv.gz");
    }

    #[test]
    fn test_local_file_is_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tsv.gz");
        std::fs::write(&path, b"not actually gzip\n").unwrap();

        let source = open_local(&path).unwrap();
        assert!(!source.gzip);
        assert_eq!(source.metadata.content_length, Some(18));
        assert_eq!(read_all(source), b"not actually gzip\n");
    }

    #[test]
    fn test_head_remote() {
        let transport = ScriptedTransport::new(b"x".to_vec())
            .refuse_prefix("https://bucket.s3.amazonaws.com/");
        let metadata = head_remote(&location(), &transport).unwrap();
        assert!(metadata.is_some());

        let transport = ScriptedTransport::new(b"x".to_vec()).missing();
        assert!(head_remote(&location(), &transport).unwrap().is_none());
    }
}
