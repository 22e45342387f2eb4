//! Shared helpers for unit tests

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use parking_lot::Mutex;
use reqwest::StatusCode;
use url::Url;

use crate::cache::ObjectMetadata;
use crate::config::{OpenerConfig, TransportConfig};
use crate::error::{DataError, Result};
use crate::transport::{RemoteObject, Transport};

/// Macro to initialize tracing for tests
///
/// Usage:
/// - `init_test_tracing!()` - uses DEBUG level (default)
/// - `init_test_tracing!(INFO)` - uses specified level
#[macro_export]
macro_rules! init_test_tracing {
    () => {
        init_test_tracing!(DEBUG);
    };
    ($level:ident) => {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::$level)
            .with_test_writer()
            .try_init();
    };
}

pub(crate) fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Transport settings without per-endpoint retries or sleeps
pub(crate) fn test_transport_config() -> TransportConfig {
    TransportConfig {
        endpoint_retries: 0,
        backoff: Duration::ZERO,
        ..TransportConfig::default()
    }
}

pub(crate) fn test_opener_config() -> OpenerConfig {
    OpenerConfig {
        transport: test_transport_config(),
        ..OpenerConfig::default()
    }
}

/// What the next successful-looking GET does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Serve the whole payload
    Serve,
    /// Serve `n` bytes, then fail with a reset connection
    FailAfter(usize),
    /// Serve `n` bytes, then end cleanly while advertising the full length
    Truncate(usize),
    /// Refuse the connection
    Refuse,
    /// Answer with an HTTP status
    Status(u16),
}

/// In-memory object storage: every GET pops the next scripted step (serving the
/// payload once the script is empty) unless the URL is refused outright.
pub(crate) struct ScriptedTransport {
    payload: Mutex<Vec<u8>>,
    etag: Mutex<Option<String>>,
    script: Mutex<VecDeque<Step>>,
    refused: Vec<String>,
    exists: bool,
    calls: Mutex<Vec<String>>,
    heads: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub(crate) fn new(payload: Vec<u8>) -> Self {
        Self {
            payload: Mutex::new(payload),
            etag: Mutex::new(None),
            script: Mutex::new(VecDeque::new()),
            refused: Vec::new(),
            exists: true,
            calls: Mutex::new(Vec::new()),
            heads: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().extend(steps);
        self
    }

    pub(crate) fn refuse_prefix(mut self, prefix: &str) -> Self {
        self.refused.push(prefix.to_string());
        self
    }

    pub(crate) fn missing(mut self) -> Self {
        self.exists = false;
        self
    }

    pub(crate) fn set_payload(&self, payload: Vec<u8>, etag: Option<&str>) {
        *self.payload.lock() = payload;
        *self.etag.lock() = etag.map(str::to_string);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn heads(&self) -> Vec<String> {
        self.heads.lock().clone()
    }

    fn metadata(&self) -> ObjectMetadata {
        ObjectMetadata {
            etag: self.etag.lock().clone(),
            last_modified: None,
            content_length: Some(self.payload.lock().len() as u64),
        }
    }

    fn refuses(&self, url: &Url) -> bool {
        self.refused.iter().any(|prefix| url.as_str().starts_with(prefix))
    }
}

fn refused(url: &Url) -> DataError {
    DataError::IoError(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        format!("connection refused by script: {url}"),
    ))
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &Url) -> Result<RemoteObject> {
        self.calls.lock().push(url.to_string());
        if self.refuses(url) {
            return Err(refused(url));
        }

        let step = self.script.lock().pop_front().unwrap_or(Step::Serve);
        let payload = self.payload.lock().clone();
        let metadata = self.metadata();

        let reader: Box<dyn Read + Send> = match step {
            Step::Serve => Box::new(Cursor::new(payload)),
            Step::FailAfter(n) => Box::new(FlakyReader::new(payload, n)),
            Step::Truncate(n) => Box::new(Cursor::new(payload[..n.min(payload.len())].to_vec())),
            Step::Refuse => return Err(refused(url)),
            Step::Status(code) => {
                return Err(DataError::Status {
                    url: url.to_string(),
                    status: StatusCode::from_u16(code).unwrap(),
                });
            }
        };

        Ok(RemoteObject { reader, metadata })
    }

    fn head(&self, url: &Url) -> Result<Option<ObjectMetadata>> {
        self.heads.lock().push(url.to_string());
        if self.refuses(url) {
            return Err(refused(url));
        }
        Ok(self.exists.then(|| self.metadata()))
    }
}

/// Reader that yields `fail_at` bytes and then errors
pub(crate) struct FlakyReader {
    data: Vec<u8>,
    pos: usize,
    fail_at: usize,
}

impl FlakyReader {
    pub(crate) fn new(data: Vec<u8>, fail_at: usize) -> Self {
        Self {
            data,
            pos: 0,
            fail_at,
        }
    }
}

impl Read for FlakyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.fail_at {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "scripted stream failure",
            ));
        }
        let end = self.fail_at.min(self.data.len()).min(self.pos + buf.len());
        let n = end - self.pos;
        buf[..n].copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(n)
    }
}
