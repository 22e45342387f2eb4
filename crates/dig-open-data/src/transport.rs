//! # Transport
//!
//! The network seam of the crate. [`HttpTransport`] talks to object storage
//! over HTTPS with a blocking reqwest client; tests substitute a scripted
//! implementation of [`Transport`].

use std::io::Read;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{
    ACCEPT_ENCODING, CONTENT_LENGTH, ETAG, HeaderMap, HeaderName, HeaderValue, LAST_MODIFIED,
};
use tracing::debug;
use url::Url;

use crate::cache::ObjectMetadata;
use crate::config::TransportConfig;
use crate::error::{DataError, Result};

/// An open response body plus what the server said about it
pub struct RemoteObject {
    pub reader: Box<dyn Read + Send>,
    pub metadata: ObjectMetadata,
}

impl RemoteObject {
    pub fn content_length(&self) -> Option<u64> {
        self.metadata.content_length
    }
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Fetches objects from a single endpoint URL
pub trait Transport: Send + Sync {
    /// Start a GET for `url`. Non-success responses are errors.
    fn get(&self, url: &Url) -> Result<RemoteObject>;

    /// HEAD `url`; `Ok(None)` means the object does not exist
    fn head(&self, url: &Url) -> Result<Option<ObjectMetadata>>;
}

/// Create a blocking reqwest Client with the provided configuration
pub fn create_client(config: &TransportConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    // Bytes must arrive exactly as stored so gzip detection sees the real payload
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    let mut builder = Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .no_gzip()
        .no_deflate();

    if !config.timeout.is_zero() {
        builder = builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        builder = builder.connect_timeout(config.connect_timeout);
    }

    builder.build().map_err(DataError::from)
}

/// [`Transport`] over HTTPS
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &Url) -> Result<RemoteObject> {
        let response = self.client.get(url.clone()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(DataError::Status {
                url: url.to_string(),
                status,
            });
        }

        let metadata = metadata_from_headers(response.headers());
        debug!(url = %url, content_length = ?metadata.content_length, "Opened remote object");

        Ok(RemoteObject {
            reader: Box::new(response),
            metadata,
        })
    }

    fn head(&self, url: &Url) -> Result<Option<ObjectMetadata>> {
        let response = self.client.head(url.clone()).send()?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DataError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(Some(metadata_from_headers(response.headers())))
    }
}

/// Extract the validators object storage sends with a response
pub fn metadata_from_headers(headers: &HeaderMap) -> ObjectMetadata {
    let text = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    ObjectMetadata {
        etag: text(ETAG).map(|etag| etag.trim_matches('"').to_string()),
        last_modified: text(LAST_MODIFIED),
        content_length: text(CONTENT_LENGTH).and_then(|len| len.parse().ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("\"d41d8cd98f00\""));
        headers.insert(
            LAST_MODIFIED,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1024"));

        let metadata = metadata_from_headers(&headers);
        assert_eq!(metadata.etag.as_deref(), Some("d41d8cd98f00"));
        assert_eq!(
            metadata.last_modified.as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
        assert_eq!(metadata.content_length, Some(1024));
    }

    #[test]
    fn test_metadata_ignores_bad_length() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("many"));
        assert_eq!(metadata_from_headers(&headers), ObjectMetadata::default());
    }

    #[test]
    fn test_client_builds_with_defaults() {
        assert!(HttpTransport::new(&TransportConfig::default()).is_ok());
    }
}
