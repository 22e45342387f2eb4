//! # Locations
//!
//! Classifies a dataset URI once, up front, into a local file or an object in
//! public object storage, and expands storage objects into the ordered list of
//! HTTPS endpoints that can serve them.

use std::path::PathBuf;

use url::Url;

use crate::error::{DataError, Result};

const REGISTRY_SCHEME: &str = "registry";
const FILE_SCHEME: &str = "file";
const S3_SCHEME: &str = "s3";

/// Where the bytes for a URI come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A file on local disk
    LocalFile(PathBuf),
    /// An object in S3-compatible public storage
    ObjectStorage { bucket: String, key: String },
}

impl Location {
    /// Classify `uri`, after applying [`resolve_uri`]
    pub fn parse(uri: &str) -> Result<Self> {
        let resolved = resolve_uri(uri);

        let Some((scheme, rest)) = resolved.split_once("://") else {
            return Ok(Location::LocalFile(expand_home(&resolved)));
        };

        match scheme {
            FILE_SCHEME => Ok(Location::LocalFile(file_url_to_path(&resolved)?)),
            S3_SCHEME => {
                let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(DataError::InvalidUri(uri.to_string()));
                }
                Ok(Location::ObjectStorage {
                    bucket: bucket.to_string(),
                    key: key.trim_start_matches('/').to_string(),
                })
            }
            other => Err(DataError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Whether reading this location goes over the network
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::ObjectStorage { .. })
    }

    /// Candidate HTTPS URLs for a storage object, in the order they are tried.
    ///
    /// Virtual-hosted and path-style addressing, each against the global and
    /// the `us-east-1` regional host. Local files have no endpoints.
    pub fn endpoints(&self) -> Result<Vec<Url>> {
        let Location::ObjectStorage { bucket, key } = self else {
            return Ok(Vec::new());
        };

        Ok(vec![
            endpoint(&format!("{bucket}.s3.amazonaws.com"), None, key)?,
            endpoint("s3.amazonaws.com", Some(bucket), key)?,
            endpoint(&format!("{bucket}.s3.us-east-1.amazonaws.com"), None, key)?,
            endpoint("s3.us-east-1.amazonaws.com", Some(bucket), key)?,
        ])
    }
}

/// Normalize a URI to the form used as the cache key.
///
/// `registry://bucket/path` becomes `s3://bucket/path` and `file://` URIs
/// become plain paths; everything else is returned unchanged.
pub fn resolve_uri(uri: &str) -> String {
    match uri.split_once("://") {
        Some((REGISTRY_SCHEME, rest)) => format!("{S3_SCHEME}://{rest}"),
        Some((FILE_SCHEME, _)) => file_url_to_path(uri)
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|_| uri.to_string()),
        _ => uri.to_string(),
    }
}

fn file_url_to_path(uri: &str) -> Result<PathBuf> {
    Url::parse(uri)?
        .to_file_path()
        .map_err(|_| DataError::InvalidUri(uri.to_string()))
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(path),
        },
        _ => PathBuf::from(path),
    }
}

fn endpoint(host: &str, bucket: Option<&str>, key: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("https://{host}/"))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| DataError::InvalidUri(host.to_string()))?;
        segments.clear();
        if let Some(bucket) = bucket {
            segments.push(bucket);
        }
        if key.is_empty() {
            segments.push("");
        } else {
            segments.extend(key.split('/'));
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolution() {
        assert_eq!(
            resolve_uri("registry://dig-open-bottom-line-analysis/path/file.tsv.gz"),
            "s3://dig-open-bottom-line-analysis/path/file.tsv.gz"
        );
    }

    #[test]
    fn test_file_uri_resolution() {
        assert_eq!(resolve_uri("file:///data/my%20file.tsv"), "/data/my file.tsv");
        assert_eq!(
            Location::parse("file:///data/x.tsv").unwrap(),
            Location::LocalFile(PathBuf::from("/data/x.tsv"))
        );
    }

    #[test]
    fn test_bare_path_is_local() {
        assert_eq!(
            Location::parse("relative/x.tsv.gz").unwrap(),
            Location::LocalFile(PathBuf::from("relative/x.tsv.gz"))
        );
        assert!(!Location::parse("/abs/x.tsv").unwrap().is_remote());
    }

    #[test]
    fn test_home_expansion() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                Location::parse("~/data.tsv").unwrap(),
                Location::LocalFile(home.join("data.tsv"))
            );
        }
        assert_eq!(
            Location::parse("~other/data.tsv").unwrap(),
            Location::LocalFile(PathBuf::from("~other/data.tsv"))
        );
    }

    #[test]
    fn test_s3_location() {
        let location = Location::parse("s3://bucket/path/file.tsv.gz").unwrap();
        assert!(location.is_remote());
        assert_eq!(
            location,
            Location::ObjectStorage {
                bucket: "bucket".to_string(),
                key: "path/file.tsv.gz".to_string(),
            }
        );
    }

    #[test]
    fn test_s3_endpoint_order() {
        let location =
            Location::parse("s3://dig-open-bottom-line-analysis/path/file.tsv.gz").unwrap();
        let urls: Vec<String> = location
            .endpoints()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();

        assert_eq!(
            urls,
            vec![
                "https://dig-open-bottom-line-analysis.s3.amazonaws.com/path/file.tsv.gz",
                "https://s3.amazonaws.com/dig-open-bottom-line-analysis/path/file.tsv.gz",
                "https://dig-open-bottom-line-analysis.s3.us-east-1.amazonaws.com/path/file.tsv.gz",
                "https://s3.us-east-1.amazonaws.com/dig-open-bottom-line-analysis/path/file.tsv.gz",
            ]
        );
    }

    #[test]
    fn test_endpoint_keys_are_percent_encoded() {
        let location = Location::parse("s3://bucket/dir/my file.tsv").unwrap();
        let first = location.endpoints().unwrap().remove(0);
        assert_eq!(first.as_str(), "https://bucket.s3.amazonaws.com/dir/my%20file.tsv");
    }

    #[test]
    fn test_empty_key_targets_bucket_root() {
        let location = Location::parse("s3://bucket").unwrap();
        let urls: Vec<String> = location
            .endpoints()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(urls[0], "https://bucket.s3.amazonaws.com/");
        assert_eq!(urls[1], "https://s3.amazonaws.com/bucket/");
    }

    #[test]
    fn test_local_has_no_endpoints() {
        let location = Location::parse("/tmp/x").unwrap();
        assert!(location.endpoints().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_scheme_is_rejected() {
        assert!(matches!(
            Location::parse("gs://bucket/key"),
            Err(DataError::UnsupportedScheme(scheme)) if scheme == "gs"
        ));
        assert!(matches!(
            Location::parse("s3:///key"),
            Err(DataError::InvalidUri(_))
        ));
    }
}
