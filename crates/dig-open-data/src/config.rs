//! # Configuration
//!
//! Settings for an [`Opener`](crate::Opener) and its HTTP transport, with the
//! `DIG_OPEN_DATA_*` environment overlay.

use std::time::Duration;

use crate::cache::CacheConfig;

pub const ENV_CACHE_FORCE: &str = "DIG_OPEN_DATA_CACHE_FORCE";

/// Default number of retries after the first attempt
pub const DEFAULT_RETRIES: u32 = 3;

const DEFAULT_USER_AGENT: &str = concat!("dig-open-data/", env!("CARGO_PKG_VERSION"));

/// HTTP transport settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall timeout for a single request, including reading the body
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Retries against the same endpoint for transient failures before
    /// falling back to the next endpoint
    pub endpoint_retries: u32,

    /// Base delay between endpoint retries, doubled on every attempt
    pub backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            endpoint_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Immutable settings for an [`Opener`](crate::Opener), built once per process
#[derive(Debug, Clone)]
pub struct OpenerConfig {
    /// Cache configuration; `None` disables caching
    pub cache: Option<CacheConfig>,

    /// Retries beyond the first attempt for downloads and line replay
    pub retries: u32,

    /// Stage remote objects in a throwaway temp file before reading them.
    /// Ignored when a cache is configured.
    pub stage_locally: bool,

    /// Skip cache lookups and always download, replacing cached entries
    pub cache_refresh: bool,

    /// Check cached entries against the remote validators before using them
    pub revalidate: bool,

    /// HTTP transport settings
    pub transport: TransportConfig,
}

impl Default for OpenerConfig {
    fn default() -> Self {
        Self {
            cache: None,
            retries: DEFAULT_RETRIES,
            stage_locally: false,
            cache_refresh: false,
            revalidate: false,
            transport: TransportConfig::default(),
        }
    }
}

impl OpenerConfig {
    pub fn builder() -> crate::builder::OpenerConfigBuilder {
        crate::builder::OpenerConfigBuilder::new()
    }

    /// Defaults overlaid with the `DIG_OPEN_DATA_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let cache_refresh = lookup(ENV_CACHE_FORCE).is_some_and(|value| {
            matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
        });

        Self {
            cache: CacheConfig::from_lookup(&lookup),
            cache_refresh,
            ..Self::default()
        }
    }
}
