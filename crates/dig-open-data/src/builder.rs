//! # Builder for OpenerConfig
//!
//! Fluent construction of [`OpenerConfig`]. Starting from
//! [`OpenerConfigBuilder::from_env`] and then calling [`with_cache`] gives an
//! explicit cache configuration precedence over the environment.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dig_open_data::{CacheConfig, OpenerConfig};
//!
//! let config = OpenerConfig::builder()
//!     .with_cache(CacheConfig::new("/var/cache/dig").with_max_bytes(1 << 30))
//!     .with_retries(5)
//!     .with_timeout(Duration::from_secs(120))
//!     .build();
//!
//! assert_eq!(config.retries, 5);
//! ```
//!
//! [`with_cache`]: OpenerConfigBuilder::with_cache

use std::time::Duration;

use crate::cache::CacheConfig;
use crate::config::{OpenerConfig, TransportConfig};

/// Builder for creating OpenerConfig instances with a fluent API
#[derive(Debug, Clone, Default)]
pub struct OpenerConfigBuilder {
    config: OpenerConfig,
}

impl OpenerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the environment-derived configuration
    pub fn from_env() -> Self {
        Self {
            config: OpenerConfig::from_env(),
        }
    }

    /// Use an explicit cache configuration, overriding any environment value
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = Some(cache);
        self
    }

    /// Disable caching
    pub fn without_cache(mut self) -> Self {
        self.config.cache = None;
        self
    }

    /// Set the number of retries after the first attempt
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    /// Stage remote objects in a temp file when no cache is configured
    pub fn with_stage_locally(mut self, stage_locally: bool) -> Self {
        self.config.stage_locally = stage_locally;
        self
    }

    /// Always re-download, replacing cached entries
    pub fn with_cache_refresh(mut self, cache_refresh: bool) -> Self {
        self.config.cache_refresh = cache_refresh;
        self
    }

    /// Validate cache hits against the remote object before use
    pub fn with_revalidate(mut self, revalidate: bool) -> Self {
        self.config.revalidate = revalidate;
        self
    }

    /// Replace the whole transport configuration
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.config.transport = transport;
        self
    }

    /// Set the overall request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.connect_timeout = timeout;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.transport.user_agent = user_agent.into();
        self
    }

    /// Set per-endpoint retries for transient failures and their base backoff
    pub fn with_endpoint_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.config.transport.endpoint_retries = retries;
        self.config.transport.backoff = backoff;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> OpenerConfig {
        self.config
    }
}
