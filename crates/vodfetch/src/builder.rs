//! # Builder for EngineConfig
//!
//! Fluent construction of [`EngineConfig`] instances.
//!
//! ```
//! use std::time::Duration;
//! use vodfetch_engine::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .with_workspace_dir("/tmp/segments")
//!     .with_concurrency(8)
//!     .with_request_timeout(Duration::from_secs(20))
//!     .with_header("Referer", "https://example.com")
//!     .build();
//! assert_eq!(config.concurrency, 8);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::EngineConfig;

/// Builder for creating EngineConfig instances with a fluent API
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.workspace_dir = dir.into();
        self
    }

    /// Number of concurrent segment workers. Zero is clamped to one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_retry_passes(mut self, passes: u32) -> Self {
        self.config.max_retry_passes = passes;
        self
    }

    pub fn with_required_space_mb(mut self, mb: u64) -> Self {
        self.config.required_space_mb = mb;
        self
    }

    pub fn with_min_output_bytes(mut self, bytes: u64) -> Self {
        self.config.min_output_bytes = bytes;
        self
    }

    /// Set the per-attempt request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher.request_timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.connect_timeout = timeout;
        self
    }

    /// Set the number of per-request retries after the first attempt
    pub fn with_request_retries(mut self, retries: u32) -> Self {
        self.config.fetcher.max_retries = retries;
        self
    }

    pub fn with_backoff_factor(mut self, factor: Duration) -> Self {
        self.config.fetcher.backoff_factor = factor;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.http.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.http.headers.insert(name, value);
        }
        self
    }

    /// Merge a set of headers over the defaults
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.http.merge_headers(&headers);
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.http.follow_redirects = follow;
        self
    }

    /// Build the final EngineConfig
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
