use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// HTTP client options shared by manifest, key and segment requests.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Headers sent with every request
    pub headers: HeaderMap,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HttpConfig::get_default_headers(),
        }
    }
}

impl HttpConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers
    }

    /// Merge caller headers over the defaults. Caller values win.
    pub fn merge_headers(&mut self, headers: &HeaderMap) {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
    }
}

/// Per-request retry policy applied by the segment fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Bound on a single attempt
    pub request_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base for exponential backoff: `backoff_factor * 2^(retry - 1)`
    pub backoff_factor: Duration,
    /// Status codes treated as transient
    pub retry_statuses: Vec<StatusCode>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff_factor: Duration::from_millis(300),
            retry_statuses: vec![
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
        }
    }
}

impl FetcherConfig {
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        self.backoff_factor * 2_u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// Top-level engine configuration, passed into [`crate::VodDownloader`] at
/// construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub http: HttpConfig,
    pub fetcher: FetcherConfig,

    /// Directory holding transient per-segment files
    pub workspace_dir: PathBuf,

    /// Default number of segment workers
    pub concurrency: usize,

    /// Default number of whole-batch retry passes over failed segments
    pub max_retry_passes: u32,

    /// Free space required on the output filesystem before a run starts
    pub required_space_mb: u64,

    /// Assembled artifacts smaller than this are rejected
    pub min_output_bytes: u64,

    /// Per-segment size guess used by `analyze`
    pub estimated_segment_mb: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            fetcher: FetcherConfig::default(),
            workspace_dir: PathBuf::from("ts_files"),
            concurrency: 4,
            max_retry_passes: 3,
            required_space_mb: 1000,
            min_output_bytes: 1024,
            estimated_segment_mb: 2,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> crate::builder::EngineConfigBuilder {
        crate::builder::EngineConfigBuilder::new()
    }
}
