// Segment Fetcher: raw HTTP retrieval with per-request retry and backoff.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::DownloadError;
use crate::config::FetcherConfig;

/// Retrieves the full body behind a URL.
///
/// Implemented over HTTP by [`SegmentFetcher`]; tests substitute in-memory
/// implementations.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, DownloadError>;
}

pub struct SegmentFetcher {
    http_client: Client,
    config: Arc<FetcherConfig>,
}

impl SegmentFetcher {
    pub fn new(http_client: Client, config: Arc<FetcherConfig>) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Fetches a resource with retry logic.
    /// Retries on connection errors, timeouts and the configured 5xx statuses.
    async fn fetch_with_retries(&self, url: &str) -> Result<Bytes, DownloadError> {
        let mut retries = 0;
        loop {
            let outcome = match self
                .http_client
                .get(url)
                .timeout(self.config.request_timeout)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.bytes().await {
                            Ok(body) => return Ok(body),
                            // body read failures are read timeouts or resets
                            Err(e) => e.to_string(),
                        }
                    } else if self.config.is_retryable_status(status) {
                        format!("server returned {status}")
                    } else {
                        return Err(DownloadError::network(url, format!("HTTP {status}")));
                    }
                }
                Err(e) => {
                    if !e.is_connect() && !e.is_timeout() && !e.is_request() {
                        return Err(DownloadError::network(url, e));
                    }
                    e.to_string()
                }
            };

            if retries >= self.config.max_retries {
                return Err(DownloadError::network(
                    url,
                    format!(
                        "max retries ({}) exceeded, last error: {outcome}",
                        self.config.max_retries
                    ),
                ));
            }

            retries += 1;
            let delay = self.config.backoff_delay(retries);
            warn!(url, retry = retries, delay_ms = delay.as_millis() as u64, error = %outcome, "Transient fetch failure, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Fetcher for SegmentFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, DownloadError> {
        let body = self.fetch_with_retries(url).await?;
        debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_retries: u32) -> SegmentFetcher {
        let config = FetcherConfig {
            request_timeout: Duration::from_secs(2),
            max_retries,
            backoff_factor: Duration::from_millis(1),
            ..FetcherConfig::default()
        };
        SegmentFetcher::new(Client::new(), Arc::new(config))
    }

    #[tokio::test]
    async fn returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/seg/00001.ts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
            .mount(&server)
            .await;

        let body = fetcher(0)
            .fetch(&format!("{}/seg/00001.ts", server.uri()))
            .await
            .unwrap();
        assert_eq!(body.len(), 64);
    }

    #[tokio::test]
    async fn retries_transient_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.ts"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky.ts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let body = fetcher(3)
            .fetch(&format!("{}/flaky.ts", server.uri()))
            .await
            .unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down.ts"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher(2)
            .fetch(&format!("{}/down.ts", server.uri()))
            .await
            .unwrap_err();
        match err {
            DownloadError::Network { url, detail } => {
                assert!(url.ends_with("/down.ts"));
                assert!(detail.contains("max retries (2)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.ts"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher(3)
            .fetch(&format!("{}/missing.ts", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
