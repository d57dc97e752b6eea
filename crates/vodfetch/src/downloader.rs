use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{EngineConfig, HttpConfig};
use crate::hls::{
    Assembler, DownloadCoordinator, DownloadEvent, Fetcher, KeyResolver, Manifest, OnEvent,
    SegmentFetcher, SegmentScheduler, SegmentWorker,
};
use crate::report::{AnalyzeReport, DownloadOutcome, DownloadReport, FailureSummary};
use crate::workspace::{CleanReport, WorkspaceManager, WorkspaceStatus};
use crate::DownloadError;

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &HttpConfig) -> Result<Client, DownloadError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(8)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder
        .build()
        .map_err(|e| DownloadError::Config(format!("failed to build HTTP client: {e}")))
}

/// Per-call knobs for [`VodDownloader::download`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    pub concurrency: usize,
    pub max_retry_passes: u32,
}

impl From<&EngineConfig> for DownloadOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            max_retry_passes: config.max_retry_passes,
        }
    }
}

/// Entry point exposing `analyze`, `download`, `status` and `clean`.
///
/// Owns the workspace for its lifetime; `download` and `clean` are
/// serialised so two runs never share the workspace at once.
pub struct VodDownloader {
    config: EngineConfig,
    fetcher: Arc<dyn Fetcher>,
    workspace: WorkspaceManager,
    run_lock: Mutex<()>,
    on_event: Option<OnEvent>,
}

impl VodDownloader {
    pub async fn new(config: EngineConfig) -> Result<Self, DownloadError> {
        let client = create_client(&config.http)?;
        let fetcher = SegmentFetcher::new(client, Arc::new(config.fetcher.clone()));
        Self::with_fetcher(config, Arc::new(fetcher)).await
    }

    /// Uses `fetcher` for manifest, key and segment requests.
    pub async fn with_fetcher(
        config: EngineConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, DownloadError> {
        let workspace = WorkspaceManager::new(&config.workspace_dir);
        workspace.ensure_exists().await?;
        Ok(Self {
            config,
            fetcher,
            workspace,
            run_lock: Mutex::new(()),
            on_event: None,
        })
    }

    pub fn with_event_handler(mut self, on_event: OnEvent) -> Self {
        self.on_event = Some(on_event);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn workspace(&self) -> &WorkspaceManager {
        &self.workspace
    }

    pub fn default_options(&self) -> DownloadOptions {
        DownloadOptions::from(&self.config)
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }

    async fn load_manifest(&self, manifest_url: &str) -> Result<Manifest, DownloadError> {
        Url::parse(manifest_url)
            .map_err(|e| DownloadError::InvalidUrl(format!("{manifest_url}: {e}")))?;
        let body = self.fetcher.fetch(manifest_url).await?;
        let manifest = Manifest::parse(String::from_utf8_lossy(&body), manifest_url)?;
        debug!(
            url = manifest_url,
            segments = manifest.segments.len(),
            encrypted = manifest.encryption.is_some(),
            "Manifest parsed"
        );
        Ok(manifest)
    }

    /// Parses the manifest only. No key or segment is fetched.
    pub async fn analyze(&self, manifest_url: &str) -> Result<AnalyzeReport, DownloadError> {
        let manifest = self.load_manifest(manifest_url).await?;
        Ok(AnalyzeReport {
            encryption_method: manifest.encryption.as_ref().map(|e| e.method.clone()),
            segment_count: manifest.segments.len(),
            estimated_size_mb: manifest.segments.len() as u64 * self.config.estimated_segment_mb,
            first_segment_url: manifest.segments.first().cloned().unwrap_or_default(),
            key_url: manifest.encryption.map(|e| e.key_url),
        })
    }

    /// Downloads, decrypts and assembles the stream behind `manifest_url`.
    ///
    /// Pre-flight problems (disk space, manifest, cipher) come back as
    /// [`DownloadOutcome::Rejected`]; unresolved segments as
    /// [`DownloadOutcome::Incomplete`], with no artifact written. Network
    /// failures on the manifest or key, and assembly failures, are `Err`.
    pub async fn download(
        &self,
        manifest_url: &str,
        output_path: &Path,
        options: DownloadOptions,
    ) -> Result<DownloadOutcome, DownloadError> {
        let _guard = self.run_lock.lock().await;
        match self.run_download(manifest_url, output_path, options).await {
            Err(e) if e.is_rejection() => {
                warn!(url = manifest_url, reason = %e, "Download rejected");
                Ok(DownloadOutcome::Rejected {
                    reason: e.to_string(),
                })
            }
            other => other,
        }
    }

    async fn run_download(
        &self,
        manifest_url: &str,
        output_path: &Path,
        options: DownloadOptions,
    ) -> Result<DownloadOutcome, DownloadError> {
        let started = Instant::now();
        let output_path = std::path::absolute(output_path)?;
        if self.workspace.contains(&output_path)? {
            return Err(DownloadError::OutputInWorkspace(output_path));
        }
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let space = WorkspaceManager::check_disk_space(&output_path, self.config.required_space_mb);
        debug!(message = %space.message, "Disk space checked");
        space.into_result()?;

        let manifest = self.load_manifest(manifest_url).await?;
        self.emit(DownloadEvent::ManifestParsed {
            segment_count: manifest.segments.len(),
            encrypted: manifest.encryption.is_some(),
        });

        let cipher = match &manifest.encryption {
            Some(encryption) => Some(Arc::new(
                KeyResolver::new(self.fetcher.as_ref())
                    .resolve(encryption, &manifest.text)
                    .await?,
            )),
            None => None,
        };

        self.workspace.ensure_exists().await?;
        let stale = self.workspace.clear_all().await?;
        if stale.files_cleared > 0 {
            debug!(files = stale.files_cleared, "Removed stale segment files");
        }

        info!(
            segments = manifest.segments.len(),
            concurrency = options.concurrency,
            "Starting segment download"
        );
        let worker = Arc::new(SegmentWorker::new(
            Arc::clone(&self.fetcher),
            cipher,
            self.workspace.clone(),
        ));
        let coordinator = DownloadCoordinator::new(
            SegmentScheduler::new(worker, options.concurrency),
            self.on_event.clone(),
        );
        let outcome = coordinator
            .run(&manifest.segments, options.max_retry_passes)
            .await;

        if !outcome.is_complete() {
            warn!(
                failed = outcome.failures.len(),
                retry_passes = outcome.retry_passes,
                "Segments still failing, skipping assembly"
            );
            return Ok(DownloadOutcome::Incomplete(FailureSummary::new(
                &outcome.failures,
                outcome.retry_passes,
            )));
        }

        self.emit(DownloadEvent::AssemblyStarted {
            segment_count: outcome.segments.len(),
        });
        let size_bytes = Assembler::new(self.config.min_output_bytes)
            .assemble(&output_path, &outcome.segments)
            .await?;
        let removed = self.workspace.remove_segments(&outcome.segments).await;
        debug!(files = removed.files_cleared, "Removed assembled segments");
        self.emit(DownloadEvent::Finished);

        let report = DownloadReport {
            output_path,
            size_bytes,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        };
        info!(
            output = %report.output_path.display(),
            size_mb = report.size_mb(),
            "Download complete"
        );
        Ok(DownloadOutcome::Completed(report))
    }

    pub async fn status(&self) -> Result<WorkspaceStatus, DownloadError> {
        self.workspace.status().await
    }

    pub async fn clean(&self) -> Result<CleanReport, DownloadError> {
        let _guard = self.run_lock.lock().await;
        self.workspace.clear_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::Aes128;
    use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: [u8; 16] = *b"sixteen byte key";
    const IV_HEX: &str = "0x0f0e0d0c0b0a09080706050403020100";

    fn segment_body(index: usize) -> Vec<u8> {
        vec![index as u8 + 1; 640]
    }

    fn encrypt(plain: &[u8]) -> Vec<u8> {
        let iv: [u8; 16] = core::array::from_fn(|i| 15 - i as u8);
        let mut buf = plain.to_vec();
        let len = buf.len();
        cbc::Encryptor::<Aes128>::new(&KEY.into(), &iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .unwrap();
        buf
    }

    fn config(tmp: &TempDir) -> EngineConfig {
        EngineConfig::builder()
            .with_workspace_dir(tmp.path().join("ts_files"))
            .with_required_space_mb(0)
            .with_request_retries(0)
            .with_backoff_factor(Duration::from_millis(1))
            .build()
    }

    async fn mount(server: &MockServer, route: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    async fn plain_stream(server: &MockServer, count: usize) {
        let mut manifest = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:4\n");
        for index in 0..count {
            manifest.push_str(&format!("#EXTINF:4,\nseg{index}.ts\n"));
            mount(server, &format!("/vod/seg{index}.ts"), segment_body(index)).await;
        }
        manifest.push_str("#EXT-X-ENDLIST\n");
        mount(server, "/vod/index.m3u8", manifest.into_bytes()).await;
    }

    #[tokio::test]
    async fn analyze_reports_without_fetching_segments() {
        let server = MockServer::start().await;
        let manifest = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"k.bin\"\n#EXTINF:4,\na.ts\n#EXTINF:4,\nb.ts\n";
        mount(&server, "/vod/index.m3u8", manifest.as_bytes().to_vec()).await;
        Mock::given(method("GET"))
            .and(path("/vod/k.bin"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let downloader = VodDownloader::new(config(&tmp)).await.unwrap();
        let report = downloader
            .analyze(&format!("{}/vod/index.m3u8", server.uri()))
            .await
            .unwrap();

        assert_eq!(report.encryption_method.as_deref(), Some("AES-128"));
        assert_eq!(report.segment_count, 2);
        assert_eq!(report.estimated_size_mb, 4);
        assert_eq!(report.first_segment_url, format!("{}/vod/a.ts", server.uri()));
        assert_eq!(report.key_url, Some(format!("{}/vod/k.bin", server.uri())));
    }

    #[tokio::test]
    async fn plain_download_assembles_in_order_and_cleans_up() {
        let server = MockServer::start().await;
        plain_stream(&server, 6).await;

        let tmp = TempDir::new().unwrap();
        let downloader = VodDownloader::new(config(&tmp)).await.unwrap();
        let output = tmp.path().join("out").join("video.mp4");
        let outcome = downloader
            .download(
                &format!("{}/vod/index.m3u8", server.uri()),
                &output,
                DownloadOptions {
                    concurrency: 3,
                    max_retry_passes: 1,
                },
            )
            .await
            .unwrap();

        let DownloadOutcome::Completed(report) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(report.size_bytes, 6 * 640);
        let expected: Vec<u8> = (0..6).flat_map(segment_body).collect();
        assert_eq!(tokio::fs::read(&output).await.unwrap(), expected);
        assert_eq!(downloader.status().await.unwrap(), WorkspaceStatus::Empty);
    }

    #[tokio::test]
    async fn output_inside_workspace_is_rejected_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let downloader = VodDownloader::new(config(&tmp)).await.unwrap();
        for output in [
            tmp.path().join("ts_files").join("video.mp4"),
            tmp.path().join("ts_files").join("00000.ts"),
        ] {
            let outcome = downloader
                .download(
                    &format!("{}/vod/index.m3u8", server.uri()),
                    &output,
                    downloader.default_options(),
                )
                .await
                .unwrap();
            match outcome {
                DownloadOutcome::Rejected { reason } => {
                    assert!(reason.contains("inside the segment workspace"), "{reason}")
                }
                other => panic!("expected rejection, got {other:?}"),
            }
            assert!(!output.exists());
        }
    }

    #[tokio::test]
    async fn completion_removes_only_assembled_segments() {
        let server = MockServer::start().await;
        plain_stream(&server, 3).await;

        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("ts_files").join("notes.txt");
        let marker_in_handler = marker.clone();
        let downloader = VodDownloader::new(config(&tmp))
            .await
            .unwrap()
            .with_event_handler(Arc::new(move |event| {
                if matches!(event, DownloadEvent::AssemblyStarted { .. }) {
                    std::fs::write(&marker_in_handler, b"keep").unwrap();
                }
            }));
        let output = tmp.path().join("video.mp4");
        let outcome = downloader
            .download(
                &format!("{}/vod/index.m3u8", server.uri()),
                &output,
                downloader.default_options(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, DownloadOutcome::Completed(_)), "{outcome:?}");
        assert!(output.exists());
        assert_eq!(std::fs::read(&marker).unwrap(), b"keep");
        assert_eq!(
            downloader.status().await.unwrap(),
            WorkspaceStatus::Active {
                segment_file_count: 0,
                total_bytes: 4
            }
        );
    }

    #[tokio::test]
    async fn encrypted_download_decrypts_with_inline_iv() {
        let server = MockServer::start().await;
        let manifest = format!(
            "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"keys/k.bin\",IV={IV_HEX}\n#EXTINF:4,\nseg0.ts\n#EXTINF:4,\nseg1.ts\n"
        );
        mount(&server, "/vod/index.m3u8", manifest.into_bytes()).await;
        mount(&server, "/vod/keys/k.bin", KEY.to_vec()).await;
        for index in 0..2 {
            mount(&server, &format!("/vod/seg{index}.ts"), encrypt(&segment_body(index))).await;
        }

        let tmp = TempDir::new().unwrap();
        let downloader = VodDownloader::new(config(&tmp)).await.unwrap();
        let output = tmp.path().join("enc.mp4");
        let outcome = downloader
            .download(
                &format!("{}/vod/index.m3u8", server.uri()),
                &output,
                downloader.default_options(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, DownloadOutcome::Completed(_)), "{outcome:?}");
        let expected: Vec<u8> = (0..2).flat_map(segment_body).collect();
        assert_eq!(tokio::fs::read(&output).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn unsupported_cipher_is_rejected_before_segment_fetch() {
        let server = MockServer::start().await;
        let manifest = "#EXTM3U\n#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"k.bin\"\n#EXTINF:4,\na.ts\n";
        mount(&server, "/vod/index.m3u8", manifest.as_bytes().to_vec()).await;
        Mock::given(method("GET"))
            .and(path("/vod/a.ts"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let downloader = VodDownloader::new(config(&tmp)).await.unwrap();
        let outcome = downloader
            .download(
                &format!("{}/vod/index.m3u8", server.uri()),
                &tmp.path().join("x.mp4"),
                downloader.default_options(),
            )
            .await
            .unwrap();

        match outcome {
            DownloadOutcome::Rejected { reason } => assert!(reason.contains("SAMPLE-AES")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn insufficient_space_is_rejected_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let mut cfg = config(&tmp);
        cfg.required_space_mb = u64::MAX / 2;
        let downloader = VodDownloader::new(cfg).await.unwrap();
        let outcome = downloader
            .download(
                &format!("{}/vod/index.m3u8", server.uri()),
                &tmp.path().join("x.mp4"),
                downloader.default_options(),
            )
            .await
            .unwrap();

        match outcome {
            DownloadOutcome::Rejected { reason } => {
                assert!(reason.contains("MB available"), "{reason}")
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unresolved_segments_skip_assembly() {
        let server = MockServer::start().await;
        let manifest = "#EXTM3U\n#EXTINF:4,\nseg0.ts\n#EXTINF:4,\nseg1.ts\n#EXTINF:4,\nseg2.ts\n";
        mount(&server, "/vod/index.m3u8", manifest.as_bytes().to_vec()).await;
        mount(&server, "/vod/seg0.ts", segment_body(0)).await;
        mount(&server, "/vod/seg2.ts", segment_body(2)).await;
        Mock::given(method("GET"))
            .and(path("/vod/seg1.ts"))
            .respond_with(ResponseTemplate::new(404))
            .expect(3)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let downloader = VodDownloader::new(config(&tmp)).await.unwrap();
        let output = tmp.path().join("partial.mp4");
        let outcome = downloader
            .download(
                &format!("{}/vod/index.m3u8", server.uri()),
                &output,
                DownloadOptions {
                    concurrency: 2,
                    max_retry_passes: 2,
                },
            )
            .await
            .unwrap();

        match outcome {
            DownloadOutcome::Incomplete(summary) => {
                assert_eq!(summary.unresolved_count, 1);
                assert_eq!(summary.retries_attempted, 2);
                assert!(summary.sample_errors[0].contains("seg1.ts"));
            }
            other => panic!("expected failure summary, got {other:?}"),
        }
        assert!(!output.exists());
        assert_eq!(
            downloader.status().await.unwrap(),
            WorkspaceStatus::Active {
                segment_file_count: 2,
                total_bytes: 2 * 640
            }
        );

        let cleaned = downloader.clean().await.unwrap();
        assert_eq!(cleaned.files_cleared, 2);
        assert_eq!(downloader.status().await.unwrap(), WorkspaceStatus::Empty);
    }

    #[tokio::test]
    async fn manifest_fetch_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vod/index.m3u8"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let downloader = VodDownloader::new(config(&tmp)).await.unwrap();
        let err = downloader
            .download(
                &format!("{}/vod/index.m3u8", server.uri()),
                &tmp.path().join("x.mp4"),
                downloader.default_options(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Network { .. }));
    }

    #[tokio::test]
    async fn invalid_manifest_url_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let downloader = VodDownloader::new(config(&tmp)).await.unwrap();
        let err = downloader.analyze("not a url").await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl(_)));
    }
}
