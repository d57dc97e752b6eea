// Segment Scheduler: bounded worker pool running fetch, decrypt and write per segment.

use crate::DownloadError;
use crate::hls::decryption::{CipherContext, SegmentDecryptor};
use crate::hls::fetcher::Fetcher;
use crate::workspace::WorkspaceManager;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Unit of work: one segment, identified by its playback index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTask {
    pub index: usize,
    pub url: String,
}

/// A segment written to the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    pub index: usize,
    pub path: PathBuf,
    pub bytes: u64,
}

/// A segment that could not be produced. Carries the original task so a
/// retry pass can resubmit it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentFailure {
    pub index: usize,
    pub url: String,
    pub error: String,
}

impl SegmentFailure {
    pub fn task(&self) -> SegmentTask {
        SegmentTask {
            index: self.index,
            url: self.url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentResult {
    Success(SegmentFile),
    Failure(SegmentFailure),
}

/// Stateless per-segment pipeline shared by every worker of a run.
pub struct SegmentWorker {
    fetcher: Arc<dyn Fetcher>,
    cipher: Option<Arc<CipherContext>>,
    workspace: WorkspaceManager,
}

impl SegmentWorker {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        cipher: Option<Arc<CipherContext>>,
        workspace: WorkspaceManager,
    ) -> Self {
        Self {
            fetcher,
            cipher,
            workspace,
        }
    }

    async fn fetch_decrypt_write(&self, task: &SegmentTask) -> Result<SegmentFile, DownloadError> {
        let raw = self.fetcher.fetch(&task.url).await?;
        let data = SegmentDecryptor::decrypt(raw, self.cipher.as_deref())?;
        let path = self.workspace.segment_path(task.index);
        tokio::fs::write(&path, &data).await?;
        Ok(SegmentFile {
            index: task.index,
            path,
            bytes: data.len() as u64,
        })
    }

    /// Never fails: errors become [`SegmentResult::Failure`] data.
    pub async fn process(&self, task: SegmentTask) -> SegmentResult {
        match self.fetch_decrypt_write(&task).await {
            Ok(file) => {
                debug!(index = task.index, bytes = file.bytes, "Segment stored");
                SegmentResult::Success(file)
            }
            Err(e) => {
                warn!(index = task.index, url = %task.url, error = %e, "Segment failed");
                SegmentResult::Failure(SegmentFailure {
                    index: task.index,
                    url: task.url,
                    error: e.to_string(),
                })
            }
        }
    }
}

#[derive(Clone)]
pub struct SegmentScheduler {
    worker: Arc<SegmentWorker>,
    concurrency: usize,
}

impl SegmentScheduler {
    pub fn new(worker: Arc<SegmentWorker>, concurrency: usize) -> Self {
        Self {
            worker,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs every task with at most `concurrency` in flight and sends each
    /// result as it completes. Completion order is unspecified.
    pub async fn run(&self, tasks: Vec<SegmentTask>, result_tx: mpsc::Sender<SegmentResult>) {
        info!(tasks = tasks.len(), concurrency = self.concurrency, "SegmentScheduler started.");
        let mut pending = tasks.into_iter();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < self.concurrency {
                let Some(task) = pending.next() else {
                    break;
                };
                let worker = Arc::clone(&self.worker);
                let fallback = task.clone();
                let handle = tokio::spawn(async move { worker.process(task).await });
                in_flight.push(async move {
                    handle.await.unwrap_or_else(|e| {
                        SegmentResult::Failure(SegmentFailure {
                            index: fallback.index,
                            url: fallback.url,
                            error: format!("worker task aborted: {e}"),
                        })
                    })
                });
            }

            let Some(result) = in_flight.next().await else {
                break;
            };
            if result_tx.send(result).await.is_err() {
                warn!("Result channel closed. SegmentScheduler stopping early.");
                break;
            }
        }
        debug!("SegmentScheduler finished.");
    }
}
