// Download Coordinator: drives the worker pool over all segments, then loops
// the failure set through bounded retry passes.

use crate::hls::events::{DownloadEvent, OnEvent};
use crate::hls::scheduler::{SegmentFailure, SegmentFile, SegmentResult, SegmentScheduler, SegmentTask};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Result of a coordinated run. `segments` is sorted by playback index.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub segments: Vec<SegmentFile>,
    pub failures: Vec<SegmentFailure>,
    pub retry_passes: u32,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Successes and outstanding failures, both keyed by index. Only the
/// coordinator mutates it.
#[derive(Default)]
struct RunState {
    succeeded: BTreeMap<usize, SegmentFile>,
    failed: BTreeMap<usize, SegmentFailure>,
}

impl RunState {
    fn record(&mut self, result: SegmentResult) {
        match result {
            SegmentResult::Success(file) => {
                self.failed.remove(&file.index);
                self.succeeded.insert(file.index, file);
            }
            SegmentResult::Failure(failure) => {
                self.failed.insert(failure.index, failure);
            }
        }
    }

    fn retry_tasks(&self) -> Vec<SegmentTask> {
        self.failed.values().map(SegmentFailure::task).collect()
    }
}

pub struct DownloadCoordinator {
    scheduler: SegmentScheduler,
    on_event: Option<OnEvent>,
}

impl DownloadCoordinator {
    pub fn new(scheduler: SegmentScheduler, on_event: Option<OnEvent>) -> Self {
        Self {
            scheduler,
            on_event,
        }
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }

    /// Submits tasks to the pool and drains the result channel into `state`.
    async fn run_pass(&self, tasks: Vec<SegmentTask>, state: &mut RunState) {
        let (result_tx, mut result_rx) = mpsc::channel(self.scheduler.concurrency() * 2);
        let scheduler = self.scheduler.clone();
        let handle = tokio::spawn(async move { scheduler.run(tasks, result_tx).await });

        while let Some(result) = result_rx.recv().await {
            match &result {
                SegmentResult::Success(file) => self.emit(DownloadEvent::SegmentCompleted {
                    index: file.index,
                    bytes: file.bytes,
                }),
                SegmentResult::Failure(failure) => self.emit(DownloadEvent::SegmentFailed {
                    index: failure.index,
                    error: failure.error.clone(),
                }),
            }
            state.record(result);
        }

        if let Err(e) = handle.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
    }

    /// Pass 0 covers every segment; passes `1..=max_retry_passes` cover only
    /// what is still failing, with the original index and URL.
    pub async fn run(&self, segments: &[String], max_retry_passes: u32) -> RunOutcome {
        let mut state = RunState::default();
        let tasks: Vec<SegmentTask> = segments
            .iter()
            .enumerate()
            .map(|(index, url)| SegmentTask {
                index,
                url: url.clone(),
            })
            .collect();

        info!(segments = tasks.len(), "Downloading segments");
        self.run_pass(tasks, &mut state).await;

        let mut retry_passes = 0;
        while !state.failed.is_empty() && retry_passes < max_retry_passes {
            retry_passes += 1;
            let tasks = state.retry_tasks();
            info!(pass = retry_passes, pending = tasks.len(), "Retrying failed segments");
            self.emit(DownloadEvent::RetryPassStarted {
                pass: retry_passes,
                pending: tasks.len(),
            });
            self.run_pass(tasks, &mut state).await;
        }

        if state.failed.is_empty() {
            debug!(retry_passes, "All segments downloaded");
        }

        RunOutcome {
            segments: state.succeeded.into_values().collect(),
            failures: state.failed.into_values().collect(),
            retry_passes,
        }
    }
}
