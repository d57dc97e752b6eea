use std::sync::Arc;

/// Progress notifications emitted during a download run.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    ManifestParsed {
        segment_count: usize,
        encrypted: bool,
    },
    SegmentCompleted {
        index: usize,
        bytes: u64,
    },
    SegmentFailed {
        index: usize,
        error: String,
    },
    RetryPassStarted {
        pass: u32,
        pending: usize,
    },
    AssemblyStarted {
        segment_count: usize,
    },
    Finished,
}

pub type OnEvent = Arc<dyn Fn(DownloadEvent) + Send + Sync>;
