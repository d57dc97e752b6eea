// Segment retrieval pipeline: manifest -> key -> worker pool -> assembly

pub mod coordinator;
pub mod decryption;
pub mod events;
pub mod fetcher;
pub mod manifest;
pub mod output;
pub mod scheduler;

// Re-exports for easier access
pub use coordinator::{DownloadCoordinator, RunOutcome};
pub use decryption::{CipherContext, KeyResolver, SegmentDecryptor};
pub use events::{DownloadEvent, OnEvent};
pub use fetcher::{Fetcher, SegmentFetcher};
pub use manifest::{EncryptionInfo, Manifest};
pub use output::Assembler;
pub use scheduler::{SegmentFailure, SegmentFile, SegmentResult, SegmentScheduler, SegmentTask, SegmentWorker};
