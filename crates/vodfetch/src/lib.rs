//! # Vodfetch
//!
//! Downloads a video published as an HLS playlist of transport-stream
//! segments, optionally AES-128 encrypted, and reassembles it into a
//! single file.
//!
//! ## Features
//!
//! - Manifest analysis without touching segments or keys
//! - Bounded-concurrency segment download with retry passes
//! - AES-128-CBC segment decryption
//! - Ordered assembly with size sanity check
//! - Workspace status and cleanup

pub mod builder;
pub mod catalog;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hls;
pub mod report;
pub mod workspace;

pub use builder::EngineConfigBuilder;
pub use config::{EngineConfig, FetcherConfig, HttpConfig};
pub use error::DownloadError;

pub use hls::{DownloadEvent, OnEvent};
pub use report::{AnalyzeReport, DownloadOutcome, DownloadReport, FailureSummary};
pub use workspace::{CleanReport, DiskSpaceCheck, WorkspaceManager, WorkspaceStatus};

// Re-export downloader utilities
pub use downloader::{DownloadOptions, VodDownloader, create_client};
