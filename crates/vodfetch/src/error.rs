use thiserror::Error;

/// Errors produced by the engine.
///
/// Per-segment failures are never raised through this type during a run;
/// they are carried as [`crate::hls::SegmentFailure`] data so the
/// coordinator can finish a pass before deciding anything.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Unsupported encryption method: {0}, only AES-128 is supported")]
    UnsupportedCipher(String),

    #[error("Network error for {url}: {detail}")]
    Network { url: String, detail: String },

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error(
        "Insufficient disk space: only {available_mb:.2}MB available, at least {required_mb}MB required"
    )]
    DiskSpace { available_mb: f64, required_mb: u64 },

    #[error("{0}")]
    DiskSpaceProbe(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output path {} is inside the segment workspace", .0.display())]
    OutputInWorkspace(std::path::PathBuf),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DownloadError {
    pub(crate) fn network(url: impl Into<String>, detail: impl ToString) -> Self {
        DownloadError::Network {
            url: url.into(),
            detail: detail.to_string(),
        }
    }

    /// Whether a `download` call reports this error as a rejection rather
    /// than a failed run. Rejections happen before any segment is fetched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DownloadError::Manifest(_)
                | DownloadError::UnsupportedCipher(_)
                | DownloadError::DiskSpace { .. }
                | DownloadError::DiskSpaceProbe(_)
                | DownloadError::OutputInWorkspace(_)
        )
    }
}
