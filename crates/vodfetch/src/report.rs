//! Results of the public operations. Each renders as the human-readable
//! string a caller prints, and serializes for machine consumers.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::hls::SegmentFailure;

const MB: f64 = 1024.0 * 1024.0;
pub const MAX_SAMPLE_ERRORS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzeReport {
    pub encryption_method: Option<String>,
    pub segment_count: usize,
    pub estimated_size_mb: u64,
    pub first_segment_url: String,
    pub key_url: Option<String>,
}

impl fmt::Display for AnalyzeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Manifest analysis:")?;
        writeln!(
            f,
            "Encryption: {}",
            self.encryption_method.as_deref().unwrap_or("none")
        )?;
        writeln!(f, "Segments: {}", self.segment_count)?;
        writeln!(f, "Estimated size (MB): {}", self.estimated_size_mb)?;
        writeln!(f, "First segment: {}", self.first_segment_url)?;
        write!(f, "Key URL: {}", self.key_url.as_deref().unwrap_or("none"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadReport {
    pub output_path: PathBuf,
    pub size_bytes: u64,
    pub elapsed_seconds: f64,
}

impl DownloadReport {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / MB
    }

    pub fn mb_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.size_mb() / self.elapsed_seconds
        } else {
            0.0
        }
    }
}

impl fmt::Display for DownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Video saved to: {}", self.output_path.display())?;
        writeln!(f, "File size: {:.2}MB", self.size_mb())?;
        writeln!(f, "Elapsed: {:.2}s", self.elapsed_seconds)?;
        write!(f, "Speed: {:.2}MB/s", self.mb_per_second())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSummary {
    pub unresolved_count: usize,
    pub sample_errors: Vec<String>,
    pub retries_attempted: u32,
}

impl FailureSummary {
    pub fn new(failures: &[SegmentFailure], retries_attempted: u32) -> Self {
        Self {
            unresolved_count: failures.len(),
            sample_errors: failures
                .iter()
                .take(MAX_SAMPLE_ERRORS)
                .map(|f| format!("segment {} ({}): {}", f.index, f.url, f.error))
                .collect(),
            retries_attempted,
        }
    }
}

impl fmt::Display for FailureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Download finished, but {} segments failed (retried {} times):",
            self.unresolved_count, self.retries_attempted
        )?;
        for sample in &self.sample_errors {
            write!(f, "\n{sample}")?;
        }
        let hidden = self.unresolved_count.saturating_sub(self.sample_errors.len());
        if hidden > 0 {
            write!(f, "\n... and {hidden} more")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Completed(DownloadReport),
    Incomplete(FailureSummary),
    Rejected { reason: String },
}

impl fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadOutcome::Completed(report) => report.fmt(f),
            DownloadOutcome::Incomplete(summary) => summary.fmt(f),
            DownloadOutcome::Rejected { reason } => write!(f, "Download rejected: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(index: usize) -> SegmentFailure {
        SegmentFailure {
            index,
            url: format!("https://cdn.example.com/{index}.ts"),
            error: "timed out".to_string(),
        }
    }

    #[test]
    fn summary_caps_samples() {
        let failures: Vec<_> = (0..8).map(failure).collect();
        let summary = FailureSummary::new(&failures, 3);
        assert_eq!(summary.unresolved_count, 8);
        assert_eq!(summary.sample_errors.len(), MAX_SAMPLE_ERRORS);

        let text = summary.to_string();
        assert!(text.starts_with("Download finished, but 8 segments failed (retried 3 times):"));
        assert!(text.contains("segment 4 (https://cdn.example.com/4.ts): timed out"));
        assert!(!text.contains("segment 5 "));
        assert!(text.ends_with("... and 3 more"));
    }

    #[test]
    fn short_summary_has_no_overflow_line() {
        let summary = FailureSummary::new(&[failure(3)], 1);
        assert!(!summary.to_string().contains("more"));
    }

    #[test]
    fn speed_handles_zero_elapsed() {
        let report = DownloadReport {
            output_path: PathBuf::from("out.mp4"),
            size_bytes: 2 * 1024 * 1024,
            elapsed_seconds: 0.0,
        };
        assert_eq!(report.size_mb(), 2.0);
        assert_eq!(report.mb_per_second(), 0.0);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let outcome = DownloadOutcome::Rejected {
            reason: "Unsupported encryption method: SAMPLE-AES".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "rejected");
        assert!(outcome.to_string().starts_with("Download rejected:"));
    }

    #[test]
    fn analyze_report_renders_missing_fields_as_none() {
        let report = AnalyzeReport {
            encryption_method: None,
            segment_count: 2,
            estimated_size_mb: 4,
            first_segment_url: "https://cdn.example.com/0.ts".to_string(),
            key_url: None,
        };
        let text = report.to_string();
        assert!(text.contains("Encryption: none"));
        assert!(text.contains("Key URL: none"));
    }
}
