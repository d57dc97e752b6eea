//! Transient segment storage.
//!
//! The workspace is a single directory of per-segment files named by
//! zero-padded index (`00042.ts`). Every worker writes a distinct file, so
//! concurrent writes never contend. All operations tolerate a missing
//! directory.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::DownloadError;
use crate::hls::SegmentFile;

pub const SEGMENT_EXTENSION: &str = "ts";
const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub files_cleared: usize,
    pub bytes_freed: u64,
}

impl fmt::Display for CleanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cleared {} temporary files, freed {:.2}MB of disk space",
            self.files_cleared,
            self.bytes_freed as f64 / MB
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Missing,
    Empty,
    Active {
        segment_file_count: usize,
        total_bytes: u64,
    },
}

impl fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceStatus::Missing => write!(f, "Workspace directory does not exist"),
            WorkspaceStatus::Empty => write!(
                f,
                "Workspace is empty: no download in progress or the last one completed"
            ),
            WorkspaceStatus::Active {
                segment_file_count,
                total_bytes,
            } => write!(
                f,
                "Workspace holds {segment_file_count} segment files\nTotal size: {:.2}MB",
                *total_bytes as f64 / MB
            ),
        }
    }
}

/// Outcome of a free-space probe. `ok == false` is a normal result, not an
/// error; `message` always explains it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskSpaceCheck {
    pub ok: bool,
    pub available_mb: Option<f64>,
    pub required_mb: u64,
    pub message: String,
}

impl DiskSpaceCheck {
    pub fn into_result(self) -> Result<(), DownloadError> {
        match (self.ok, self.available_mb) {
            (true, _) => Ok(()),
            (false, Some(available_mb)) => Err(DownloadError::DiskSpace {
                available_mb,
                required_mb: self.required_mb,
            }),
            (false, None) => Err(DownloadError::DiskSpaceProbe(self.message)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{index:05}.{SEGMENT_EXTENSION}"))
    }

    pub async fn ensure_exists(&self) -> Result<(), DownloadError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Removes every file in the workspace. Files that vanish or refuse
    /// removal are skipped.
    pub async fn clear_all(&self) -> Result<CleanReport, DownloadError> {
        let mut report = CleanReport {
            files_cleared: 0,
            bytes_freed: 0,
        };
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    report.files_cleared += 1;
                    report.bytes_freed += metadata.len();
                }
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to remove workspace file"),
            }
        }

        debug!(
            files = report.files_cleared,
            bytes = report.bytes_freed,
            "Workspace cleared"
        );
        Ok(report)
    }

    /// Removes the given assembled segments and nothing else.
    pub async fn remove_segments(&self, segments: &[SegmentFile]) -> CleanReport {
        let mut report = CleanReport {
            files_cleared: 0,
            bytes_freed: 0,
        };
        for segment in segments {
            match tokio::fs::remove_file(&segment.path).await {
                Ok(()) => {
                    report.files_cleared += 1;
                    report.bytes_freed += segment.bytes;
                }
                Err(e) => warn!(path = %segment.path.display(), error = %e, "Failed to remove segment file"),
            }
        }
        report
    }

    /// Whether `path` lies inside the workspace directory.
    pub fn contains(&self, path: &Path) -> Result<bool, DownloadError> {
        let dir = std::path::absolute(&self.dir)?;
        Ok(std::path::absolute(path)?.starts_with(dir))
    }

    /// Segment files are counted; the size covers every file present.
    pub async fn status(&self) -> Result<WorkspaceStatus, DownloadError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(WorkspaceStatus::Missing),
            Err(e) => return Err(e.into()),
        };

        let mut any_file = false;
        let mut segment_file_count = 0;
        let mut total_bytes = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            any_file = true;
            total_bytes += metadata.len();
            if is_segment_file(&entry.path()) {
                segment_file_count += 1;
            }
        }

        Ok(if any_file {
            WorkspaceStatus::Active {
                segment_file_count,
                total_bytes,
            }
        } else {
            WorkspaceStatus::Empty
        })
    }

    /// Compares free space on the filesystem holding `path`'s parent
    /// directory against `required_mb`.
    pub fn check_disk_space(path: &Path, required_mb: u64) -> DiskSpaceCheck {
        let probe = std::path::absolute(path).map(|abs| match abs.parent() {
            Some(parent) => parent.to_path_buf(),
            None => abs,
        });
        let available = probe.and_then(|dir| fs2::available_space(&dir));

        match available {
            Ok(bytes) => {
                let available_mb = bytes as f64 / MB;
                if available_mb < required_mb as f64 {
                    DiskSpaceCheck {
                        ok: false,
                        available_mb: Some(available_mb),
                        required_mb,
                        message: format!(
                            "Insufficient disk space: only {available_mb:.2}MB available, at least {required_mb}MB required"
                        ),
                    }
                } else {
                    DiskSpaceCheck {
                        ok: true,
                        available_mb: Some(available_mb),
                        required_mb,
                        message: format!("Sufficient disk space: {available_mb:.2}MB available"),
                    }
                }
            }
            Err(e) => DiskSpaceCheck {
                ok: false,
                available_mb: None,
                required_mb,
                message: format!("Failed to check disk space: {e}"),
            },
        }
    }
}

pub fn is_segment_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SEGMENT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn segment_names_are_zero_padded() {
        let ws = WorkspaceManager::new("work");
        assert_eq!(ws.segment_path(7), PathBuf::from("work/00007.ts"));
        assert_eq!(ws.segment_path(12345), PathBuf::from("work/12345.ts"));
    }

    #[tokio::test]
    async fn missing_workspace_is_reported_distinctly() {
        let tmp = TempDir::new().unwrap();
        let ws = WorkspaceManager::new(tmp.path().join("absent"));

        assert_eq!(ws.status().await.unwrap(), WorkspaceStatus::Missing);
        assert_eq!(
            ws.clear_all().await.unwrap(),
            CleanReport {
                files_cleared: 0,
                bytes_freed: 0
            }
        );
    }

    #[tokio::test]
    async fn status_and_clear_cycle() {
        let tmp = TempDir::new().unwrap();
        let ws = WorkspaceManager::new(tmp.path().join("segments"));
        ws.ensure_exists().await.unwrap();
        ws.ensure_exists().await.unwrap();
        assert_eq!(ws.status().await.unwrap(), WorkspaceStatus::Empty);

        tokio::fs::write(ws.segment_path(0), vec![0u8; 100]).await.unwrap();
        tokio::fs::write(ws.segment_path(1), vec![0u8; 50]).await.unwrap();
        tokio::fs::write(ws.dir().join("stray.log"), vec![0u8; 10]).await.unwrap();

        assert_eq!(
            ws.status().await.unwrap(),
            WorkspaceStatus::Active {
                segment_file_count: 2,
                total_bytes: 160
            }
        );

        let report = ws.clear_all().await.unwrap();
        assert_eq!(report.files_cleared, 3);
        assert_eq!(report.bytes_freed, 160);
        assert_eq!(ws.status().await.unwrap(), WorkspaceStatus::Empty);

        let again = ws.clear_all().await.unwrap();
        assert_eq!(again.files_cleared, 0);
        assert_eq!(again.bytes_freed, 0);
    }

    #[tokio::test]
    async fn remove_segments_leaves_other_files() {
        let tmp = TempDir::new().unwrap();
        let ws = WorkspaceManager::new(tmp.path().join("segments"));
        ws.ensure_exists().await.unwrap();
        tokio::fs::write(ws.segment_path(0), vec![0u8; 40]).await.unwrap();
        tokio::fs::write(ws.dir().join("keep.mp4"), vec![0u8; 10]).await.unwrap();

        let report = ws
            .remove_segments(&[SegmentFile {
                index: 0,
                path: ws.segment_path(0),
                bytes: 40,
            }])
            .await;
        assert_eq!(report.files_cleared, 1);
        assert_eq!(report.bytes_freed, 40);
        assert!(ws.dir().join("keep.mp4").exists());
        assert!(!ws.segment_path(0).exists());
    }

    #[test]
    fn contains_detects_paths_under_the_workspace() {
        let tmp = TempDir::new().unwrap();
        let ws = WorkspaceManager::new(tmp.path().join("ts_files"));
        assert!(ws.contains(&tmp.path().join("ts_files").join("video.mp4")).unwrap());
        assert!(ws.contains(&ws.segment_path(0)).unwrap());
        assert!(!ws.contains(&tmp.path().join("ts_files_out.mp4")).unwrap());
        assert!(!ws.contains(&tmp.path().join("out").join("video.mp4")).unwrap());
    }

    #[test]
    fn disk_space_shortfall_names_both_amounts() {
        let tmp = TempDir::new().unwrap();
        let check = WorkspaceManager::check_disk_space(&tmp.path().join("out.mp4"), u64::MAX / 2);

        assert!(!check.ok);
        assert!(check.available_mb.is_some());
        assert!(check.message.contains("MB available"));
        assert!(check.message.contains(&format!("{}MB required", u64::MAX / 2)));
        assert!(matches!(
            check.into_result(),
            Err(DownloadError::DiskSpace { .. })
        ));
    }

    #[test]
    fn zero_requirement_passes() {
        let tmp = TempDir::new().unwrap();
        let check = WorkspaceManager::check_disk_space(&tmp.path().join("out.mp4"), 0);
        assert!(check.ok, "{}", check.message);
        assert!(check.into_result().is_ok());
    }
}
