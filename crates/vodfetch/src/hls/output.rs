// Assembler: concatenates stored segments in playback order into the final artifact.

use crate::DownloadError;
use crate::hls::scheduler::SegmentFile;
use crate::workspace::is_segment_file;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

pub struct Assembler {
    min_output_bytes: u64,
}

impl Assembler {
    pub fn new(min_output_bytes: u64) -> Self {
        Self { min_output_bytes }
    }

    /// Writes `segments` to `output_path` sorted by index, whatever order
    /// they arrive in. Returns the artifact size in bytes.
    pub async fn assemble(
        &self,
        output_path: &Path,
        segments: &[SegmentFile],
    ) -> Result<u64, DownloadError> {
        let mut ordered: Vec<&SegmentFile> = segments.iter().collect();
        ordered.sort_by_key(|segment| segment.index);

        for segment in &ordered {
            if !is_segment_file(&segment.path) {
                return Err(DownloadError::Assembly(format!(
                    "not a segment file: {}",
                    segment.path.display()
                )));
            }
            if !tokio::fs::try_exists(&segment.path).await? {
                return Err(DownloadError::Assembly(format!(
                    "segment {} is missing: {}",
                    segment.index,
                    segment.path.display()
                )));
            }
        }

        info!(segments = ordered.len(), output = %output_path.display(), "Assembling segments");
        let mut writer = BufWriter::new(File::create(output_path).await?);
        for segment in &ordered {
            let mut input = File::open(&segment.path).await?;
            let copied = tokio::io::copy(&mut input, &mut writer).await?;
            debug!(index = segment.index, bytes = copied, "Segment appended");
        }
        writer.flush().await?;
        drop(writer);

        let size = tokio::fs::metadata(output_path).await?.len();
        if size < self.min_output_bytes {
            return Err(DownloadError::Assembly(format!(
                "assembled file size is abnormal: {size} bytes (minimum {})",
                self.min_output_bytes
            )));
        }
        Ok(size)
    }
}
