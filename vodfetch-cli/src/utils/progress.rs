use indicatif::{ProgressBar, ProgressStyle};
use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing_subscriber::fmt::MakeWriter;
use vodfetch_engine::DownloadEvent;

fn segment_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments ({per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Renders engine [`DownloadEvent`]s as a single segment-count bar.
#[derive(Clone)]
pub struct ProgressManager {
    bar: Arc<Mutex<Option<ProgressBar>>>,
    disabled: bool,
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressManager {
    pub fn new() -> Self {
        Self {
            bar: Arc::new(Mutex::new(None)),
            disabled: false,
        }
    }

    pub fn new_disabled() -> Self {
        Self {
            bar: Arc::new(Mutex::new(None)),
            disabled: true,
        }
    }

    pub fn handle_event(&self, event: DownloadEvent) {
        if self.disabled {
            return;
        }
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };

        match event {
            DownloadEvent::ManifestParsed {
                segment_count,
                encrypted,
            } => {
                let bar = ProgressBar::new(segment_count as u64);
                bar.set_style(segment_style());
                bar.set_message(if encrypted {
                    "Downloading encrypted segments"
                } else {
                    "Downloading segments"
                });
                bar.enable_steady_tick(Duration::from_millis(500));
                *slot = Some(bar);
            }
            DownloadEvent::SegmentCompleted { .. } => {
                if let Some(bar) = slot.as_ref() {
                    bar.inc(1);
                }
            }
            DownloadEvent::SegmentFailed { index, error } => {
                if let Some(bar) = slot.as_ref() {
                    bar.println(format!("segment {index} failed: {error}"));
                }
            }
            DownloadEvent::RetryPassStarted { pass, pending } => {
                if let Some(bar) = slot.as_ref() {
                    bar.set_message(format!("Retry pass {pass}: {pending} segments pending"));
                }
            }
            DownloadEvent::AssemblyStarted { segment_count } => {
                if let Some(bar) = slot.as_ref() {
                    bar.set_message(format!("Merging {segment_count} segments"));
                }
            }
            DownloadEvent::Finished => {
                if let Some(bar) = slot.take() {
                    bar.finish_with_message("Finished");
                }
            }
        }
    }

    /// Clears a bar left behind by a run that stopped early.
    pub fn abandon(&self) {
        if let Ok(mut slot) = self.bar.lock()
            && let Some(bar) = slot.take()
        {
            bar.abandon();
        }
    }
}

/// Log writer that suspends the active bar while a line is written, so log
/// output and the bar never overwrite each other.
pub struct ProgressWriter {
    bar: Option<ProgressBar>,
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.bar {
            Some(bar) => bar.suspend(|| io::stderr().write(buf)),
            None => io::stderr().write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match &self.bar {
            Some(bar) => bar.suspend(|| io::stderr().write_all(buf)),
            None => io::stderr().write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ProgressManager {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let bar = self.bar.lock().ok().and_then(|slot| slot.clone());
        ProgressWriter { bar }
    }
}
