//! Cargo-style terminal output for a sync cycle
//!
//! ```text
//!    Checking http://localhost:3000
//! Downloading [===========>             ] 47% data/level1.pak
//!      Synced 12 files (84.20 MiB) in 3.21s
//! ```

use std::io::{self, Write as _};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

use patchsync_client::{ProgressEvent, ProgressObserver, SyncReport, SyncStatus};

/// Bar resolution; progress arrives as a fraction
const BAR_UNITS: u64 = 1000;

struct Status;

impl Status {
    const CHECKING: &str = "Checking";
    const DOWNLOADING: &str = "Downloading";
    const FRESH: &str = "Fresh";
    const SYNCED: &str = "Synced";
    const FINISHED: &str = "Finished";
    const FAILED: &str = "Failed";
}

/// Shared draw target for every bar and for console log lines
fn multi() -> &'static MultiProgress {
    static MULTI: OnceLock<MultiProgress> = OnceLock::new();
    MULTI.get_or_init(MultiProgress::new)
}

fn print_status(style: &console::Style, status: &str, message: &str) {
    let line = format!("{:>12} {message}", style.apply_to(status));
    multi().suspend(|| {
        let _ = writeln!(console::Term::stderr(), "{line}");
    });
}

fn green() -> console::Style {
    console::Style::new().green().bold()
}

fn format_elapsed(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 1 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}

/// Forwards orchestrator events to a progress bar
pub struct TerminalProgress {
    backend: String,
    start: Instant,
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            start: Instant::now(),
            bar: Mutex::new(None),
        }
    }

    fn start_bar(&self) {
        let bar = multi().add(ProgressBar::new(BAR_UNITS));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:>12.green.bold} [{bar:25.cyan/dim}] {percent:>3}% {prefix:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(Status::DOWNLOADING);
        bar.enable_steady_tick(Duration::from_millis(100));
        *self.bar.lock() = Some(bar);
    }

    fn clear_bar(&self) {
        if let Some(bar) = self.bar.lock().take() {
            bar.finish_and_clear();
            multi().remove(&bar);
        }
    }

    /// Print the closing line for a cycle that downloaded
    pub fn finish(&self, report: &SyncReport) {
        let elapsed = format_elapsed(self.start.elapsed());
        let size = humansize::format_size(report.bytes_downloaded, humansize::BINARY);

        if report.failed == 0 && report.rejected == 0 {
            print_status(
                &green(),
                Status::SYNCED,
                &format!(
                    "{} files ({size}) in {elapsed}, {} already current",
                    report.downloaded, report.skipped
                ),
            );
        } else {
            print_status(
                &console::Style::new().yellow().bold(),
                Status::FINISHED,
                &format!(
                    "{} downloaded, {} failed, {} rejected in {elapsed}",
                    report.downloaded, report.failed, report.rejected
                ),
            );
        }
    }
}

impl ProgressObserver for TerminalProgress {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Status(SyncStatus::Checking) => {
                print_status(&green(), Status::CHECKING, &self.backend);
            }
            ProgressEvent::Status(SyncStatus::Downloading) => self.start_bar(),
            ProgressEvent::Status(SyncStatus::AlreadyReady) => {
                print_status(&green(), Status::FRESH, "local files match the remote");
            }
            ProgressEvent::Status(SyncStatus::Ready) => self.clear_bar(),
            ProgressEvent::Status(SyncStatus::Error) => {
                self.clear_bar();
                print_status(
                    &console::Style::new().red().bold(),
                    Status::FAILED,
                    "sync did not complete",
                );
            }
            ProgressEvent::Progress(fraction) => {
                if let Some(bar) = &*self.bar.lock() {
                    #[allow(
                        clippy::cast_possible_truncation,
                        clippy::cast_sign_loss,
                        clippy::cast_precision_loss
                    )]
                    bar.set_position((fraction.clamp(0.0, 1.0) * BAR_UNITS as f64) as u64);
                }
            }
            ProgressEvent::CurrentFile(file) => {
                if let Some(bar) = &*self.bar.lock() {
                    bar.set_prefix(file.path);
                }
            }
        }
    }
}

/// Console log writer that keeps log lines from tearing the progress bars
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressWriter;

impl io::Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        multi().suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ProgressWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_format() {
        assert_eq!(format_elapsed(Duration::from_millis(250)), "250ms");
        assert_eq!(format_elapsed(Duration::from_millis(3210)), "3.21s");
    }

    #[test]
    fn test_bar_lifecycle() {
        let progress = TerminalProgress::new("http://localhost:3000");
        progress.on_event(ProgressEvent::Status(SyncStatus::Downloading));
        progress.on_event(ProgressEvent::Progress(0.5));
        assert_eq!(
            progress.bar.lock().as_ref().map(ProgressBar::position),
            Some(BAR_UNITS / 2)
        );

        progress.on_event(ProgressEvent::Status(SyncStatus::Ready));
        assert!(progress.bar.lock().is_none());
        // Late progress without a bar is ignored
        progress.on_event(ProgressEvent::Progress(1.0));
    }
}
