//! Client sync cycle
//!
//! One cycle runs `Idle → Checking → (UpToDate | Downloading) → Ready`, or
//! ends in `Error` when the authoritative state cannot be established.
//!
//! Downloads run as independent tasks behind a semaphore. Each task adds its
//! file's declared size to a shared counter when it finishes, whatever the
//! outcome, and a reporter task samples that counter on a fixed interval.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::WrapErr as _;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use patchsync_core::snapshot::resolve_relative;
use patchsync_core::{
    ClientConfig, ContentHash, FileFingerprint, LocalSyncRecord, Scanner, SnapshotSummary,
};
use patchsync_transport::Remote;

use crate::progress::{CurrentFile, ProgressEvent, ProgressObserver, SyncStatus};

/// Where a sync cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Checking,
    UpToDate,
    Downloading,
    Ready,
    Error,
}

impl SyncState {
    /// The status reported to observers on entering this state
    #[must_use]
    pub fn status(&self) -> Option<SyncStatus> {
        match self {
            Self::Idle => None,
            Self::Checking => Some(SyncStatus::Checking),
            Self::UpToDate => Some(SyncStatus::AlreadyReady),
            Self::Downloading => Some(SyncStatus::Downloading),
            Self::Ready => Some(SyncStatus::Ready),
            Self::Error => Some(SyncStatus::Error),
        }
    }

    /// Whether the cycle is over
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }
}

/// Per-file totals of one `synchronize` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries in the remote listing
    pub files: usize,
    /// Local copy already matched the remote hash
    pub skipped: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Listing entries whose path would land outside the sync root
    pub rejected: usize,
    pub bytes_downloaded: u64,
}

impl SyncReport {
    /// Download attempts made, successful or not
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.downloaded + self.failed
    }

    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Downloaded(bytes) => {
                self.downloaded += 1;
                self.bytes_downloaded += bytes;
            }
            FileOutcome::Failed => self.failed += 1,
            FileOutcome::Rejected => self.rejected += 1,
        }
    }
}

/// How a `run_cycle` ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    UpToDate,
    Synced(SyncReport),
}

#[derive(Debug, Clone, Copy)]
enum FileOutcome {
    Skipped,
    Downloaded(u64),
    Failed,
    Rejected,
}

/// Counters shared between download workers and the progress reporter
#[derive(Debug)]
struct Tracker {
    accounted: AtomicU64,
    remaining: AtomicUsize,
    /// Last-write-wins hint; path and size are swapped together
    current: Mutex<Option<CurrentFile>>,
}

impl Tracker {
    fn new(files: usize) -> Self {
        Self {
            accounted: AtomicU64::new(0),
            remaining: AtomicUsize::new(files),
            current: Mutex::new(None),
        }
    }

    fn fraction(&self, total: u64) -> f64 {
        if total == 0 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = self.accounted.load(Ordering::SeqCst) as f64 / total as f64;
        fraction.min(1.0)
    }

    fn set_current(&self, file: &FileFingerprint) {
        *self.current.lock() = Some(CurrentFile {
            path: file.path.clone(),
            size: file.size,
        });
    }

    fn current(&self) -> Option<CurrentFile> {
        self.current.lock().clone()
    }
}

/// Accounts a file as finished when dropped, on every exit path
struct Completion<'a> {
    tracker: &'a Tracker,
    size: u64,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.tracker.accounted.fetch_add(self.size, Ordering::SeqCst);
        self.tracker.remaining.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Drives sync cycles of one local root against one remote
pub struct SyncOrchestrator<R> {
    config: ClientConfig,
    remote: Arc<R>,
    observer: Arc<dyn ProgressObserver>,
    record: LocalSyncRecord,
    state: SyncState,
    /// Summary fetched by the last update check
    remote_summary: Option<SnapshotSummary>,
}

impl<R: Remote> SyncOrchestrator<R> {
    pub fn new(config: ClientConfig, remote: R, observer: Arc<dyn ProgressObserver>) -> Self {
        let record = config.record();
        Self {
            config,
            remote: Arc::new(remote),
            observer,
            record,
            state: SyncState::Idle,
            remote_summary: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state
    }

    #[must_use]
    pub fn record(&self) -> &LocalSyncRecord {
        &self.record
    }

    fn enter(&mut self, state: SyncState) {
        debug!("Sync state {:?} -> {state:?}", self.state);
        self.state = state;
        if let Some(status) = state.status() {
            self.observer.on_event(ProgressEvent::Status(status));
        }
    }

    /// Run one full cycle: check, then download whatever differs
    ///
    /// # Errors
    /// Returns the failure that moved the cycle to `Error`.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        self.enter(SyncState::Checking);

        let needed = match self.check().await {
            Ok(needed) => needed,
            Err(e) => {
                error!("Update check failed: {e:#}");
                self.enter(SyncState::Error);
                return Err(e);
            }
        };

        if !needed {
            info!("Local files match the remote, nothing to download");
            self.enter(SyncState::UpToDate);
            self.state = SyncState::Ready;
            return Ok(CycleOutcome::UpToDate);
        }

        self.enter(SyncState::Downloading);
        match self.synchronize().await {
            Ok(report) => {
                self.enter(SyncState::Ready);
                Ok(CycleOutcome::Synced(report))
            }
            Err(e) => {
                error!("Sync failed: {e:#}");
                self.enter(SyncState::Error);
                Err(e)
            }
        }
    }

    async fn check(&mut self) -> Result<bool> {
        if self.config.refresh_record {
            self.refresh_record().await?;
        }
        self.determine_update_needed().await
    }

    /// Rebuild the sync record from what is actually on disk
    ///
    /// Hashes the local copies of the files the remote lists and stores the
    /// resulting summary, so a record written before a previous cycle's
    /// downloads finished cannot hide missing files.
    ///
    /// # Errors
    /// Returns an error if the listing cannot be fetched or the record written.
    pub async fn refresh_record(&self) -> Result<SnapshotSummary> {
        let listing = self
            .remote
            .listing()
            .await
            .wrap_err("failed to fetch remote file list")?;

        let scanner = Scanner::new(&self.config.root);
        let local = tokio::task::spawn_blocking(move || scanner.scan_listed(&listing.files))
            .await
            .wrap_err("local scan task failed")?;
        let summary = local.summary();

        self.record.save(&summary)?;
        info!(
            "Local record refreshed: {} files, {} bytes, hash {}",
            local.len(),
            summary.total_size,
            summary.hash
        );
        Ok(summary)
    }

    /// Whether the local tree differs from the remote one
    ///
    /// # Errors
    /// Returns an error if the remote summary cannot be fetched.
    pub async fn determine_update_needed(&mut self) -> Result<bool> {
        let remote = self
            .remote
            .summary()
            .await
            .wrap_err("failed to fetch remote summary")?;
        self.remote_summary = Some(remote);
        debug!("Remote hash {}, total size {}", remote.hash, remote.total_size);

        match self.record.load() {
            None => {
                info!("No local sync record, update needed");
                Ok(true)
            }
            Some(local) if local.is_same_state(&remote) => Ok(false),
            Some(local) => {
                info!(
                    "Local record {} ({} bytes) differs from remote {} ({} bytes)",
                    local.hash, local.total_size, remote.hash, remote.total_size
                );
                Ok(true)
            }
        }
    }

    /// Fetch every listed file whose local copy does not match
    ///
    /// Per-file failures are logged and counted, never returned.
    ///
    /// # Errors
    /// Returns an error if the listing cannot be fetched or the new record
    /// cannot be persisted.
    pub async fn synchronize(&mut self) -> Result<SyncReport> {
        let listing = self
            .remote
            .listing()
            .await
            .wrap_err("failed to fetch remote file list")?;

        let total = self
            .remote_summary
            .map_or_else(|| listing.total_size(), |s| s.total_size);
        let mut report = SyncReport {
            files: listing.files.len(),
            ..SyncReport::default()
        };
        info!("Syncing {} files ({total} bytes)", report.files);

        let tracker = Arc::new(Tracker::new(listing.files.len()));
        let gate = Arc::new(Semaphore::new(self.config.max_concurrent_downloads.max(1)));
        let reporter = tokio::spawn(report_progress(
            Arc::clone(&tracker),
            total,
            self.config.progress_interval(),
            Arc::clone(&self.observer),
        ));

        let mut workers = JoinSet::new();
        for file in listing.files {
            workers.spawn(fetch_if_changed(
                Arc::clone(&self.remote),
                Arc::clone(&gate),
                Arc::clone(&tracker),
                self.config.root.clone(),
                file,
            ));
        }

        let persisted = self.persist_remote_summary().await;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!("Download worker died: {e}");
                    report.failed += 1;
                }
            }
        }
        if let Err(e) = reporter.await {
            warn!("Progress reporter died: {e}");
        }

        persisted?;
        info!(
            "Sync finished: {} downloaded, {} up to date, {} failed",
            report.downloaded, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn persist_remote_summary(&self) -> Result<SnapshotSummary> {
        let summary = self
            .remote
            .summary()
            .await
            .wrap_err("failed to fetch remote summary")?;
        self.record
            .save(&summary)
            .wrap_err_with(|| format!("failed to write {}", self.record.path().display()))?;
        Ok(summary)
    }
}

async fn fetch_if_changed<R: Remote>(
    remote: Arc<R>,
    gate: Arc<Semaphore>,
    tracker: Arc<Tracker>,
    root: PathBuf,
    file: FileFingerprint,
) -> FileOutcome {
    let _done = Completion {
        tracker: &tracker,
        size: file.size,
    };
    let Ok(_permit) = gate.acquire_owned().await else {
        return FileOutcome::Failed;
    };
    tracker.set_current(&file);

    let Some(dest) = resolve_relative(&root, &file.path) else {
        warn!("Refusing {:?}: path escapes the sync root", file.path);
        return FileOutcome::Rejected;
    };

    if local_matches(&dest, file.hash).await {
        debug!("{} is up to date, skipping", file.path);
        return FileOutcome::Skipped;
    }

    match remote.download(&file.path, &dest).await {
        Ok(bytes) => {
            debug!("Downloaded {} ({bytes} bytes)", file.path);
            FileOutcome::Downloaded(bytes)
        }
        Err(e) => {
            warn!("Failed to download {}: {e}", file.path);
            FileOutcome::Failed
        }
    }
}

/// Whether the file at `path` hashes to `expected`; unreadable means no
async fn local_matches(path: &Path, expected: ContentHash) -> bool {
    let path = path.to_path_buf();
    match tokio::task::spawn_blocking(move || ContentHash::from_file(&path)).await {
        Ok(Ok((hash, _))) => hash == expected,
        Ok(Err(e)) => {
            debug!("No usable local copy: {e}");
            false
        }
        Err(e) => {
            warn!("Hash task failed: {e}");
            false
        }
    }
}

async fn report_progress(
    tracker: Arc<Tracker>,
    total: u64,
    every: Duration,
    observer: Arc<dyn ProgressObserver>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        // Read before sampling so the last emission covers every file
        let done = tracker.remaining.load(Ordering::SeqCst) == 0;
        observer.on_event(ProgressEvent::Progress(tracker.fraction(total)));
        if let Some(current) = tracker.current() {
            observer.on_event(ProgressEvent::CurrentFile(current));
        }
        if done {
            break;
        }
    }
}
