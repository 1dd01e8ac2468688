//! patchsync-client: Keep a local tree in step with a remote catalog
//!
//! [`SyncOrchestrator::run_cycle`] is the entry point: it decides whether the
//! local tree is current and, if not, fetches the files that differ while
//! reporting progress to a [`ProgressObserver`].

pub mod orchestrator;
pub mod progress;

pub use orchestrator::{CycleOutcome, SyncOrchestrator, SyncReport, SyncState};
pub use progress::{CurrentFile, NoopObserver, ProgressEvent, ProgressObserver, SyncStatus};
