//! patchsync-core: Core sync model
//!
//! Provides content fingerprints, tree scanning, snapshots, the local sync
//! record, and configuration shared by the client and the catalog server.

pub mod config;
pub mod hash;
pub mod record;
pub mod scan;
pub mod snapshot;

pub use config::{ClientConfig, PatchsyncConfig, ServerConfig};
pub use hash::ContentHash;
pub use record::LocalSyncRecord;
pub use scan::Scanner;
pub use snapshot::{FileFingerprint, FileListing, Snapshot, SnapshotSummary};
