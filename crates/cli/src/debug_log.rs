//! Per-session trace log
//!
//! Everything patchsync logs at trace level goes to
//! `<tmp>/patchsync-<session>.log`, while the console only shows info (or
//! debug with `--verbose`) routed around the progress bar.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::Layer as _;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, fmt};

use crate::progress::ProgressWriter;

const FILE_FILTER: &str = "warn,patchsync=trace,patchsync_client=trace,\
                           patchsync_core=trace,patchsync_transport=trace";

/// Keep alive until exit so buffered lines reach the file
pub struct Session {
    pub log_path: PathBuf,
    _guard: WorkerGuard,
}

pub fn init(verbose: bool) -> Session {
    let dir = std::env::temp_dir();
    let file_name = format!("patchsync-{}.log", uuid::Uuid::new_v4());
    let log_path = dir.join(&file_name);

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, &file_name));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(FILE_FILTER)),
        );

    let console_layer = fmt::layer()
        .with_writer(ProgressWriter)
        .with_target(false)
        .with_filter(if verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    Session {
        log_path,
        _guard: guard,
    }
}
