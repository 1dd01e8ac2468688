//! patchsync: Keep a local directory in step with a patch server
//!
//! - MD5 fingerprints per file plus an aggregate for the whole tree
//! - One cheap summary request decides whether anything needs fetching
//! - Only files whose hash differs are downloaded, up to 10 at a time

mod debug_log;
mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand, ValueEnum, builder::Styles};
use color_eyre::Result;
use tracing::{debug, info};

use patchsync_client::{CycleOutcome, SyncOrchestrator};
use patchsync_core::config::CONFIG_FILE;
use patchsync_core::{ClientConfig, PatchsyncConfig, Scanner};
use patchsync_transport::{HttpRemote, LocalRemote, Remote};

use crate::progress::TerminalProgress;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser)]
#[command(name = "patchsync")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "Download only the files that changed on a patch server")]
#[command(long_about = r#"
patchsync keeps a local directory identical to the tree published by a
patchsync-server.

Examples:
  patchsync sync --backend http://patches:3000 --root ./game   One sync cycle
  patchsync sync --backend /mnt/share/build --root ./game      Sync from a directory
  patchsync scan ./game                                        Fingerprint a directory
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle against the backend
    Sync {
        /// Config file
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,

        /// Server URL, or a directory to sync from
        #[arg(short, long, env = "PATCHSYNC_BACKEND")]
        backend: Option<String>,

        /// Local directory to keep in sync
        #[arg(short, long, env = "PATCHSYNC_ROOT")]
        root: Option<PathBuf>,
    },

    /// Scan a directory and print its fingerprint
    Scan {
        /// Directory to scan
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Summary)]
        format: Format,
    },

    /// Show version and build info
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Summary,
    Json,
}

/// Where a sync cycle pulls from
#[derive(Debug, PartialEq, Eq)]
enum Backend {
    Http(String),
    Local(PathBuf),
}

impl Backend {
    fn parse(backend: &str) -> Self {
        if backend.starts_with("http://") || backend.starts_with("https://") {
            Self::Http(backend.to_string())
        } else {
            let path = backend.strip_prefix("file://").unwrap_or(backend);
            Self::Local(PathBuf::from(path))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            eprintln!("patchsync {}", env!("CARGO_PKG_VERSION"));
            eprintln!("Built with Rust {}", env!("CARGO_PKG_RUST_VERSION"));
        }
        Commands::Scan { path, format } => {
            init_console_logging(cli.verbose);
            scan_command(&path, format)?;
        }
        Commands::Sync {
            config,
            backend,
            root,
        } => {
            let session = debug_log::init(cli.verbose);
            debug!("Debug log at {}", session.log_path.display());
            sync_command(&config, backend, root).await?;
        }
    }

    Ok(())
}

fn init_console_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn scan_command(path: &Path, format: Format) -> Result<()> {
    info!("Scanning {}...", path.display());
    let snapshot = Scanner::new(path).scan()?;
    let summary = snapshot.summary();

    match format {
        Format::Json => {
            let json = serde_json::json!({
                "meta": summary,
                "filesmeta": snapshot.listing(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Format::Summary => {
            eprintln!("Files: {}", snapshot.len());
            eprintln!(
                "Total size: {} ({} bytes)",
                humansize::format_size(summary.total_size, humansize::BINARY),
                summary.total_size
            );
            eprintln!("Hash: {}", summary.hash);

            if snapshot.len() <= 20 {
                eprintln!("\nFiles:");
                for file in &snapshot.files {
                    eprintln!("  {} {} ({} bytes)", file.hash, file.path, file.size);
                }
            }
        }
    }

    Ok(())
}

async fn sync_command(
    config_path: &Path,
    backend: Option<String>,
    root: Option<PathBuf>,
) -> Result<()> {
    let mut config = PatchsyncConfig::load(config_path)?.client;
    if let Some(backend) = backend {
        config.backend = backend;
    }
    if let Some(root) = root {
        config.root = root;
    }
    std::fs::create_dir_all(&config.root)?;

    info!(
        "Syncing {} from {}",
        config.root.display(),
        config.backend
    );
    match Backend::parse(&config.backend) {
        Backend::Http(url) => {
            let remote = HttpRemote::new(&url)?;
            run_cycle(config, remote).await
        }
        Backend::Local(dir) => run_cycle(config, LocalRemote::new(dir)).await,
    }
}

async fn run_cycle<R: Remote>(config: ClientConfig, remote: R) -> Result<()> {
    let progress = Arc::new(TerminalProgress::new(config.backend.clone()));
    let mut sync = SyncOrchestrator::new(config, remote, progress.clone());

    if let CycleOutcome::Synced(report) = sync.run_cycle().await? {
        progress.finish(&report);
    }
    Ok(())
}
