//! patchsync-server: Serve a directory to patchsync clients
//!
//! Exposes `/meta`, `/filesmeta` and `/files/{path}` for the tree under
//! `--root`, rescanning whenever it changes.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use patchsync_core::PatchsyncConfig;
use patchsync_core::config::CONFIG_FILE;

#[derive(Parser)]
#[command(name = "patchsync-server")]
#[command(version)]
#[command(about = "Serve a directory as a patchsync catalog")]
struct Cli {
    /// Config file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Directory to serve
    #[arg(short, long, env = "PATCHSYNC_ROOT")]
    root: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Quiet period before a rescan, in milliseconds
    #[arg(short, long)]
    debounce: Option<u64>,

    /// Also write meta.json and filesmeta.json to this directory
    #[arg(long)]
    persist_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let default = if cli.verbose {
        "debug"
    } else {
        "info,tower_http=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();

    let mut config = PatchsyncConfig::load(&cli.config)?.server;
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(debounce) = cli.debounce {
        config.debounce_ms = debounce;
    }
    if cli.persist_dir.is_some() {
        config.persist_dir = cli.persist_dir;
    }

    patchsync_server::serve(config).await
}
