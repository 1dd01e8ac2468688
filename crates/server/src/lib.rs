//! patchsync-server: Publish a directory as a patchsync catalog
//!
//! The catalog (summary and listing) is computed once at startup and again
//! whenever the watched tree settles after a change. Files are served
//! straight from the directory.

pub mod catalog;
pub mod http;
pub mod watcher;

use std::sync::Arc;

use color_eyre::Result;
use color_eyre::eyre::WrapErr as _;
use tokio::net::TcpListener;
use tracing::{info, warn};

use patchsync_core::ServerConfig;

pub use catalog::{Catalog, Published};

/// Serve `config.root` on `config.bind` until ctrl-c
pub async fn serve(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind)
        .await
        .wrap_err_with(|| format!("failed to bind {}", config.bind))?;
    serve_on(listener, config, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_on(
    listener: TcpListener,
    config: ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    std::fs::create_dir_all(&config.root)
        .wrap_err_with(|| format!("failed to create {}", config.root.display()))?;

    let catalog = Arc::new(Catalog::new(&config.root, config.persist_dir.clone()));
    let initial = Arc::clone(&catalog);
    tokio::task::spawn_blocking(move || initial.rebuild())
        .await?
        .wrap_err("initial catalog build failed")?;

    let watcher = watcher::spawn(Arc::clone(&catalog), config.debounce())?;

    info!(
        "Serving {} on http://{}",
        config.root.display(),
        listener.local_addr()?
    );
    let result = axum::serve(listener, http::router(catalog))
        .with_graceful_shutdown(shutdown)
        .await;

    watcher.abort();
    result.wrap_err("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
