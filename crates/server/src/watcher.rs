//! Debounced directory watching
//!
//! Every directory under the root gets its own non-recursive watch so that
//! directories created later can be picked up and removed ones dropped.
//! A catalog rebuild runs once the tree has been quiet for the debounce delay.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::WrapErr as _;
use ignore::WalkBuilder;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;

/// Start watching the catalog root; the returned task owns the watcher
pub fn spawn(catalog: Arc<Catalog>, delay: Duration) -> Result<JoinHandle<()>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        // The receiver only goes away with the task that owns this watcher
        let _ = tx.send(res);
    })
    .wrap_err("failed to create file watcher")?;

    let watched = watch_tree(&mut watcher, catalog.root());
    if watched == 0 {
        color_eyre::eyre::bail!("could not watch {}", catalog.root().display());
    }
    info!(
        "Watching {} directories under {} ({}ms debounce)",
        watched,
        catalog.root().display(),
        delay.as_millis()
    );

    let ignored = catalog.persist_dir().map(Path::to_path_buf);
    let classify = move |res: notify::Result<Event>| match res {
        Ok(event) => {
            maintain_watches(&mut watcher, &event);
            is_relevant(&event.kind) && !only_under(&event.paths, ignored.as_deref())
        }
        Err(e) => {
            warn!("Watch error: {e}");
            false
        }
    };

    let on_quiet = move || rescan(Arc::clone(&catalog));
    Ok(tokio::spawn(debounce(rx, delay, classify, on_quiet)))
}

/// Run `on_quiet` once no relevant item has arrived for `delay`
///
/// Each relevant item pushes the deadline back; irrelevant ones are dropped.
/// Returns when the sender side closes.
pub async fn debounce<T, C, Q, F>(
    mut rx: UnboundedReceiver<T>,
    delay: Duration,
    mut classify: C,
    mut on_quiet: Q,
) where
    C: FnMut(T) -> bool,
    Q: FnMut() -> F,
    F: Future<Output = ()>,
{
    let mut deadline: Option<Instant> = None;
    loop {
        let item = match deadline {
            Some(at) => tokio::select! {
                item = rx.recv() => item,
                () = sleep_until(at) => {
                    deadline = None;
                    on_quiet().await;
                    continue;
                }
            },
            None => rx.recv().await,
        };

        let Some(item) = item else {
            debug!("Watch channel closed");
            return;
        };
        if classify(item) {
            deadline = Some(Instant::now() + delay);
        }
    }
}

/// Whether an event can change the published catalog
///
/// Rescans read every file, so access events would retrigger forever.
#[must_use]
pub fn is_relevant(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Any => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        EventKind::Access(_) | EventKind::Other => false,
    }
}

fn only_under(paths: &[PathBuf], dir: Option<&Path>) -> bool {
    match dir {
        Some(dir) => !paths.is_empty() && paths.iter().all(|p| p.starts_with(dir)),
        None => false,
    }
}

/// Watch `dir` and every directory below it; returns how many were added
fn watch_tree(watcher: &mut RecommendedWatcher, dir: &Path) -> usize {
    let mut added = 0;
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cannot walk for watching: {e}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_dir()) {
            continue;
        }
        match watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
            Ok(()) => added += 1,
            Err(e) => warn!("Failed to watch {}: {e}", entry.path().display()),
        }
    }
    added
}

fn maintain_watches(watcher: &mut RecommendedWatcher, event: &Event) {
    let appeared = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    let vanished = matches!(
        event.kind,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );

    for path in &event.paths {
        if appeared && path.is_dir() {
            let added = watch_tree(watcher, path);
            debug!("Watching {added} new directories under {}", path.display());
        } else if vanished && !path.exists() {
            // Most backends drop the watch themselves when a directory goes away
            if let Err(e) = watcher.unwatch(path) {
                debug!("Unwatch {}: {e}", path.display());
            }
        }
    }
}

async fn rescan(catalog: Arc<Catalog>) {
    info!("Changes settled, rescanning {}", catalog.root().display());
    match tokio::task::spawn_blocking(move || catalog.rebuild()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!("Rescan failed, keeping previous catalog: {e:#}"),
        Err(e) => error!("Rescan task died: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<Instant>>>, impl FnMut() -> std::future::Ready<()>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let on_quiet = move || {
            sink.lock().push(Instant::now());
            std::future::ready(())
        };
        (fired, on_quiet)
    }

    #[test]
    fn test_relevant_kinds() {
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Remove(RemoveKind::Folder)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        ))));
        assert!(!is_relevant(&EventKind::Access(AccessKind::Read)));
        assert!(!is_relevant(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::AccessTime
        ))));
    }

    #[test]
    fn test_persist_dir_events_are_ignored() {
        let state = Path::new("/srv/state");
        assert!(only_under(&[state.join("meta.json")], Some(state)));
        assert!(!only_under(
            &[state.join("meta.json"), PathBuf::from("/srv/files/a")],
            Some(state)
        ));
        assert!(!only_under(&[state.join("meta.json")], None));
        assert!(!only_under(&[], Some(state)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_rescans_once_after_quiet() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (fired, on_quiet) = recorder();
        let start = Instant::now();
        let task = tokio::spawn(debounce(rx, Duration::from_millis(500), |b| b, on_quiet));

        // Five events 100ms apart; the last lands at t=400ms
        for _ in 0..5 {
            tx.send(true).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        let fired = fired.lock().clone();
        assert_eq!(fired.len(), 1);
        let after = fired[0] - start;
        assert!(after >= Duration::from_millis(900), "{after:?}");
        assert!(after < Duration::from_millis(1000), "{after:?}");

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_irrelevant_events_do_not_arm() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (fired, on_quiet) = recorder();
        tokio::spawn(debounce(rx, Duration::from_millis(500), |b| b, on_quiet));

        for _ in 0..3 {
            tx.send(false).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_rescan_separately() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (fired, on_quiet) = recorder();
        tokio::spawn(debounce(rx, Duration::from_millis(500), |b| b, on_quiet));

        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(fired.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_watcher_picks_up_changes() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        let catalog = Arc::new(Catalog::new(dir.path(), None));
        let before = catalog.rebuild().unwrap().summary;

        let task = spawn(Arc::clone(&catalog), Duration::from_millis(50)).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), "beta").unwrap();

        let mut changed = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let now = catalog.published().unwrap();
            if now.summary != before && now.files == 2 {
                changed = true;
                break;
            }
        }
        task.abort();
        assert!(changed, "catalog never picked up the new files");
    }
}
