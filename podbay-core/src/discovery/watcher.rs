//! Filesystem watcher feeding debounced changes to the loader

use std::path::PathBuf;
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc;

use super::error::Result;
use super::loader::PodLoader;

/// Watch the features root and hand debounced change sets to the
/// loader. Returns `None` (with a warning) when the root does not exist
/// yet - there is nothing to watch.
pub(crate) fn spawn(loader: Arc<PodLoader>) -> Result<Option<RecommendedWatcher>> {
    let root = loader.config().features_dir.clone();
    if !root.is_dir() {
        tracing::warn!(dir = %root.display(), "Features directory does not exist; hot reload inactive");
        return Ok(None);
    }

    let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>(100);

    let mut watcher = recommended_watcher(move |event| {
        // this callback runs on the notify thread
        let _ = tx.blocking_send(event);
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::debug!(dir = %root.display(), "Watching features directory");

    tokio::spawn(debounce_loop(loader, rx));
    Ok(Some(watcher))
}

/// Collect change events until a quiet period elapses, then let the
/// loader react once per burst.
async fn debounce_loop(
    loader: Arc<PodLoader>,
    mut rx: mpsc::Receiver<notify::Result<notify::Event>>,
) {
    let debounce = loader.config().debounce();

    loop {
        let first = tokio::select! {
            _ = loader.cancellation().cancelled() => break,
            event = rx.recv() => event,
        };
        let Some(first) = first else { break };
        let mut touched = event_paths(first);

        // drain further events until things go quiet
        loop {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(Some(event)) => touched.extend(event_paths(event)),
                Ok(None) => return,
                Err(_) => break,
            }
        }

        if touched.is_empty() {
            continue;
        }
        loader.handle_fs_change(touched).await;
    }
}

fn event_paths(event: notify::Result<notify::Event>) -> Vec<PathBuf> {
    match event {
        Ok(event) => event.paths,
        Err(e) => {
            tracing::warn!(error = %e, "Watch error");
            Vec::new()
        }
    }
}
