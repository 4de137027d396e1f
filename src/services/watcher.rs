//! Debounced filesystem watching for the mods root.
//!
//! `notify` callbacks feed a bounded channel; a single coalescing task waits for a
//! quiet window after the first relevant event and then runs one re-scan for the
//! whole burst. Changes under `.git` never trigger a re-scan.

use crate::error::{ModError, ModResult};
use crate::models::WatchConfig;
use camino::Utf8Path;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const EVENT_BUFFER: usize = 256;

fn is_git_internal(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == ".git")
}

/// Paths from `event` that should trigger a re-scan
pub fn relevant_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Access(_) => Vec::new(),
        _ => event
            .paths
            .iter()
            .filter(|path| !is_git_internal(path))
            .cloned()
            .collect(),
    }
}

/// Coalesce `events` into batches separated by at least `quiet` of silence and hand
/// each batch to `on_batch`. Returns the number of batches delivered once the stop
/// signal fires or the event source closes.
pub async fn debounce_events<F, Fut>(
    mut events: mpsc::Receiver<Event>,
    quiet: Duration,
    mut stop: watch::Receiver<bool>,
    mut on_batch: F,
) -> usize
where
    F: FnMut(Vec<PathBuf>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut delivered = 0;

    loop {
        if *stop.borrow() {
            break;
        }

        let first = tokio::select! {
            _ = stop.changed() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let mut batch = relevant_paths(&first);
        let mut closed = false;
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    closed = true;
                    break;
                }
                next = tokio::time::timeout(quiet, events.recv()) => match next {
                    Ok(Some(event)) => batch.extend(relevant_paths(&event)),
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                },
            }
        }

        if !batch.is_empty() {
            batch.sort();
            batch.dedup();
            tracing::debug!("Filesystem burst settled with {} changed paths", batch.len());
            on_batch(batch).await;
            delivered += 1;
        }

        if closed {
            break;
        }
    }

    delivered
}

/// A running watcher. Dropping it without [`ModWatcher::stop`] also stops the
/// notify backend, but the coalescing task only ends once its channel drains.
pub struct ModWatcher {
    _watcher: RecommendedWatcher,
    stop: watch::Sender<bool>,
    task: JoinHandle<usize>,
}

impl ModWatcher {
    /// Watch `root` recursively, calling `on_batch` once per settled burst.
    pub fn start<F, Fut>(root: &Utf8Path, config: WatchConfig, on_batch: F) -> ModResult<Self>
    where
        F: FnMut(Vec<PathBuf>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // A full buffer already guarantees a pending re-scan.
                let _ = tx.try_send(event);
            }
            Err(e) => tracing::warn!("Watch error: {}", e),
        })
        .map_err(|e| ModError::fs("create watcher for", root, std::io::Error::other(e)))?;

        watcher
            .watch(root.as_std_path(), RecursiveMode::Recursive)
            .map_err(|e| ModError::fs("watch", root, std::io::Error::other(e)))?;

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(debounce_events(rx, config.debounce, stop_rx, on_batch));

        tracing::info!(
            "Watching {} (quiet window {:?})",
            root,
            config.debounce
        );
        Ok(Self {
            _watcher: watcher,
            stop,
            task,
        })
    }

    /// Signal the coalescing task and wait for it, returning how many re-scans ran.
    pub async fn stop(self) -> usize {
        let _ = self.stop.send(true);
        match self.task.await {
            Ok(batches) => {
                tracing::info!("Watcher stopped after {} re-scans", batches);
                batches
            }
            Err(e) => {
                tracing::error!("Watcher task failed: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_relevant_paths_skip_git_and_access() {
        let create = event(EventKind::Create(CreateKind::File), "/mods/A.package");
        assert_eq!(relevant_paths(&create), vec![PathBuf::from("/mods/A.package")]);

        let git = event(EventKind::Modify(ModifyKind::Any), "/mods/.git/index");
        assert!(relevant_paths(&git).is_empty());

        let access = event(EventKind::Access(AccessKind::Any), "/mods/A.package");
        assert!(relevant_paths(&access).is_empty());
    }

    #[tokio::test]
    async fn test_burst_is_coalesced_into_one_batch() {
        let (tx, rx) = mpsc::channel(16);
        let (stop, stop_rx) = watch::channel(false);
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let task = tokio::spawn(debounce_events(
            rx,
            Duration::from_millis(50),
            stop_rx,
            move |paths| {
                counter.fetch_add(paths.len(), Ordering::SeqCst);
                async {}
            },
        ));

        for name in ["/mods/A.package", "/mods/B.package", "/mods/A.package"] {
            tx.send(event(EventKind::Create(CreateKind::File), name))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(250)).await;

        tx.send(event(EventKind::Modify(ModifyKind::Any), "/mods/C.package"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        stop.send(true).unwrap();
        assert_eq!(task.await.unwrap(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_git_only_bursts_do_not_rescan() {
        let (tx, rx) = mpsc::channel(16);
        let (_stop, stop_rx) = watch::channel(false);

        let task = tokio::spawn(debounce_events(
            rx,
            Duration::from_millis(20),
            stop_rx,
            |_| async {},
        ));
        tx.send(event(EventKind::Modify(ModifyKind::Any), "/mods/.git/HEAD"))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(task.await.unwrap(), 0);
    }
}
