//! Debounced filesystem watch. One recursive `notify` watch per WatchRoot;
//! incoming events are filtered against the ignore predicate, coalesced
//! into a `path -> (kind, timestamp)` pending map under a single debounce
//! window, and applied to the Store in one batch when the window elapses.
//!
//! The debounce timer itself is modeled as a background thread blocked on
//! `recv_timeout`: every new event restarts the wait (mirroring a
//! cancel-and-reset `Timer`), and a timeout drains and applies whatever is
//! pending.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher as NotifyWatcherTrait};
use parking_lot::Mutex;

use crate::error::{IndexError, IndexResult};
use crate::store::{derive_entry, EntryKind, Store};

#[derive(Clone, Copy, Debug)]
enum PendingKind {
    Created,
    Modified,
    Deleted,
}

struct PendingEvent {
    kind: PendingKind,
}

enum Signal {
    Event,
    Flush,
    Shutdown,
}

pub struct Watcher {
    watcher: notify::RecommendedWatcher,
    pending: Arc<Mutex<HashMap<PathBuf, PendingEvent>>>,
    signal_tx: Sender<Signal>,
    done_rx: mpsc::Receiver<()>,
    debounce_thread: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Starts watching `roots` recursively, debouncing with `debounce_ms`.
    pub fn start(store: Arc<Store>, roots: &[PathBuf], debounce_ms: u64) -> IndexResult<Self> {
        let pending: Arc<Mutex<HashMap<PathBuf, PendingEvent>>> = Arc::new(Mutex::new(HashMap::new()));
        let (signal_tx, signal_rx) = mpsc::channel::<Signal>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let pending_for_cb = pending.clone();
        let signal_tx_for_cb = signal_tx.clone();
        let store_for_cb = store.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("filesystem watch backend error: {e}");
                    return;
                }
            };
            for (path, kind) in classify(&event) {
                let path_str = path.to_string_lossy().into_owned();
                match store_for_cb.is_ignored(&path_str) {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => log::warn!("ignore check failed for {path_str}: {e}"),
                }
                pending_for_cb.lock().insert(path, PendingEvent { kind });
            }
            let _ = signal_tx_for_cb.send(Signal::Event);
        })
        .map_err(IndexError::from)?;

        for root in roots {
            watcher.watch(root, RecursiveMode::Recursive).map_err(IndexError::from)?;
        }

        let store_for_thread = store;
        let pending_for_thread = pending.clone();
        let debounce_thread = thread::spawn(move || loop {
            match signal_rx.recv_timeout(Duration::from_millis(debounce_ms)) {
                Ok(Signal::Event) => continue,
                Ok(Signal::Flush) => drain_and_apply(&store_for_thread, &pending_for_thread),
                Ok(Signal::Shutdown) => {
                    drain_and_apply(&store_for_thread, &pending_for_thread);
                    let _ = done_tx.send(());
                    break;
                }
                Err(RecvTimeoutError::Timeout) => drain_and_apply(&store_for_thread, &pending_for_thread),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Ok(Self { watcher, pending, signal_tx, done_rx, debounce_thread: Some(debounce_thread) })
    }

    /// Adds one more recursive watch to the already-running watcher —
    /// the admin add-path path.
    pub fn watch_path(&mut self, path: &Path) -> IndexResult<()> {
        self.watcher.watch(path, RecursiveMode::Recursive).map_err(IndexError::from)
    }

    pub fn unwatch_path(&mut self, path: &Path) -> IndexResult<()> {
        self.watcher.unwatch(path).map_err(IndexError::from)
    }

    /// Cancels the debounce timer and drains pending events immediately.
    /// Used at shutdown and at admin-operation boundaries.
    pub fn flush(&self) {
        let _ = self.signal_tx.send(Signal::Flush);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Signals the debounce thread to drain and stop, joining it with a
    /// 5-second bound; past that the thread is abandoned rather than
    /// blocking shutdown indefinitely.
    pub fn stop(mut self) {
        let _ = self.signal_tx.send(Signal::Shutdown);
        match self.done_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(()) => {
                if let Some(handle) = self.debounce_thread.take() {
                    let _ = handle.join();
                }
            }
            Err(_) => {
                log::warn!("watcher debounce thread did not stop within 5s; abandoning");
            }
        }
    }
}

fn classify(event: &Event) -> Vec<(PathBuf, PendingKind)> {
    match &event.kind {
        EventKind::Create(_) => event.paths.iter().cloned().map(|p| (p, PendingKind::Created)).collect(),
        EventKind::Remove(_) => event.paths.iter().cloned().map(|p| (p, PendingKind::Deleted)).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            vec![(event.paths[0].clone(), PendingKind::Deleted), (event.paths[1].clone(), PendingKind::Created)]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().cloned().map(|p| (p, PendingKind::Deleted)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().cloned().map(|p| (p, PendingKind::Created)).collect()
        }
        EventKind::Modify(_) => event.paths.iter().cloned().map(|p| (p, PendingKind::Modified)).collect(),
        _ => Vec::new(),
    }
}

fn drain_and_apply(store: &Store, pending: &Mutex<HashMap<PathBuf, PendingEvent>>) {
    let drained: Vec<(PathBuf, PendingEvent)> = pending.lock().drain().collect();
    if drained.is_empty() {
        return;
    }
    for (path, event) in drained {
        if let Err(e) = apply_event(store, &path, event.kind) {
            log::warn!("failed to apply watch event for {}: {e}", path.display());
        }
    }
}

fn apply_event(store: &Store, path: &Path, kind: PendingKind) -> IndexResult<()> {
    match kind {
        PendingKind::Deleted => {
            store.remove_by_path(&path.to_string_lossy())?;
        }
        PendingKind::Created | PendingKind::Modified => match derive_entry(path)? {
            Some(entry) => {
                // A directory's own `modified` events are dropped — the
                // content changes they report are covered by the child
                // entries' own create/delete/modify events.
                let is_directory_modify = matches!(kind, PendingKind::Modified) && entry.kind == EntryKind::Directory;
                if !is_directory_modify {
                    store.upsert_entry(&entry)?;
                }
            }
            None => {} // race lost against a concurrent delete; nothing to do
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn watcher_applies_delete_after_debounce() {
        let scratch = tempdir().unwrap();
        let db_dir = tempdir().unwrap();
        let store = Arc::new(Store::open(db_dir.path().join("index.db")).unwrap());

        let file_path = scratch.path().join("a.txt");
        fs::write(&file_path, b"hi").unwrap();
        let entry = derive_entry(&file_path).unwrap().unwrap();
        store.upsert_entry(&entry).unwrap();
        assert!(store.get_by_path(&file_path.to_string_lossy()).unwrap().is_some());

        let watcher = Watcher::start(store.clone(), &[scratch.path().to_path_buf()], 50).unwrap();
        fs::remove_file(&file_path).unwrap();

        // Give the notify backend + debounce window time to fire.
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while std::time::Instant::now() < deadline {
            if store.get_by_path(&file_path.to_string_lossy()).unwrap().is_none() {
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }

        assert!(store.get_by_path(&file_path.to_string_lossy()).unwrap().is_none());
        watcher.stop();
    }
}
