//! Parallel recursive directory walk that applies ignore rules and streams
//! entry records into the Store in batches.
//!
//! At the root, direct children are enumerated synchronously; each
//! subdirectory found there becomes one unit of work dispatched across a
//! bounded worker pool (`rayon`, as in `Lowband21-ferrex`'s worker-pool
//! usage), and each worker walks its subtree recursively and depth-first.
//! Batching is per-worker and best-effort: a worker flushes whenever its
//! local buffer reaches the configured batch size, and flushes whatever
//! remains when its subtree is exhausted.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::error::{IndexError, IndexResult};
use crate::store::{derive_entry, EntryKind, IgnoreSet, NewEntry, Store};

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub workers: usize,
    pub batch_size: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self { workers: 4, batch_size: 1000 }
    }
}

/// Walks `root`, ignoring anything `ignore` matches, and streams batches
/// of entries into `store`. Returns the number of entries written.
/// An error opening `root` itself aborts and is surfaced to the caller
/// (the Coordinator); per-entry I/O errors below the root are skipped.
/// `on_subtree_done` fires once per direct child subdirectory of `root` as
/// its worker finishes walking it, so a caller can report crawl progress.
pub fn crawl(
    store: &Store,
    root: &Path,
    ignore: &IgnoreSet,
    config: &CrawlConfig,
    on_subtree_done: impl Fn(&Path) + Sync,
) -> IndexResult<usize> {
    let counter = AtomicUsize::new(0);
    let mut local = Vec::with_capacity(config.batch_size);
    let mut subdirs = Vec::new();

    let read_dir = fs::read_dir(root).map_err(IndexError::Io)?;
    for dir_entry in read_dir {
        let Ok(dir_entry) = dir_entry else { continue };
        let path = dir_entry.path();
        let name = dir_entry.file_name().to_string_lossy().into_owned();
        let path_str = path.to_string_lossy().into_owned();
        if ignore.is_ignored(&path_str, &name) {
            continue;
        }
        match derive_entry(&path) {
            Ok(Some(entry)) => {
                let is_dir = entry.kind == EntryKind::Directory;
                local.push(entry);
                if is_dir {
                    subdirs.push(path);
                }
            }
            Ok(None) | Err(_) => continue,
        }
    }
    flush(store, &mut local, &counter)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build()
        .map_err(|e| IndexError::fatal(format!("failed to start crawl worker pool: {e}")))?;

    pool.install(|| {
        subdirs.par_iter().try_for_each(|dir| {
            walk_subtree(store, dir, ignore, config.batch_size, &counter)?;
            on_subtree_done(dir);
            Ok(())
        })
    })?;

    Ok(counter.load(Ordering::Relaxed))
}

fn walk_subtree(
    store: &Store,
    root: &Path,
    ignore: &IgnoreSet,
    batch_size: usize,
    counter: &AtomicUsize,
) -> IndexResult<()> {
    let mut local = Vec::with_capacity(batch_size);
    walk_recursive(store, root, ignore, &mut local, batch_size, counter)?;
    flush(store, &mut local, counter)?;
    Ok(())
}

fn walk_recursive(
    store: &Store,
    dir: &Path,
    ignore: &IgnoreSet,
    local: &mut Vec<NewEntry>,
    batch_size: usize,
    counter: &AtomicUsize,
) -> IndexResult<()> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            log::warn!("skipping unreadable directory {}: {e}", dir.display());
            return Ok(());
        }
    };

    for dir_entry in read_dir {
        let Ok(dir_entry) = dir_entry else { continue };
        let path = dir_entry.path();
        let name = dir_entry.file_name().to_string_lossy().into_owned();
        let path_str = path.to_string_lossy().into_owned();
        if ignore.is_ignored(&path_str, &name) {
            continue;
        }

        let entry = match derive_entry(&path) {
            Ok(Some(entry)) => entry,
            Ok(None) | Err(_) => continue,
        };
        let is_dir = entry.kind == EntryKind::Directory;
        local.push(entry);
        if local.len() >= batch_size {
            flush(store, local, counter)?;
        }
        if is_dir {
            walk_recursive(store, &path, ignore, local, batch_size, counter)?;
        }
    }
    Ok(())
}

fn flush(store: &Store, local: &mut Vec<NewEntry>, counter: &AtomicUsize) -> IndexResult<()> {
    if local.is_empty() {
        return Ok(());
    }
    let drained: Vec<NewEntry> = local.drain(..).collect();
    let n = store.batch_upsert(&drained)?;
    counter.fetch_add(n, Ordering::Relaxed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn crawl_indexes_nested_tree_and_skips_ignored() {
        let scratch = tempdir().unwrap();
        let root = scratch.path();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::create_dir_all(root.join("node_modules")).unwrap();
        fs::write(root.join("a.txt"), b"hi").unwrap();
        fs::write(root.join("sub/b.txt"), b"hi").unwrap();
        fs::write(root.join("sub/deeper/c.txt"), b"hi").unwrap();
        fs::write(root.join("node_modules/skip.txt"), b"hi").unwrap();

        let db_dir = tempdir().unwrap();
        let store = Store::open(db_dir.path().join("index.db")).unwrap();
        let ignore = IgnoreSet::compile(&["node_modules".to_string()]);
        let config = CrawlConfig { workers: 2, batch_size: 2 };

        let written = crawl(&store, root, &ignore, &config, |_| {}).unwrap();
        assert_eq!(written, store.count_entries().unwrap() as usize);

        assert!(store.get_by_path(&root.join("a.txt").to_string_lossy()).unwrap().is_some());
        assert!(store.get_by_path(&root.join("sub/deeper/c.txt").to_string_lossy()).unwrap().is_some());
        assert!(store
            .get_by_path(&root.join("node_modules/skip.txt").to_string_lossy())
            .unwrap()
            .is_none());
    }
}
