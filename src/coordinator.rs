//! Coordinator: the orchestration layer wiring Store, Crawler and Watcher
//! into the startup sequence and the admin operations (add-path,
//! remove-path, rebuild, status), grounded in `original_source/main.py`'s
//! startup routine and `routers/admin.py`'s handlers.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::crawler::{crawl, CrawlConfig};
use crate::error::{IndexError, IndexResult};
use crate::store::{IgnoreSet, Store, WatchRoot, WatchRootStatus};
use crate::watcher::Watcher;

pub struct Coordinator {
    store: Arc<Store>,
    config: Config,
    watcher: Mutex<Option<Watcher>>,
}

pub enum AddPathOutcome {
    Registered(WatchRoot),
    AlreadyIndexed(WatchRoot),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CoordinatorStatus {
    pub ready: bool,
    pub roots: Vec<WatchRoot>,
}

impl Coordinator {
    pub fn new(config: Config) -> IndexResult<Self> {
        let store = Arc::new(Store::open(&config.index_db_path)?);
        Ok(Self { store, config, watcher: Mutex::new(None) })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Startup sequence: ensure n-gram indexes are populated, seed
    /// configured ignore patterns and watch roots, scan every idle root,
    /// rebuild the global n-gram indexes once, then start watching.
    pub fn startup(&self) -> IndexResult<()> {
        self.store.ensure_trigram_index_populated()?;
        self.store.ensure_bigram_index_populated()?;

        for pattern in &self.config.ignore_patterns {
            self.store.add_ignore_pattern(pattern)?;
        }
        for root in &self.config.watch_paths {
            self.store.register_root(&root.to_string_lossy())?;
        }

        let idle_roots: Vec<String> = self
            .store
            .list_roots()?
            .into_iter()
            .filter(|r| r.status == WatchRootStatus::Idle)
            .map(|r| r.path)
            .collect();

        for root_path in idle_roots {
            if let Err(e) = self.scan_registered_root(&root_path, &[]) {
                log::warn!("initial scan of {root_path} failed: {e}");
            }
        }

        self.store.rebuild_trigram_index()?;
        self.store.rebuild_bigram_index()?;

        self.start_watcher_over_all_roots()
    }

    fn start_watcher_over_all_roots(&self) -> IndexResult<()> {
        let roots: Vec<PathBuf> =
            self.store.list_roots()?.into_iter().map(|r| PathBuf::from(r.path)).collect();
        if roots.is_empty() {
            return Ok(());
        }
        let watcher = Watcher::start(self.store.clone(), &roots, self.config.debounce_ms)?;
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    /// Runs the scanning -> watching sequence on an already-registered root:
    /// clear its prior entries, crawl it fresh with the merged ignore set,
    /// update its file counters, and flip its status. Status ends at
    /// `Watching` on success or `Error` (with a truncated message) on
    /// failure; either way the error, if any, is also returned to the
    /// caller.
    fn scan_registered_root(&self, root_path: &str, extra_ignore_patterns: &[String]) -> IndexResult<()> {
        self.store.set_root_status(root_path, WatchRootStatus::Scanning, None)?;

        let outcome = (|| -> IndexResult<()> {
            self.store.reset_root_entries(root_path)?;

            let merged = self.merged_ignore_patterns(extra_ignore_patterns)?;
            let ignore_set = IgnoreSet::compile(&merged);
            let crawl_config =
                CrawlConfig { workers: self.config.scan_workers, batch_size: self.config.batch_size };
            let written = crawl(&self.store, Path::new(root_path), &ignore_set, &crawl_config, |dir| {
                log::debug!("crawl: finished subtree {}", dir.display());
            })?;

            self.store.update_root_stats(root_path, written as i64, written as i64)
        })();

        match &outcome {
            Ok(()) => self.store.set_root_status(root_path, WatchRootStatus::Watching, None)?,
            Err(e) => {
                let message = truncate(&e.to_string(), 500);
                self.store.set_root_status(root_path, WatchRootStatus::Error, Some(&message))?;
            }
        }
        outcome
    }

    fn merged_ignore_patterns(&self, extra: &[String]) -> IndexResult<Vec<String>> {
        let mut set: BTreeSet<String> = self.store.list_ignore_patterns()?.into_iter().collect();
        set.extend(self.config.ignore_patterns.iter().cloned());
        set.extend(extra.iter().cloned());
        Ok(set.into_iter().collect())
    }

    /// Admin add-path: rejects a path that doesn't exist or isn't a
    /// directory, and a path already covered by a registered root, then
    /// registers, scans and starts (or extends) the watch.
    pub fn add_path(&self, path: &Path) -> IndexResult<AddPathOutcome> {
        let metadata =
            std::fs::metadata(path).map_err(|_| IndexError::not_found(path.display().to_string()))?;
        if !metadata.is_dir() {
            return Err(IndexError::not_found(format!("{} is not a directory", path.display())));
        }
        if let Some(existing) = self.store.covering_root(path)? {
            return Ok(AddPathOutcome::AlreadyIndexed(existing));
        }

        let path_str = path.to_string_lossy().into_owned();
        self.store.register_root(&path_str)?;
        self.scan_registered_root(&path_str, &[])?;
        self.watch_or_start(path)?;

        let root = self
            .store
            .get_root_by_path(&path_str)?
            .ok_or_else(|| IndexError::fatal("watch root vanished immediately after registration"))?;
        Ok(AddPathOutcome::Registered(root))
    }

    fn watch_or_start(&self, path: &Path) -> IndexResult<()> {
        let mut guard = self.watcher.lock();
        match guard.as_mut() {
            Some(watcher) => watcher.watch_path(path),
            None => {
                let watcher = Watcher::start(self.store.clone(), &[path.to_path_buf()], self.config.debounce_ms)?;
                *guard = Some(watcher);
                Ok(())
            }
        }
    }

    /// Admin remove-path: stops watching `path` if it's currently watched,
    /// then unconditionally delegates to the Store (a no-op if `path` was
    /// never a registered root).
    pub fn remove_path(&self, path: &str) -> IndexResult<()> {
        if let Some(watcher) = self.watcher.lock().as_mut() {
            let _ = watcher.unwatch_path(Path::new(path));
        }
        self.store.remove_root(path)
    }

    /// Admin rebuild: re-scans one root (`target`) or every registered
    /// root, merging `extra_ignore_patterns` into the ignore set used for
    /// this run, then rebuilds the global n-gram indexes once at the end.
    pub fn rebuild(&self, target: Option<&str>, extra_ignore_patterns: &[String]) -> IndexResult<()> {
        let targets: Vec<String> = match target {
            Some(p) => vec![p.to_string()],
            None => self.store.list_roots()?.into_iter().map(|r| r.path).collect(),
        };

        let mut first_error = None;
        for root_path in targets {
            if let Err(e) = self.scan_registered_root(&root_path, extra_ignore_patterns) {
                log::warn!("rebuild of {root_path} failed: {e}");
                first_error.get_or_insert(e);
            }
        }

        self.store.rebuild_trigram_index()?;
        self.store.rebuild_bigram_index()?;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Ready iff at least one root is watching and none is currently
    /// scanning.
    pub fn status(&self) -> IndexResult<CoordinatorStatus> {
        let roots = self.store.list_roots()?;
        let ready = roots.iter().any(|r| r.status == WatchRootStatus::Watching)
            && !roots.iter().any(|r| r.status == WatchRootStatus::Scanning);
        Ok(CoordinatorStatus { ready, roots })
    }

    /// Flushes and stops the watcher, if running. Consumes `self` since a
    /// stopped Coordinator has no further use.
    pub fn shutdown(self) {
        if let Some(watcher) = self.watcher.into_inner() {
            watcher.flush();
            watcher.stop();
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn test_config(db_path: PathBuf, watch_paths: Vec<PathBuf>) -> Config {
        Config {
            index_db_path: db_path,
            watch_paths,
            ignore_patterns: vec!["node_modules".to_string()],
            ..Config::default()
        }
    }

    #[test]
    fn startup_indexes_configured_roots_and_reports_ready() {
        let scratch = tempdir().unwrap();
        fs::write(scratch.path().join("a.txt"), b"hi").unwrap();
        fs::create_dir_all(scratch.path().join("node_modules")).unwrap();
        fs::write(scratch.path().join("node_modules/skip.txt"), b"hi").unwrap();

        let db_dir = tempdir().unwrap();
        let config = test_config(db_dir.path().join("index.db"), vec![scratch.path().to_path_buf()]);
        let coordinator = Coordinator::new(config).unwrap();
        coordinator.startup().unwrap();

        let status = coordinator.status().unwrap();
        assert!(status.ready);
        assert_eq!(status.roots.len(), 1);
        assert_eq!(status.roots[0].status, WatchRootStatus::Watching);

        assert!(coordinator
            .store()
            .get_by_path(&scratch.path().join("a.txt").to_string_lossy())
            .unwrap()
            .is_some());
        assert!(coordinator
            .store()
            .get_by_path(&scratch.path().join("node_modules/skip.txt").to_string_lossy())
            .unwrap()
            .is_none());

        coordinator.shutdown();
    }

    #[test]
    fn add_path_rejects_a_root_already_covered() {
        let scratch = tempdir().unwrap();
        fs::create_dir_all(scratch.path().join("sub")).unwrap();

        let db_dir = tempdir().unwrap();
        let config = test_config(db_dir.path().join("index.db"), vec![scratch.path().to_path_buf()]);
        let coordinator = Coordinator::new(config).unwrap();
        coordinator.startup().unwrap();

        let outcome = coordinator.add_path(&scratch.path().join("sub")).unwrap();
        assert!(matches!(outcome, AddPathOutcome::AlreadyIndexed(_)));

        coordinator.shutdown();
    }

    #[test]
    fn remove_path_drops_its_entries() {
        let scratch = tempdir().unwrap();
        fs::write(scratch.path().join("a.txt"), b"hi").unwrap();

        let db_dir = tempdir().unwrap();
        let config = test_config(db_dir.path().join("index.db"), vec![scratch.path().to_path_buf()]);
        let coordinator = Coordinator::new(config).unwrap();
        coordinator.startup().unwrap();

        let root_path = scratch.path().to_string_lossy().into_owned();
        coordinator.remove_path(&root_path).unwrap();

        assert!(coordinator.store().get_root_by_path(&root_path).unwrap().is_none());
        assert!(coordinator
            .store()
            .get_by_path(&scratch.path().join("a.txt").to_string_lossy())
            .unwrap()
            .is_none());

        coordinator.shutdown();
    }
}
