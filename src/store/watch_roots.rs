//! WatchRoot registration, status transitions, and removal.
//!
//! Removal matches entries under a root by exact equality or by a prefix
//! followed by a path separator, never a bare string prefix — a raw
//! `LIKE 'root%'` would also sweep up unrelated siblings whose name happens
//! to start with the same characters (`/data/foo` vs. `/data/foobar`).

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, OptionalExtension};

use super::Store;
use crate::error::{IndexError, IndexResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchRootStatus {
    Idle,
    Scanning,
    Watching,
    Error,
}

impl WatchRootStatus {
    fn as_str(self) -> &'static str {
        match self {
            WatchRootStatus::Idle => "idle",
            WatchRootStatus::Scanning => "scanning",
            WatchRootStatus::Watching => "watching",
            WatchRootStatus::Error => "error",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "scanning" => WatchRootStatus::Scanning,
            "watching" => WatchRootStatus::Watching,
            "error" => WatchRootStatus::Error,
            _ => WatchRootStatus::Idle,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WatchRoot {
    pub id: i64,
    pub path: String,
    pub enabled: bool,
    pub status: WatchRootStatus,
    pub total_files: i64,
    pub indexed_files: i64,
    pub last_full_scan: Option<f64>,
    pub last_updated: Option<f64>,
    pub error_message: Option<String>,
}

fn now_unix() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

/// Escapes `%`, `_` and the escape character itself for safe use inside a
/// `LIKE ... ESCAPE '\'` pattern.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

impl Store {
    /// Registers `path` as a watch root if not already present; returns
    /// the (possibly pre-existing) row either way.
    pub fn register_root(&self, path: &str) -> IndexResult<WatchRoot> {
        self.with_write(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO watch_roots (path, enabled, status) VALUES (?1, 1, 'idle')",
                params![path],
            )
            .map_err(IndexError::from_write)?;
            fetch_by_path(conn, path)?.ok_or_else(|| {
                IndexError::Database(rusqlite::Error::QueryReturnedNoRows)
            })
        })
    }

    pub fn get_root_by_path(&self, path: &str) -> IndexResult<Option<WatchRoot>> {
        self.with_read(|conn| fetch_by_path(conn, path))
    }

    pub fn list_roots(&self) -> IndexResult<Vec<WatchRoot>> {
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT id, path, enabled, status, total_files, indexed_files,
                            last_full_scan, last_updated, error_message
                     FROM watch_roots ORDER BY path",
                )
                .map_err(IndexError::from)?;
            let rows = stmt
                .query_map([], row_to_watch_root)
                .map_err(IndexError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(IndexError::from)?;
            Ok(rows)
        })
    }

    /// Returns the registered root (if any) that covers `path`: `path`
    /// equals the root, or lies under it. Used by the Coordinator's
    /// add-path check and correctly handles component boundaries via
    /// `Path::starts_with`, unlike a naive string-prefix test.
    pub fn covering_root(&self, path: &Path) -> IndexResult<Option<WatchRoot>> {
        let roots = self.list_roots()?;
        for root in roots {
            let root_path = PathBuf::from(&root.path);
            if path == root_path || path.starts_with(&root_path) {
                return Ok(Some(root));
            }
        }
        Ok(None)
    }

    pub fn set_root_status(
        &self,
        path: &str,
        status: WatchRootStatus,
        error_message: Option<&str>,
    ) -> IndexResult<()> {
        self.with_write(|conn| {
            conn.execute(
                "UPDATE watch_roots SET status = ?1, error_message = ?2, last_updated = ?3 WHERE path = ?4",
                params![status.as_str(), error_message, now_unix(), path],
            )
            .map_err(IndexError::from_write)?;
            Ok(())
        })
    }

    pub fn update_root_stats(&self, path: &str, total_files: i64, indexed_files: i64) -> IndexResult<()> {
        self.with_write(|conn| {
            conn.execute(
                "UPDATE watch_roots SET total_files = ?1, indexed_files = ?2,
                    last_full_scan = ?3, last_updated = ?3 WHERE path = ?4",
                params![total_files, indexed_files, now_unix(), path],
            )
            .map_err(IndexError::from_write)?;
            Ok(())
        })
    }

    /// Deletes every Entry under `root` (matching by equality or by a
    /// path-separator-anchored prefix, never a bare string prefix) and
    /// then the WatchRoot row itself, in the same commit. The admin
    /// remove-path operation.
    pub fn remove_root(&self, path: &str) -> IndexResult<()> {
        self.with_write(|conn| {
            let tx = conn.unchecked_transaction().map_err(IndexError::from_write)?;
            delete_entries_under(&tx, path)?;
            tx.execute("DELETE FROM watch_roots WHERE path = ?1", params![path])
                .map_err(IndexError::from_write)?;
            tx.commit().map_err(IndexError::from_write)
        })
    }

    /// Clears every Entry under `root` but keeps the WatchRoot row itself —
    /// the rescan step of the startup and rebuild sequences, which re-crawl
    /// into the same registered root rather than re-registering it.
    pub fn reset_root_entries(&self, path: &str) -> IndexResult<()> {
        self.with_write(|conn| {
            let tx = conn.unchecked_transaction().map_err(IndexError::from_write)?;
            delete_entries_under(&tx, path)?;
            tx.commit().map_err(IndexError::from_write)
        })
    }
}

fn delete_entries_under(tx: &rusqlite::Transaction<'_>, path: &str) -> IndexResult<()> {
    let separator = std::path::MAIN_SEPARATOR;
    let prefix_pattern = format!("{}{}%", escape_like(path), separator);
    tx.execute(
        "DELETE FROM entries WHERE path = ?1 OR path LIKE ?2 ESCAPE '\\'",
        params![path, prefix_pattern],
    )
    .map_err(IndexError::from_write)?;
    Ok(())
}

fn fetch_by_path(conn: &rusqlite::Connection, path: &str) -> IndexResult<Option<WatchRoot>> {
    conn.query_row(
        "SELECT id, path, enabled, status, total_files, indexed_files,
                last_full_scan, last_updated, error_message
         FROM watch_roots WHERE path = ?1",
        params![path],
        row_to_watch_root,
    )
    .optional()
    .map_err(IndexError::from)
}

fn row_to_watch_root(row: &rusqlite::Row<'_>) -> rusqlite::Result<WatchRoot> {
    let status_str: String = row.get(3)?;
    Ok(WatchRoot {
        id: row.get(0)?,
        path: row.get(1)?,
        enabled: row.get::<_, i64>(2)? != 0,
        status: WatchRootStatus::parse(&status_str),
        total_files: row.get(4)?,
        indexed_files: row.get(5)?,
        last_full_scan: row.get(6)?,
        last_updated: row.get(7)?,
        error_message: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::{EntryKind, NewEntry};
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn remove_root_does_not_delete_prefix_siblings() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("index.db")).unwrap();
        store.register_root("/data/foo").unwrap();
        store
            .batch_upsert(&[
                NewEntry {
                    path: "/data/foo/a.txt".into(),
                    name: "a.txt".into(),
                    parent_path: "/data/foo".into(),
                    kind: EntryKind::File,
                    extension: Some("txt".into()),
                    size: 1,
                    mtime: 1.0,
                },
                NewEntry {
                    path: "/data/foobar/b.txt".into(),
                    name: "b.txt".into(),
                    parent_path: "/data/foobar".into(),
                    kind: EntryKind::File,
                    extension: Some("txt".into()),
                    size: 1,
                    mtime: 1.0,
                },
            ])
            .unwrap();

        store.remove_root("/data/foo").unwrap();

        assert!(store.get_by_path("/data/foo/a.txt").unwrap().is_none());
        assert!(store.get_by_path("/data/foobar/b.txt").unwrap().is_some());
        assert!(store.get_root_by_path("/data/foo").unwrap().is_none());
    }

    #[test]
    fn covering_root_matches_ancestor_and_equal() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("index.db")).unwrap();
        store.register_root("/data/foo").unwrap();

        assert!(store.covering_root(Path::new("/data/foo")).unwrap().is_some());
        assert!(store.covering_root(Path::new("/data/foo/sub")).unwrap().is_some());
        assert!(store.covering_root(Path::new("/data/foobar")).unwrap().is_none());
    }
}
