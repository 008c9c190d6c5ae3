//! Entry CRUD and batch insert. `derive_entry` is the single place that
//! turns a filesystem stat into the record both Crawler and Watcher write,
//! so the two paths can never disagree on shape.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, OptionalExtension};

use super::ngrams::extract_bigrams;
use super::Store;
use crate::error::{IndexError, IndexResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "directory" {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Entry {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub parent_path: String,
    pub kind: EntryKind,
    pub extension: Option<String>,
    pub size: i64,
    pub mtime: f64,
    pub indexed_at: f64,
}

/// A not-yet-persisted entry, freshly derived from a filesystem stat.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub path: String,
    pub name: String,
    pub parent_path: String,
    pub kind: EntryKind,
    pub extension: Option<String>,
    pub size: i64,
    pub mtime: f64,
}

/// Stats `path` and builds the record the way Crawler and Watcher both
/// insert it. Returns `Ok(None)` if the path no longer exists — a lost
/// race with a concurrent delete, not an error.
pub fn derive_entry(path: &Path) -> IndexResult<Option<NewEntry>> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IndexError::Io(e)),
    };

    let is_dir = metadata.is_dir();
    let kind = if is_dir { EntryKind::Directory } else { EntryKind::File };

    let name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let parent_path =
        path.parent().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
    // Invariant: kind=directory ⇒ size=0 ∧ extension absent.
    let extension = if is_dir { None } else { path.extension().map(|s| s.to_string_lossy().into_owned()) };
    let size = if is_dir { 0 } else { metadata.len() as i64 };
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    Ok(Some(NewEntry {
        path: path.to_string_lossy().into_owned(),
        name,
        parent_path,
        kind,
        extension,
        size,
        mtime,
    }))
}

fn now_unix() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

impl Store {
    /// Applies `entries` under one transaction with `INSERT OR REPLACE`
    /// semantics keyed on `path`; `indexed_at` is stamped once for the
    /// whole batch. A per-row failure fails the whole batch — callers
    /// decide whether to retry.
    pub fn batch_upsert(&self, entries: &[NewEntry]) -> IndexResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let indexed_at = now_unix();

        self.with_write(|conn| {
            let tx = conn.unchecked_transaction().map_err(IndexError::from_write)?;
            {
                let mut upsert = tx
                    .prepare_cached(
                        "INSERT INTO entries (path, name, parent_path, kind, extension, size, mtime, indexed_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                         ON CONFLICT(path) DO UPDATE SET
                            name = excluded.name,
                            parent_path = excluded.parent_path,
                            kind = excluded.kind,
                            extension = excluded.extension,
                            size = excluded.size,
                            mtime = excluded.mtime,
                            indexed_at = excluded.indexed_at
                         RETURNING id",
                    )
                    .map_err(IndexError::from_write)?;

                for e in entries {
                    let id: i64 = upsert
                        .query_row(
                            params![
                                e.path,
                                e.name,
                                e.parent_path,
                                e.kind.as_str(),
                                e.extension,
                                e.size,
                                e.mtime,
                                indexed_at,
                            ],
                            |row| row.get(0),
                        )
                        .map_err(IndexError::from_write)?;
                    sync_bigrams(&tx, id, &e.name)?;
                }
            }
            tx.commit().map_err(IndexError::from_write)?;
            Ok(entries.len())
        })
    }

    /// Upserts a single entry — the Watcher's `created`/`modified` path.
    pub fn upsert_entry(&self, entry: &NewEntry) -> IndexResult<()> {
        self.batch_upsert(std::slice::from_ref(entry)).map(|_| ())
    }

    pub fn get_by_path(&self, path: &str) -> IndexResult<Option<Entry>> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT id, path, name, parent_path, kind, extension, size, mtime, indexed_at
                 FROM entries WHERE path = ?1",
                params![path],
                row_to_entry,
            )
            .optional()
            .map_err(IndexError::from)
        })
    }

    /// Removes the entry at `path` — the Watcher's `deleted` path.
    /// Bigrams cascade via foreign key; trigrams via the delete trigger.
    /// Returns whether a row existed.
    pub fn remove_by_path(&self, path: &str) -> IndexResult<bool> {
        self.with_write(|conn| {
            let affected = conn
                .execute("DELETE FROM entries WHERE path = ?1", params![path])
                .map_err(IndexError::from_write)?;
            Ok(affected > 0)
        })
    }

    pub fn count_entries(&self) -> IndexResult<i64> {
        self.with_read(|conn| {
            conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0)).map_err(IndexError::from)
        })
    }
}

fn sync_bigrams(tx: &rusqlite::Transaction<'_>, entry_id: i64, name: &str) -> IndexResult<()> {
    tx.execute("DELETE FROM bigrams WHERE entry_id = ?1", params![entry_id])
        .map_err(IndexError::from_write)?;

    let mut insert = tx
        .prepare_cached("INSERT OR IGNORE INTO bigrams (entry_id, bigram) VALUES (?1, ?2)")
        .map_err(IndexError::from_write)?;
    for bigram in extract_bigrams(name) {
        insert.execute(params![entry_id, bigram]).map_err(IndexError::from_write)?;
    }
    Ok(())
}

pub(crate) fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    let kind_str: String = row.get(4)?;
    Ok(Entry {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        parent_path: row.get(3)?,
        kind: EntryKind::parse(&kind_str),
        extension: row.get(5)?,
        size: row.get(6)?,
        mtime: row.get(7)?,
        indexed_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> Store {
        Store::open(dir.path().join("index.db")).expect("store opens")
    }

    #[test]
    fn batch_upsert_is_idempotent_on_path() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let entry = NewEntry {
            path: "/tmp/a/hello.txt".into(),
            name: "hello.txt".into(),
            parent_path: "/tmp/a".into(),
            kind: EntryKind::File,
            extension: Some("txt".into()),
            size: 10,
            mtime: 1.0,
        };
        store.batch_upsert(&[entry.clone()]).unwrap();
        store.batch_upsert(&[entry]).unwrap();
        assert_eq!(store.count_entries().unwrap(), 1);
    }

    #[test]
    fn remove_by_path_reports_existence() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let entry = NewEntry {
            path: "/tmp/a/hello.txt".into(),
            name: "hello.txt".into(),
            parent_path: "/tmp/a".into(),
            kind: EntryKind::File,
            extension: Some("txt".into()),
            size: 10,
            mtime: 1.0,
        };
        store.batch_upsert(&[entry]).unwrap();
        assert!(store.remove_by_path("/tmp/a/hello.txt").unwrap());
        assert!(!store.remove_by_path("/tmp/a/hello.txt").unwrap());
        assert!(store.get_by_path("/tmp/a/hello.txt").unwrap().is_none());
    }
}
