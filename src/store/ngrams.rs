//! Trigram maintenance happens by database trigger (see `schema.rs`);
//! bigrams are deduplicated per entry and so are maintained explicitly,
//! both inline on every write (`entries.rs::sync_bigrams`) and via the
//! wholesale rebuilds here, used for startup crash recovery.

use std::collections::HashSet;

use rusqlite::params;

use super::Store;
use crate::error::{IndexError, IndexResult};

/// Unique, lower-cased 2-character sliding windows of `name`. Lower-cased
/// so bigram lookups are case-insensitive like the trigram tokenizer.
pub(crate) fn extract_bigrams(name: &str) -> HashSet<String> {
    let chars: Vec<char> = name.to_lowercase().chars().collect();
    let mut set = HashSet::new();
    if chars.len() < 2 {
        return set;
    }
    for window in chars.windows(2) {
        set.insert(window.iter().collect());
    }
    set
}

impl Store {
    /// Rebuilds TrigramIndex wholesale from the current `entries` table.
    /// No-op when the trigram tokenizer is unavailable.
    pub fn rebuild_trigram_index(&self) -> IndexResult<()> {
        if !self.trigram_available {
            return Ok(());
        }
        self.with_write(|conn| {
            conn.execute_batch("INSERT INTO entries_trigram(entries_trigram) VALUES ('rebuild');")
                .map_err(IndexError::from_write)
        })
    }

    /// Truncates BigramIndex and reinserts the unique bigram set of every
    /// entry's name. Idempotent.
    pub fn rebuild_bigram_index(&self) -> IndexResult<()> {
        self.with_write(|conn| {
            let tx = conn.unchecked_transaction().map_err(IndexError::from_write)?;
            tx.execute("DELETE FROM bigrams", []).map_err(IndexError::from_write)?;
            {
                let mut select = tx
                    .prepare_cached("SELECT id, name FROM entries")
                    .map_err(IndexError::from_write)?;
                let mut insert = tx
                    .prepare_cached("INSERT OR IGNORE INTO bigrams (entry_id, bigram) VALUES (?1, ?2)")
                    .map_err(IndexError::from_write)?;
                let mut rows = select.query([]).map_err(IndexError::from_write)?;
                while let Some(row) = rows.next().map_err(IndexError::from_write)? {
                    let id: i64 = row.get(0).map_err(IndexError::from_write)?;
                    let name: String = row.get(1).map_err(IndexError::from_write)?;
                    for bigram in extract_bigrams(&name) {
                        insert.execute(params![id, bigram]).map_err(IndexError::from_write)?;
                    }
                }
            }
            tx.commit().map_err(IndexError::from_write)
        })
    }

    /// If `entries` is non-empty but TrigramIndex is empty, rebuild it;
    /// otherwise do nothing. Called once at startup to recover from a
    /// crash mid-scan.
    pub fn ensure_trigram_index_populated(&self) -> IndexResult<()> {
        if !self.trigram_available {
            return Ok(());
        }
        let (entries_n, trigram_n): (i64, i64) = self.with_read(|conn| {
            let entries_n = conn
                .query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))
                .map_err(IndexError::from)?;
            let trigram_n = conn
                .query_row("SELECT COUNT(*) FROM entries_trigram", [], |r| r.get(0))
                .map_err(IndexError::from)?;
            Ok((entries_n, trigram_n))
        })?;
        if entries_n > 0 && trigram_n == 0 {
            self.rebuild_trigram_index()?;
        }
        Ok(())
    }

    /// Same recovery check for BigramIndex.
    pub fn ensure_bigram_index_populated(&self) -> IndexResult<()> {
        let (entries_n, bigram_n): (i64, i64) = self.with_read(|conn| {
            let entries_n = conn
                .query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))
                .map_err(IndexError::from)?;
            let bigram_n = conn
                .query_row("SELECT COUNT(DISTINCT entry_id) FROM bigrams", [], |r| r.get(0))
                .map_err(IndexError::from)?;
            Ok((entries_n, bigram_n))
        })?;
        if entries_n > 0 && bigram_n == 0 {
            self.rebuild_bigram_index()?;
        }
        Ok(())
    }
}
