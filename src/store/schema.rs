//! Schema bootstrap: a stale-schema guard (version check against a `meta`
//! table, drop-and-recreate on mismatch) rather than a migration chain,
//! since this crate has a single schema generation so far.

use rusqlite::Connection;

use crate::error::IndexResult;

pub(crate) const SCHEMA_VERSION: i64 = 1;

/// Creates every table this crate needs, resetting first if an older
/// schema generation is detected. Returns whether the trigram FTS5
/// tokenizer is available on this SQLite build.
pub(crate) fn bootstrap(conn: &Connection) -> IndexResult<bool> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    if current_schema_version(conn) != Some(SCHEMA_VERSION) {
        reset_schema(conn)?;
    }

    create_core_tables(conn)?;
    set_schema_version(conn)?;

    Ok(try_create_trigram(conn))
}

fn current_schema_version(conn: &Connection) -> Option<i64> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = 'schema_version'",
        [],
        |row| row.get::<_, String>(0),
    )
    .ok()
    .and_then(|v| v.parse().ok())
}

fn set_schema_version(conn: &Connection) -> IndexResult<()> {
    conn.execute(
        "INSERT INTO meta(key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

fn reset_schema(conn: &Connection) -> IndexResult<()> {
    conn.execute_batch(
        "DROP TRIGGER IF EXISTS entries_ai_trigram;
         DROP TRIGGER IF EXISTS entries_ad_trigram;
         DROP TRIGGER IF EXISTS entries_au_trigram;
         DROP TABLE IF EXISTS entries_trigram;
         DROP TABLE IF EXISTS bigrams;
         DROP TABLE IF EXISTS entries;
         DROP TABLE IF EXISTS watch_roots;
         DROP TABLE IF EXISTS ignore_patterns;
         DROP TABLE IF EXISTS meta;",
    )?;
    Ok(())
}

fn create_core_tables(conn: &Connection) -> IndexResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            parent_path TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('file', 'directory')),
            extension TEXT,
            size INTEGER NOT NULL DEFAULT 0,
            mtime REAL NOT NULL,
            indexed_at REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_entries_parent_path ON entries(parent_path);
        CREATE INDEX IF NOT EXISTS idx_entries_name ON entries(name);
        CREATE INDEX IF NOT EXISTS idx_entries_kind ON entries(kind);

        CREATE TABLE IF NOT EXISTS bigrams (
            entry_id INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
            bigram TEXT NOT NULL,
            PRIMARY KEY (entry_id, bigram)
        );
        CREATE INDEX IF NOT EXISTS idx_bigrams_bigram ON bigrams(bigram);

        CREATE TABLE IF NOT EXISTS watch_roots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            enabled INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'idle',
            total_files INTEGER NOT NULL DEFAULT 0,
            indexed_files INTEGER NOT NULL DEFAULT 0,
            last_full_scan REAL,
            last_updated REAL,
            error_message TEXT
        );

        CREATE TABLE IF NOT EXISTS ignore_patterns (
            pattern TEXT PRIMARY KEY
        );",
    )?;
    Ok(())
}

/// Trigram availability is probed, not assumed: older SQLite builds lack
/// the `trigram` FTS5 tokenizer, and the whole system must degrade rather
/// than fail when that's the case. External-content FTS5 table plus
/// triggers keeps it in lockstep with `entries` without the caller ever
/// writing to it directly.
fn try_create_trigram(conn: &Connection) -> bool {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS entries_trigram USING fts5(
            name,
            content = 'entries',
            content_rowid = 'id',
            tokenize = 'trigram'
        );

        CREATE TRIGGER IF NOT EXISTS entries_ai_trigram AFTER INSERT ON entries BEGIN
            INSERT INTO entries_trigram(rowid, name) VALUES (new.id, new.name);
        END;

        CREATE TRIGGER IF NOT EXISTS entries_ad_trigram AFTER DELETE ON entries BEGIN
            INSERT INTO entries_trigram(entries_trigram, rowid, name) VALUES ('delete', old.id, old.name);
        END;

        CREATE TRIGGER IF NOT EXISTS entries_au_trigram AFTER UPDATE ON entries BEGIN
            INSERT INTO entries_trigram(entries_trigram, rowid, name) VALUES ('delete', old.id, old.name);
            INSERT INTO entries_trigram(rowid, name) VALUES (new.id, new.name);
        END;",
    )
    .is_ok()
}
