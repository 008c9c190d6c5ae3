//! The Store: exclusive owner of the persistent index file. Exposes entry
//! CRUD, batch insert, n-gram rebuild, watch-root and ignore-pattern
//! administration, and the `search` primitive the Query Engine lives on.
//!
//! Concurrency: every write is serialized through one `Mutex`-guarded
//! connection, while reads open a connection lazily per thread and keep it
//! for the thread's lifetime.

mod entries;
mod ignore;
mod ngrams;
mod query;
mod schema;
mod watch_roots;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::{IndexError, IndexResult};

pub use entries::{derive_entry, Entry, EntryKind, NewEntry};
pub use ignore::IgnoreSet;
pub use query::{SearchOutcome, SearchParams, SortKey};
pub use watch_roots::{WatchRoot, WatchRootStatus};

pub struct Store {
    path: PathBuf,
    write_conn: Mutex<Connection>,
    trigram_available: bool,
}

thread_local! {
    static READ_CONNECTIONS: RefCell<HashMap<PathBuf, Connection>> = RefCell::new(HashMap::new());
}

impl Store {
    /// Opens (creating if absent) the database at `db_path`, bootstraps the
    /// schema, and probes trigram availability. Schema and file-creation
    /// failures are `Fatal` and meant to abort startup.
    pub fn open(db_path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = db_path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    IndexError::fatal(format!(
                        "failed to create index directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let conn = Self::open_connection(&path).map_err(|e| {
            IndexError::fatal(format!("failed to open index database {}: {e}", path.display()))
        })?;

        let trigram_available = schema::bootstrap(&conn)
            .map_err(|e| IndexError::fatal(format!("schema bootstrap failed: {e}")))?;

        if trigram_available {
            log::info!("trigram tokenizer available");
        } else {
            log::warn!("trigram tokenizer unavailable, falling back to bigram/scan search");
        }

        Ok(Self { path, write_conn: Mutex::new(conn), trigram_available })
    }

    pub fn trigram_available(&self) -> bool {
        self.trigram_available
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn open_connection(path: &Path) -> IndexResult<Connection> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Runs `f` against the single mutex-guarded write connection. Every
    /// mutating Store operation goes through here.
    pub(crate) fn with_write<T>(
        &self,
        f: impl FnOnce(&Connection) -> IndexResult<T>,
    ) -> IndexResult<T> {
        let conn = self.write_conn.lock();
        f(&conn)
    }

    /// Runs `f` against this thread's lazily-opened read connection.
    pub(crate) fn with_read<T>(
        &self,
        f: impl FnOnce(&Connection) -> IndexResult<T>,
    ) -> IndexResult<T> {
        READ_CONNECTIONS.with(|cell| {
            let mut conns = cell.borrow_mut();
            if !conns.contains_key(&self.path) {
                let conn = Self::open_connection(&self.path)?;
                conns.insert(self.path.clone(), conn);
            }
            let conn = conns.get(&self.path).expect("just inserted above");
            f(conn)
        })
    }
}
