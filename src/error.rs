//! Single canonical error enum for the indexer, built with `thiserror`.
//!
//! Variants are coarse-grained by the categories in the error-handling design:
//! callers branch on the variant, not on string content. `#[from]` wires
//! `std::io::Error`, `rusqlite::Error` and `notify::Error` conversions so `?`
//! works across Store, Crawler and Watcher code without manual mapping.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Admin-provided path does not exist or is not a directory.
    #[error("not found: {0}")]
    NotFound(String),

    /// Add-path requested for a root already covered by an existing one.
    #[error("already indexed: {0}")]
    AlreadyExists(String),

    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite / rusqlite database failure that is not write-contention.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem-watch backend failure.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// An optional storage capability (the trigram tokenizer) is unavailable.
    #[error("capability unavailable: {0}")]
    CapabilityMissing(String),

    /// Write contention past the busy timeout.
    #[error("database busy: {0}")]
    Busy(String),

    /// Schema creation or database-file creation failed; startup aborts.
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type IndexResult<T> = Result<T, IndexError>;

impl IndexError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    pub fn capability_missing(what: impl Into<String>) -> Self {
        Self::CapabilityMissing(what.into())
    }

    pub fn fatal(what: impl Into<String>) -> Self {
        Self::Fatal(what.into())
    }

    /// Classify a `rusqlite` error, mapping SQLITE_BUSY into `Busy` instead
    /// of the generic `Database` bucket so write callers can distinguish
    /// contention from a real database fault.
    pub(crate) fn from_write(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref ffi_err, _) = err {
            if ffi_err.code == rusqlite::ErrorCode::DatabaseBusy {
                return Self::Busy(err.to_string());
            }
        }
        Self::Database(err)
    }
}
