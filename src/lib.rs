//! Always-on local file index and instant filename-substring search.
//!
//! The Store owns the SQLite-backed index and the Query Engine that lives
//! on it; the Crawler performs the initial (and rebuild) full scan of a
//! watch root; the Watcher keeps the index current afterward via debounced
//! filesystem events; the Coordinator wires the three together into the
//! startup sequence and the admin operations an outer interface drives.

pub mod config;
pub mod coordinator;
pub mod crawler;
pub mod error;
pub mod store;
pub mod watcher;

pub use config::Config;
pub use coordinator::{AddPathOutcome, Coordinator, CoordinatorStatus};
pub use error::{IndexError, IndexResult};
pub use store::{Entry, EntryKind, SearchOutcome, SearchParams, SortKey, Store, WatchRoot, WatchRootStatus};
