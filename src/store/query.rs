//! Query Engine: chooses among trigram, bigram and scan strategies purely
//! by query length and trigram availability, applies path/kind filters,
//! sorts, and paginates. The depth filter runs after the SQL `LIMIT`
//! because tree depth relative to a prefix isn't expressible in SQL here,
//! so depth queries over-fetch (capped) and filter/paginate in Rust.

use std::path::Path;

use rusqlite::ToSql;

use super::entries::row_to_entry;
use super::{Entry, EntryKind, Store};
use crate::error::{IndexError, IndexResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Path,
    Size,
    Mtime,
}

impl SortKey {
    fn column(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Path => "path",
            SortKey::Size => "size",
            SortKey::Mtime => "mtime",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub path_filter: Option<String>,
    pub kind_filter: Option<EntryKind>,
    pub max_results: usize,
    pub offset: usize,
    pub sort: SortKey,
    pub ascending: bool,
    /// Non-negative tree-depth cap under `path_filter`; 0 means unlimited.
    pub depth: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            path_filter: None,
            kind_filter: None,
            max_results: 100,
            offset: 0,
            sort: SortKey::Name,
            ascending: true,
            depth: 0,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchOutcome {
    pub results: Vec<Entry>,
}

/// Depth filtering over-fetches because it happens after the SQL `LIMIT`,
/// so the over-fetch itself needs a bound.
const DEPTH_OVERFETCH_CAP: usize = 100_000;

enum Strategy {
    AllScan,
    LikeScan,
    Bigram(String),
    Trigram(String),
}

fn select_strategy(query: &str, trigram_available: bool) -> Strategy {
    match query.chars().count() {
        0 => Strategy::AllScan,
        1 => Strategy::LikeScan,
        2 => Strategy::Bigram(query.to_lowercase()),
        _ if trigram_available => Strategy::Trigram(query.to_string()),
        _ => Strategy::LikeScan,
    }
}

/// Quotes `query` as a single FTS5 phrase so the trigram tokens must
/// appear consecutively and in order — i.e. substring semantics rather
/// than an AND of independent trigram tokens.
fn fts_phrase(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

impl Store {
    pub fn search(&self, params: &SearchParams) -> IndexResult<SearchOutcome> {
        let depth_filtering = params.depth > 0 && params.path_filter.is_some();
        let fetch_limit = if depth_filtering { DEPTH_OVERFETCH_CAP } else { params.max_results };
        let fetch_offset = if depth_filtering { 0 } else { params.offset };

        let strategy = select_strategy(&params.query, self.trigram_available());
        let rows = self.with_read(|conn| run_strategy(conn, &strategy, params, fetch_limit, fetch_offset))?;

        if !depth_filtering {
            return Ok(SearchOutcome { results: rows });
        }

        let base_path = Path::new(params.path_filter.as_deref().unwrap_or(""));
        let depth = params.depth as usize;
        let filtered = rows
            .into_iter()
            .filter(|e| match Path::new(&e.path).strip_prefix(base_path) {
                Ok(rel) => rel.components().count() <= depth,
                Err(_) => false,
            })
            .skip(params.offset)
            .take(params.max_results)
            .collect();

        Ok(SearchOutcome { results: filtered })
    }

    /// The full count of rows matching every filter, ignoring pagination —
    /// for callers that want a true total rather than the returned-row
    /// count, leaving the choice of which to report up to the caller.
    /// Bounded by the same over-fetch cap depth filtering uses.
    pub fn count_search_matches(&self, params: &SearchParams) -> IndexResult<i64> {
        let unpaginated = SearchParams {
            offset: 0,
            max_results: DEPTH_OVERFETCH_CAP,
            ..params.clone()
        };
        let outcome = self.search(&unpaginated)?;
        Ok(outcome.results.len() as i64)
    }
}

fn run_strategy(
    conn: &rusqlite::Connection,
    strategy: &Strategy,
    params: &SearchParams,
    limit: usize,
    offset: usize,
) -> IndexResult<Vec<Entry>> {
    let mut sql = String::from(
        "SELECT e.id, e.path, e.name, e.parent_path, e.kind, e.extension, e.size, e.mtime, e.indexed_at \
         FROM entries e ",
    );
    let mut conditions: Vec<String> = Vec::new();
    let mut sql_params: Vec<Box<dyn ToSql>> = Vec::new();

    match strategy {
        Strategy::AllScan => {}
        Strategy::LikeScan => {
            conditions.push("e.name LIKE ?".to_string());
            sql_params.push(Box::new(format!("%{}%", params.query)));
        }
        Strategy::Bigram(bigram) => {
            sql.push_str("JOIN bigrams b ON e.id = b.entry_id ");
            conditions.push("b.bigram = ?".to_string());
            sql_params.push(Box::new(bigram.clone()));
        }
        Strategy::Trigram(query) => {
            sql.push_str("JOIN entries_trigram t ON e.id = t.rowid ");
            conditions.push("entries_trigram MATCH ?".to_string());
            sql_params.push(Box::new(fts_phrase(query)));
        }
    }

    if let Some(path_filter) = &params.path_filter {
        conditions.push("e.path LIKE ?".to_string());
        sql_params.push(Box::new(format!("{}%", path_filter)));
    }
    if let Some(kind) = params.kind_filter {
        conditions.push("e.kind = ?".to_string());
        sql_params.push(Box::new(kind.as_str().to_string()));
    }

    if !conditions.is_empty() {
        sql.push_str("WHERE ");
        sql.push_str(&conditions.join(" AND "));
        sql.push(' ');
    }

    let direction = if params.ascending { "ASC" } else { "DESC" };
    sql.push_str(&format!(
        "ORDER BY e.{} {direction}, e.id {direction} LIMIT ? OFFSET ?",
        params.sort.column(),
    ));
    sql_params.push(Box::new(limit as i64));
    sql_params.push(Box::new(offset as i64));

    let mut stmt = conn.prepare(&sql).map_err(IndexError::from)?;
    let param_refs: Vec<&dyn ToSql> = sql_params.iter().map(|b| b.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), row_to_entry)
        .map_err(IndexError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(IndexError::from)?;
    Ok(rows)
}
