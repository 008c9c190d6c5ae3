//! Ignore-pattern registry and the three-way match predicate shared by the
//! Crawler and the Watcher: filename glob, literal filename equality, or
//! substring of the full path. Patterns with no path separator additionally
//! match any individual path component; patterns with a separator rely
//! solely on the substring-of-full-path check.

use std::path::Path;

use globset::{Glob, GlobMatcher};
use rusqlite::params;

use super::Store;
use crate::error::{IndexError, IndexResult};

/// A single compiled ignore pattern: the raw string (used for literal and
/// substring checks) plus its glob matcher, when the pattern compiles as
/// one (malformed glob syntax degrades to literal/substring checks only).
struct CompiledPattern {
    raw: String,
    has_separator: bool,
    glob: Option<GlobMatcher>,
}

impl CompiledPattern {
    fn new(pattern: &str) -> Self {
        let has_separator = pattern.contains(std::path::MAIN_SEPARATOR) || pattern.contains('/');
        let glob = Glob::new(pattern).ok().map(|g| g.compile_matcher());
        Self { raw: pattern.to_string(), has_separator, glob }
    }
}

/// A compiled, reusable set of ignore patterns. The Crawler compiles one
/// per run (or per rebuild) and reuses it across every candidate path
/// instead of recompiling per path.
pub struct IgnoreSet {
    patterns: Vec<CompiledPattern>,
}

impl IgnoreSet {
    pub fn compile(patterns: &[String]) -> Self {
        Self { patterns: patterns.iter().map(|p| CompiledPattern::new(p)).collect() }
    }

    /// `path` is the full path string; `name` is its final component.
    pub fn is_ignored(&self, path: &str, name: &str) -> bool {
        for p in &self.patterns {
            if let Some(glob) = &p.glob {
                if glob.is_match(name) {
                    return true;
                }
            }
            if name == p.raw {
                return true;
            }
            if path.contains(p.raw.as_str()) {
                return true;
            }
            if !p.has_separator {
                for component in Path::new(path).components() {
                    if let Some(c) = component.as_os_str().to_str() {
                        if c == p.raw {
                            return true;
                        }
                        if let Some(glob) = &p.glob {
                            if glob.is_match(c) {
                                return true;
                            }
                        }
                    }
                }
            }
        }
        false
    }
}

impl Store {
    pub fn add_ignore_pattern(&self, pattern: &str) -> IndexResult<()> {
        self.with_write(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO ignore_patterns (pattern) VALUES (?1)",
                params![pattern],
            )
            .map_err(IndexError::from_write)?;
            Ok(())
        })
    }

    pub fn remove_ignore_pattern(&self, pattern: &str) -> IndexResult<()> {
        self.with_write(|conn| {
            conn.execute("DELETE FROM ignore_patterns WHERE pattern = ?1", params![pattern])
                .map_err(IndexError::from_write)?;
            Ok(())
        })
    }

    pub fn list_ignore_patterns(&self) -> IndexResult<Vec<String>> {
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare_cached("SELECT pattern FROM ignore_patterns ORDER BY pattern")
                .map_err(IndexError::from)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(IndexError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(IndexError::from)?;
            Ok(rows)
        })
    }

    /// Convenience predicate for low-frequency callers (the Watcher, the
    /// admin add/remove-pattern paths). Recompiles the pattern set from
    /// the current DB contents on every call; high-frequency callers (the
    /// Crawler) should compile an `IgnoreSet` once and reuse it instead.
    pub fn is_ignored(&self, path: &str) -> IndexResult<bool> {
        let patterns = self.list_ignore_patterns()?;
        let name = Path::new(path).file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(IgnoreSet::compile(&patterns).is_ignored(path, &name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        vec!["node_modules".into(), "*.pyc".into(), "__pycache__".into(), ".git".into()]
    }

    #[test]
    fn matches_the_seed_scenarios() {
        let set = IgnoreSet::compile(&patterns());
        assert!(set.is_ignored("/p/node_modules/x", "x"));
        assert!(set.is_ignored("/p/a.pyc", "a.pyc"));
        assert!(set.is_ignored("/p/__pycache__/a", "a"));
        assert!(set.is_ignored("/p/.git/HEAD", "HEAD"));
        assert!(!set.is_ignored("/p/main.py", "main.py"));
        assert!(!set.is_ignored("/project/src/index.ts", "index.ts"));
    }

    #[test]
    fn substring_of_full_path_matches() {
        let set = IgnoreSet::compile(&patterns());
        assert!(set.is_ignored("/project/node_modules/lib", "lib"));
    }

    #[test]
    fn separator_containing_pattern_skips_component_shortcut() {
        let set = IgnoreSet::compile(&["build/output".to_string()]);
        assert!(set.is_ignored("/repo/build/output/a.o", "a.o"));
        assert!(!set.is_ignored("/repo/build/a.o", "a.o"));
    }
}
