//! Environment-variable configuration, mirroring the `FILE_INDEX_`-prefixed
//! settings of the service this crate's Coordinator drives. There is no
//! config-file format here; an HTTP layer built on this crate may add one,
//! but the core only ever reads the process environment.

use std::path::PathBuf;

const ENV_PREFIX: &str = "FILE_INDEX_";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub watch_paths: Vec<PathBuf>,
    pub index_db_path: PathBuf,
    pub scan_workers: usize,
    pub debounce_ms: u64,
    pub batch_size: usize,
    pub ignore_patterns: Vec<String>,
    pub default_count: usize,
    pub max_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            watch_paths: vec![Self::default_watch_path()],
            index_db_path: PathBuf::from("data/file_index.db"),
            scan_workers: 4,
            debounce_ms: 500,
            batch_size: 1000,
            ignore_patterns: default_ignore_patterns(),
            default_count: 100,
            max_count: 10_000,
        }
    }
}

impl Config {
    /// Build configuration from `FILE_INDEX_*` environment variables,
    /// falling back to the defaults above for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = env_var("HOST").unwrap_or(defaults.host);
        let port = env_var("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);
        let watch_paths = env_var("WATCH_PATHS")
            .map(|v| v.split(',').map(|s| PathBuf::from(s.trim())).collect())
            .unwrap_or(defaults.watch_paths);
        let index_db_path = env_var("INDEX_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.index_db_path);
        let scan_workers = env_var("SCAN_WORKERS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.scan_workers);
        let debounce_ms = env_var("DEBOUNCE_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.debounce_ms);
        let batch_size = env_var("BATCH_SIZE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.batch_size);
        let ignore_patterns = env_var("IGNORE_PATTERNS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or(defaults.ignore_patterns);
        let default_count = env_var("DEFAULT_COUNT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.default_count);
        let max_count = env_var("MAX_COUNT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_count);

        Self {
            host,
            port,
            watch_paths,
            index_db_path,
            scan_workers,
            debounce_ms,
            batch_size,
            ignore_patterns,
            default_count,
            max_count,
        }
    }

    /// `home/Documents`, overridable wholesale via `FILE_INDEX_DEFAULT_PATH`.
    fn default_watch_path() -> PathBuf {
        if let Some(p) = env_var("DEFAULT_PATH") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .map(|home| home.join("Documents"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn default_ignore_patterns() -> Vec<String> {
    [".git", "node_modules", ".venv", "__pycache__", ".DS_Store"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.scan_workers, 4);
        assert_eq!(cfg.debounce_ms, 500);
        assert_eq!(cfg.batch_size, 1000);
        assert_eq!(cfg.max_count, 10_000);
        assert!(cfg.ignore_patterns.contains(&".git".to_string()));
    }
}
