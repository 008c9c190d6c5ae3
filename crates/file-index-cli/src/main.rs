//! `findex` — terminal harness around `file_index_core::Coordinator`.
//! Runs one admin operation (or a search) and exits; it does not itself
//! stay resident the way a long-running service built on this crate would.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use file_index_core::{Config, Coordinator, EntryKind, SearchParams, SortKey};

#[derive(Parser)]
#[command(name = "findex", about = "Local file index and instant filename search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run startup (seed configured roots, scan, start watching) and exit.
    Startup,
    /// Register and scan a new root, then start watching it.
    AddPath { path: PathBuf },
    /// Stop watching a root and drop its indexed entries.
    RemovePath { path: PathBuf },
    /// Re-scan one root, or every registered root if none is given.
    Rebuild {
        path: Option<PathBuf>,
        #[arg(long = "ignore", value_delimiter = ',')]
        extra_ignore_patterns: Vec<String>,
    },
    /// Print registered roots and readiness.
    Status,
    /// Search the index.
    Search {
        query: String,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 0)]
        depth: u32,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::from_env();

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("findex: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: Config) -> file_index_core::IndexResult<()> {
    let coordinator = Coordinator::new(config)?;

    match cli.command {
        Command::Startup => {
            coordinator.startup()?;
            print_json(&coordinator.status()?)?;
        }
        Command::AddPath { path } => {
            let outcome = coordinator.add_path(&path)?;
            match outcome {
                file_index_core::AddPathOutcome::Registered(root) => print_json(&root)?,
                file_index_core::AddPathOutcome::AlreadyIndexed(root) => {
                    println!("already indexed under {}", root.path);
                    print_json(&root)?;
                }
            }
        }
        Command::RemovePath { path } => {
            coordinator.remove_path(&path.to_string_lossy())?;
        }
        Command::Rebuild { path, extra_ignore_patterns } => {
            let target = path.as_ref().map(|p| p.to_string_lossy().into_owned());
            coordinator.rebuild(target.as_deref(), &extra_ignore_patterns)?;
            print_json(&coordinator.status()?)?;
        }
        Command::Status => {
            print_json(&coordinator.status()?)?;
        }
        Command::Search { query, path, kind, limit, offset, depth } => {
            let kind_filter = match kind.as_deref() {
                Some("file") => Some(EntryKind::File),
                Some("directory") => Some(EntryKind::Directory),
                Some(other) => {
                    return Err(file_index_core::IndexError::not_found(format!(
                        "unknown kind filter: {other}"
                    )))
                }
                None => None,
            };
            let params = SearchParams {
                query,
                path_filter: path,
                kind_filter,
                max_results: limit,
                offset,
                sort: SortKey::Name,
                ascending: true,
                depth,
            };
            let outcome = coordinator.store().search(&params)?;
            print_json(&outcome)?;
        }
    }

    coordinator.shutdown();
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> file_index_core::IndexResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| file_index_core::IndexError::fatal(format!("failed to render JSON: {e}")))?;
    println!("{rendered}");
    Ok(())
}
