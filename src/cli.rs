//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use bookfetch_core::job::JobSource;

/// Queue, fetch and file books from shadow-library mirrors.
///
/// Each ID is queued, resolved through the bypass proxy mirror by mirror,
/// streamed to disk and optionally moved into a library directory. Jobs
/// survive restarts: anything left unfinished is resumed on the next run.
#[derive(Parser, Debug)]
#[command(name = "bookfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Item IDs (content hashes) to download
    pub ids: Vec<String>,

    /// How the jobs were requested; `indexer` sends files to the indexer directory
    #[arg(long, value_enum, default_value_t = SourceArg::Api)]
    pub source: SourceArg,

    /// Job database path
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Directory for in-flight downloads
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Move finished downloads into this directory
    #[arg(long)]
    pub library_dir: Option<PathBuf>,

    /// FlareSolverr-compatible bypass proxy endpoint
    #[arg(long)]
    pub bypass_url: Option<String>,

    /// Origin serving slow-download pages
    #[arg(long)]
    pub mirror_base_url: Option<String>,

    /// Maximum immediate retries for transient failures (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: Option<u32>,

    /// Config file (defaults to $XDG_CONFIG_HOME/bookfetch/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    Web,
    Indexer,
    Api,
}

impl From<SourceArg> for JobSource {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Web => Self::Web,
            SourceArg::Indexer => Self::Indexer,
            SourceArg::Api => Self::Api,
        }
    }
}
