//! CLI entry point for bookfetch.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bookfetch_core::Database;
use bookfetch_core::bypass::{DEFAULT_ENDPOINT, FlareSolverrClient};
use bookfetch_core::download::{DownloadExecutor, ExecutorConfig};
use bookfetch_core::job::{DownloadJob, JobStatus, SqliteJobStore};
use bookfetch_core::orchestrator::{EnqueueResult, Orchestrator, OrchestratorDeps, QueueSnapshot};
use bookfetch_core::ports::{
    DisabledUploader, LocalFileOps, NullCatalog, Settings, StaticSettings, SystemClock,
};
use clap::Parser;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::FileConfig;
use cli::Args;

/// Effective configuration after merging the config file and flags.
#[derive(Debug)]
struct RunConfig {
    database: PathBuf,
    bypass_url: String,
    library_dir: PathBuf,
    settings: Settings,
    executor: ExecutorConfig,
}

impl RunConfig {
    fn resolve(args: &Args, file: FileConfig) -> Self {
        let defaults = Settings::default();
        let download_dir = args
            .download_dir
            .clone()
            .or(file.download_dir)
            .unwrap_or_else(|| defaults.download_dir.clone());
        let database = args
            .database
            .clone()
            .or(file.database)
            .unwrap_or_else(|| download_dir.join(".bookfetch").join("jobs.db"));
        let explicit_library = args.library_dir.clone().or(file.library_dir);
        let move_to_final = args.library_dir.is_some()
            || file.move_to_final.unwrap_or(explicit_library.is_some());
        let library_dir = explicit_library.unwrap_or_else(|| download_dir.join("library"));

        let settings = Settings {
            max_retries: args
                .max_retries
                .or(file.max_retries)
                .unwrap_or(defaults.max_retries),
            quota_max_retries: file.quota_max_retries.unwrap_or(defaults.quota_max_retries),
            download_dir,
            move_to_final,
            move_to_indexer: file.move_to_indexer.unwrap_or(false),
            indexer_dir: file.indexer_dir,
            indexer_use_category_subdir: file.indexer_use_category_subdir.unwrap_or(false),
            delete_temp: file.delete_temp.unwrap_or(false),
            ..defaults
        };

        let mut executor = ExecutorConfig::default();
        if let Some(base) = args.mirror_base_url.clone().or(file.mirror_base_url) {
            executor.mirror_base_url = base;
        }
        if let Some(count) = file.mirror_count {
            executor.mirror_count = count;
        }
        if let Some(secs) = file.attempt_timeout_secs {
            executor.attempt_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.connect_timeout_secs {
            executor.connect_timeout_secs = secs;
        }
        if let Some(secs) = file.read_timeout_secs {
            executor.read_timeout_secs = secs;
        }

        Self {
            database,
            bypass_url: args
                .bypass_url
                .clone()
                .or(file.bypass_url)
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            library_dir,
            settings,
            executor,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_config(args.config.as_deref())?;
    if let (Some(path), Some(_)) = (&loaded.path, &loaded.config) {
        debug!(path = %path.display(), "loaded config file");
    }
    let run = RunConfig::resolve(&args, loaded.config.unwrap_or_default());
    debug!(?run, "effective configuration");

    if let Some(parent) = run.database.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    let db = Database::new(&run.database)
        .await
        .with_context(|| format!("Failed to open job database '{}'", run.database.display()))?;

    let bypass = FlareSolverrClient::new(run.bypass_url.clone())
        .context("Failed to build bypass proxy client")?;
    let executor = DownloadExecutor::new(Arc::new(bypass), run.executor.clone())
        .context("Failed to build download executor")?;

    let orchestrator = Orchestrator::new(OrchestratorDeps {
        store: Arc::new(SqliteJobStore::new(db.clone())),
        executor: Arc::new(executor),
        files: Arc::new(LocalFileOps::new(&run.library_dir)),
        uploader: Arc::new(DisabledUploader),
        catalog: Arc::new(NullCatalog),
        settings: Arc::new(StaticSettings::new(run.settings.clone())),
        clock: Arc::new(SystemClock::new()),
    });

    let resumed = orchestrator.start().await?;
    let source = args.source.into();
    for id in &args.ids {
        match orchestrator.enqueue(id, source).await {
            Ok(EnqueueResult::Queued { position }) => info!(id = %id, position, "queued"),
            Ok(EnqueueResult::AlreadyInQueue { position }) => {
                info!(id = %id, position, "already in queue");
            }
            Ok(EnqueueResult::AlreadyDownloaded { job }) => {
                info!(id = %id, path = ?job.final_path, "already downloaded");
            }
            Err(e) => warn!(id = %id, error = %e, "failed to queue"),
        }
    }

    let initial = orchestrator.snapshot().await?;
    let tracked = tracked_ids(&initial, &args.ids);
    if tracked.is_empty() {
        println!("Nothing to download.");
        orchestrator.shutdown().await;
        db.close().await;
        return Ok(ExitCode::SUCCESS);
    }
    info!(jobs = tracked.len(), resumed, "processing queue");

    let bar = progress_bar(args.quiet, tracked.len());
    render(&bar, &initial, &tracked);
    let subscription = {
        let bar = bar.clone();
        let tracked = tracked.clone();
        orchestrator.subscribe(move |snapshot| render(&bar, snapshot, &tracked))
    };

    tokio::select! {
        () = orchestrator.wait_idle() => {}
        result = tokio::signal::ctrl_c() => {
            if result.is_ok() {
                warn!("interrupted; unfinished jobs resume on the next run");
            }
        }
    }

    orchestrator.unsubscribe(subscription);
    bar.finish_and_clear();

    let final_snapshot = orchestrator.snapshot().await?;
    let failed = print_summary(&final_snapshot, &tracked);

    orchestrator.shutdown().await;
    db.close().await;
    Ok(if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Requested ids plus anything resumed from a previous run.
fn tracked_ids(snapshot: &QueueSnapshot, requested: &[String]) -> Vec<String> {
    let mut ids: Vec<String> = requested
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    for status in [JobStatus::Queued, JobStatus::Downloading, JobStatus::Delayed] {
        ids.extend(snapshot.jobs(status).keys().cloned());
    }
    ids.sort();
    ids.dedup();
    ids
}

fn progress_bar(quiet: bool, total: usize) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX));
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn render(bar: &ProgressBar, snapshot: &QueueSnapshot, tracked: &[String]) {
    let settled = tracked
        .iter()
        .filter(|id| snapshot.get(id).is_none_or(|job| job.status.is_settled()))
        .count();
    bar.set_position(u64::try_from(settled).unwrap_or(u64::MAX));

    let message = match snapshot.current.as_deref().and_then(|id| snapshot.get(id)) {
        Some(job) => describe_running(job),
        None if !snapshot.delayed.is_empty() => format!(
            "{} job(s) waiting for the download quota to reset",
            snapshot.delayed.len()
        ),
        None => String::new(),
    };
    bar.set_message(message);
}

fn describe_running(job: &DownloadJob) -> String {
    if let Some(seconds) = job.countdown_seconds {
        return format!("{}: waiting {seconds}s for mirror countdown", job.title);
    }
    match job.total_bytes {
        Some(total) if job.downloaded_bytes > 0 => format!(
            "{}: {} / {}",
            job.title,
            HumanBytes(job.downloaded_bytes),
            HumanBytes(total)
        ),
        None if job.downloaded_bytes > 0 => {
            format!("{}: {}", job.title, HumanBytes(job.downloaded_bytes))
        }
        _ => format!("{}: resolving mirror", job.title),
    }
}

/// Prints one line per tracked job. Returns the number that ended in error.
fn print_summary(snapshot: &QueueSnapshot, tracked: &[String]) -> usize {
    let mut failed = 0;
    for id in tracked {
        let Some(job) = snapshot.get(id) else {
            continue;
        };
        let detail = match job.status {
            JobStatus::Available | JobStatus::Done => job
                .final_path
                .as_ref()
                .or(job.temp_path.as_ref())
                .map(|path| path.display().to_string())
                .unwrap_or_default(),
            JobStatus::Error => {
                failed += 1;
                job.error.clone().unwrap_or_default()
            }
            JobStatus::Delayed => job
                .next_retry_at
                .map(|at| format!("retry at {at}"))
                .unwrap_or_default(),
            _ => String::new(),
        };
        println!("{:<11} {}  {}", job.status.as_str(), job.title, detail);
    }
    failed
}
