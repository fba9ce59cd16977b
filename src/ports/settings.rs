//! Read-only settings snapshot for retry policy and the post-download pipeline.

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// Default immediate-retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Hard cap on quota retries.
pub const DEFAULT_QUOTA_MAX_RETRIES: u32 = 24;

/// Wait before retrying after a quota error.
pub const DEFAULT_QUOTA_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// How long the loop sleeps when every pending job is still delayed.
pub const DEFAULT_QUIESCENT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Orchestrator tunables and pipeline toggles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub max_retries: u32,
    pub quota_max_retries: u32,
    pub quota_backoff: Duration,
    pub quiescent_interval: Duration,
    /// Where in-flight files are written.
    pub download_dir: PathBuf,
    /// Relocate finished files into the library directory.
    pub move_to_final: bool,
    /// Relocate indexer-sourced files into `indexer_dir` instead.
    pub move_to_indexer: bool,
    pub indexer_dir: Option<PathBuf>,
    pub indexer_use_category_subdir: bool,
    pub upload_enabled: bool,
    /// Remove the temporary file after a successful upload when it was not relocated.
    pub delete_temp: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            quota_max_retries: DEFAULT_QUOTA_MAX_RETRIES,
            quota_backoff: DEFAULT_QUOTA_BACKOFF,
            quiescent_interval: DEFAULT_QUIESCENT_INTERVAL,
            download_dir: std::env::temp_dir().join("bookfetch"),
            move_to_final: false,
            move_to_indexer: false,
            indexer_dir: None,
            indexer_use_category_subdir: false,
            upload_enabled: false,
            delete_temp: false,
        }
    }
}

pub trait SettingsProvider: Send + Sync {
    /// Current settings. Read once per job so a job sees a consistent view.
    fn snapshot(&self) -> Settings;
}

/// Settings held in memory; replaceable at runtime.
#[derive(Debug, Default)]
pub struct StaticSettings {
    inner: RwLock<Settings>,
}

impl StaticSettings {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn replace(&self, settings: Settings) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }
}

impl SettingsProvider for StaticSettings {
    fn snapshot(&self) -> Settings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
