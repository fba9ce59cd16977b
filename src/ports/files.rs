//! Filesystem helpers for validating and relocating finished downloads.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::download::filename::resolve_unique_path;

/// Subdirectory used when the indexer layout groups files by category.
pub const INDEXER_CATEGORY_SUBDIR: &str = "books";

/// Size tolerance, in percent, when comparing against the catalog size.
const SIZE_TOLERANCE_PERCENT: u64 = 1;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("failed to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} has no file name")]
    NoFileName(PathBuf),
}

impl FileError {
    fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

#[async_trait]
pub trait FileOps: Send + Sync {
    /// True when the file exists, is non-empty, and matches `expected_size` (if known).
    async fn validate_download(&self, path: &Path, expected_size: Option<u64>) -> bool;

    /// Moves the file into the library directory. Returns the new path.
    async fn move_to_final_destination(&self, path: &Path) -> Result<PathBuf, FileError>;

    /// Moves the file into `dir` (or `dir/books`). Returns the new path.
    async fn move_to_indexer_directory(
        &self,
        path: &Path,
        dir: &Path,
        use_category_subdir: bool,
    ) -> Result<PathBuf, FileError>;

    /// Removes the file. A missing file is not an error.
    async fn delete_file(&self, path: &Path) -> Result<(), FileError>;
}

/// Local-disk implementation.
#[derive(Debug, Clone)]
pub struct LocalFileOps {
    library_dir: PathBuf,
}

impl LocalFileOps {
    #[must_use]
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
        }
    }

    #[must_use]
    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }
}

fn size_matches(actual: u64, expected: u64) -> bool {
    let tolerance = expected * SIZE_TOLERANCE_PERCENT / 100;
    actual.abs_diff(expected) <= tolerance
}

/// Renames into `dest_dir` under a unique name, copying across filesystems.
#[instrument(level = "debug", skip_all, fields(src = %src.display(), dest = %dest_dir.display()))]
async fn move_into(src: &Path, dest_dir: &Path) -> Result<PathBuf, FileError> {
    let file_name = src
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FileError::NoFileName(src.to_path_buf()))?;

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| FileError::io("create directory", dest_dir, e))?;
    let target = resolve_unique_path(dest_dir, file_name);

    if let Err(rename_err) = tokio::fs::rename(src, &target).await {
        debug!(error = %rename_err, "rename failed, falling back to copy");
        tokio::fs::copy(src, &target)
            .await
            .map_err(|e| FileError::io("copy", src, e))?;
        tokio::fs::remove_file(src)
            .await
            .map_err(|e| FileError::io("remove", src, e))?;
    }
    Ok(target)
}

#[async_trait]
impl FileOps for LocalFileOps {
    async fn validate_download(&self, path: &Path, expected_size: Option<u64>) -> bool {
        let Ok(meta) = tokio::fs::metadata(path).await else {
            return false;
        };
        if !meta.is_file() || meta.len() == 0 {
            return false;
        }
        expected_size.is_none_or(|expected| size_matches(meta.len(), expected))
    }

    async fn move_to_final_destination(&self, path: &Path) -> Result<PathBuf, FileError> {
        move_into(path, &self.library_dir).await
    }

    async fn move_to_indexer_directory(
        &self,
        path: &Path,
        dir: &Path,
        use_category_subdir: bool,
    ) -> Result<PathBuf, FileError> {
        if use_category_subdir {
            move_into(path, &dir.join(INDEXER_CATEGORY_SUBDIR)).await
        } else {
            move_into(path, dir).await
        }
    }

    async fn delete_file(&self, path: &Path) -> Result<(), FileError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileError::io("remove", path, e)),
        }
    }
}
