//! Remote library upload.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Upload failures.
///
/// [`UploadError::NotAuthenticated`] is a configuration problem and settles
/// the job as `error`; every other variant is recorded on an otherwise
/// successful job.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("remote library is not authenticated")]
    NotAuthenticated,

    #[error("upload of {path} rejected: {reason}")]
    Rejected { path: PathBuf, reason: String },

    #[error("upload transport failed: {0}")]
    Transport(String),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Whether uploads are configured at all.
    fn is_enabled(&self) -> bool;

    async fn upload_file(&self, path: &Path) -> Result<(), UploadError>;
}

/// Uploader used when no remote library is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledUploader;

#[async_trait]
impl Uploader for DisabledUploader {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn upload_file(&self, _path: &Path) -> Result<(), UploadError> {
        Err(UploadError::NotAuthenticated)
    }
}
