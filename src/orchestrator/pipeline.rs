//! Post-download actions: validate, relocate, upload, clean up.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::download::DownloadedFile;
use crate::job::{DownloadJob, JobPatch, JobSource, JobStatus, StoreError, UploadStatus};
use crate::ports::{FileError, FileOps, Settings};

use super::OrchestratorDeps;

/// How the pipeline left the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum PipelineOutcome {
    /// Recorded as `done` or `available`.
    Settled(JobStatus),
    /// The file failed validation; counts as a transient failure.
    Retry(String),
    /// Relocation failed or the uploader is misconfigured; settle as `error`.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relocation<'a> {
    Library,
    Indexer(&'a Path),
}

/// Indexer-sourced jobs go to the indexer directory when that is enabled;
/// everything else goes to the library when `move_to_final` is set.
fn relocation_target(source: JobSource, settings: &Settings) -> Option<Relocation<'_>> {
    if source == JobSource::Indexer
        && settings.move_to_indexer
        && let Some(dir) = settings.indexer_dir.as_deref()
    {
        return Some(Relocation::Indexer(dir));
    }
    settings.move_to_final.then_some(Relocation::Library)
}

async fn relocate(
    files: &dyn FileOps,
    path: &Path,
    target: Relocation<'_>,
    settings: &Settings,
) -> Result<PathBuf, FileError> {
    match target {
        Relocation::Library => files.move_to_final_destination(path).await,
        Relocation::Indexer(dir) => {
            files
                .move_to_indexer_directory(path, dir, settings.indexer_use_category_subdir)
                .await
        }
    }
}

/// Runs the enabled steps for a successful download and records the result.
///
/// A job with no enabled destination stays `done` with the file at its
/// temporary path. A failed upload is recorded on the job but does not
/// change its status.
pub(super) async fn run(
    deps: &OrchestratorDeps,
    job: &DownloadJob,
    file: &DownloadedFile,
    settings: &Settings,
) -> Result<PipelineOutcome, StoreError> {
    let id = job.id.as_str();

    if !deps
        .files
        .validate_download(&file.path, job.expected_size)
        .await
    {
        if let Err(e) = deps.files.delete_file(&file.path).await {
            warn!(job_id = %id, error = %e, "failed to remove invalid download");
        }
        return Ok(PipelineOutcome::Retry(format!(
            "downloaded file failed validation: {}",
            file.path.display()
        )));
    }

    deps.store
        .mark_completed(id, &file.path, deps.clock.now_ms())
        .await?;

    let final_path = match relocation_target(job.source, settings) {
        None => None,
        Some(target) => match relocate(deps.files.as_ref(), &file.path, target, settings).await {
            Ok(path) => {
                info!(job_id = %id, path = %path.display(), "download relocated");
                Some(path)
            }
            Err(e) => return Ok(PipelineOutcome::Failed(format!("failed to relocate download: {e}"))),
        },
    };
    let artifact = final_path.as_deref().unwrap_or(&file.path);

    let upload = if settings.upload_enabled && deps.uploader.is_enabled() {
        match deps.uploader.upload_file(artifact).await {
            Ok(()) => {
                info!(job_id = %id, "uploaded to remote library");
                Some((UploadStatus::Uploaded, None))
            }
            Err(e) if e.is_configuration() => {
                return Ok(PipelineOutcome::Failed(format!("upload not possible: {e}")));
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "upload failed");
                Some((UploadStatus::Failed, Some(format!("upload failed: {e}"))))
            }
        }
    } else {
        None
    };
    let uploaded = matches!(upload, Some((UploadStatus::Uploaded, _)));

    if settings.delete_temp && final_path.is_none() && uploaded {
        if let Err(e) = deps.files.delete_file(&file.path).await {
            warn!(job_id = %id, error = %e, "failed to delete temporary file");
        }
    }

    let now = deps.clock.now_ms();
    if final_path.is_some() || uploaded {
        deps.store
            .mark_available(id, final_path.as_deref(), upload, now)
            .await?;
        return Ok(PipelineOutcome::Settled(JobStatus::Available));
    }

    // Nothing left the temporary path; a failed upload is still worth recording.
    if let Some((status, message)) = upload {
        let patch = JobPatch {
            upload_status: Some(Some(status)),
            error: Some(message),
            ..JobPatch::default()
        };
        deps.store.update(id, &patch).await?;
    }
    Ok(PipelineOutcome::Settled(JobStatus::Done))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            indexer_dir: Some(PathBuf::from("/srv/indexer")),
            ..Settings::default()
        }
    }

    #[test]
    fn test_no_relocation_by_default() {
        assert_eq!(relocation_target(JobSource::Web, &Settings::default()), None);
    }

    #[test]
    fn test_indexer_source_prefers_indexer_directory() {
        let settings = Settings {
            move_to_final: true,
            move_to_indexer: true,
            ..settings()
        };
        assert_eq!(
            relocation_target(JobSource::Indexer, &settings),
            Some(Relocation::Indexer(Path::new("/srv/indexer")))
        );
        assert_eq!(
            relocation_target(JobSource::Web, &settings),
            Some(Relocation::Library)
        );
    }

    #[test]
    fn test_indexer_without_directory_falls_back_to_library() {
        let settings = Settings {
            move_to_final: true,
            move_to_indexer: true,
            indexer_dir: None,
            ..Settings::default()
        };
        assert_eq!(
            relocation_target(JobSource::Indexer, &settings),
            Some(Relocation::Library)
        );
    }
}
