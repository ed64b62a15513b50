//! Deferred removal of everything a check put on disk.

use crate::model::{Artifact, ArtifactKind, CheckWarning, WarningKind};
use crate::vcs::VersionControl;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Delete calls issued, one per artifact.
    pub deleted: usize,
    pub warnings: Vec<CheckWarning>,
}

/// Runs cleanups in the background after a delay.
///
/// Cancelling `shutdown` skips the remaining delay of every pending cleanup.
#[derive(Clone)]
pub struct CleanupScheduler {
    vcs: Arc<dyn VersionControl>,
    delay: Duration,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl CleanupScheduler {
    pub fn new(vcs: Arc<dyn VersionControl>, delay: Duration, shutdown: CancellationToken) -> Self {
        Self {
            vcs,
            delay,
            shutdown,
            tracker: TaskTracker::new(),
        }
    }

    pub fn schedule(&self, artifacts: Vec<Artifact>, run_dir: PathBuf) -> JoinHandle<CleanupReport> {
        let vcs = Arc::clone(&self.vcs);
        let delay = self.delay;
        let shutdown = self.shutdown.clone();
        debug!(artifacts = artifacts.len(), run_dir = %run_dir.display(), ?delay, "Scheduled cleanup");

        self.tracker.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {}
            }
            cleanup_now(vcs.as_ref(), &artifacts, &run_dir).await
        })
    }

    /// Waits for every scheduled cleanup. New cleanups can still be scheduled afterwards.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

/// Deletes every artifact, then the run folder. Errors become warnings.
pub async fn cleanup_now(
    vcs: &dyn VersionControl,
    artifacts: &[Artifact],
    run_dir: &Path,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    for artifact in artifacts {
        report.deleted += 1;
        let outcome = match artifact.kind {
            ArtifactKind::Checkout => vcs.delete(&artifact.path).await.map_err(|e| e.to_string()),
            ArtifactKind::TextFile => remove_file(&artifact.path).await.map_err(|e| e.to_string()),
        };
        if let Err(e) = outcome {
            warn!(path = %artifact.path.display(), error = %e, "Failed to delete artifact");
            report.warnings.push(CheckWarning::new(
                WarningKind::DeleteFailed,
                artifact.path.display().to_string(),
                e,
            ));
        }
    }

    match tokio::fs::remove_dir_all(run_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(run_dir = %run_dir.display(), error = %e, "Failed to delete run folder");
            report.warnings.push(CheckWarning::new(
                WarningKind::DeleteFailed,
                run_dir.display().to_string(),
                e.to_string(),
            ));
        }
    }

    info!(
        deleted = report.deleted,
        failed = report.warnings.len(),
        run_dir = %run_dir.display(),
        "Cleaned up plagiarism run"
    );
    report
}

async fn remove_file(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
