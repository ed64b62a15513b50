use super::Acquisition;
use crate::error::Result;
use crate::model::{Artifact, ArtifactKind, ArtifactOrigin, Candidate, CheckWarning, WarningKind};
use std::path::Path;
use tracing::{info, warn};
use util::paths::{text_submission_filename, text_submissions_dir};

/// Writes each candidate's text to its own file under `<run>/<exercise_id>-text/`.
///
/// A file that cannot be written is skipped with a warning; failing to create
/// the folder itself is an error.
pub async fn write_text_submissions(
    run_dir: &Path,
    exercise_id: i64,
    candidates: Vec<Candidate>,
) -> Result<Acquisition> {
    let dir = text_submissions_dir(run_dir, exercise_id);
    tokio::fs::create_dir_all(&dir).await?;

    let mut acquisition = Acquisition::default();
    for candidate in candidates {
        let participant = candidate.participant_or_unknown().to_string();
        let path = dir.join(text_submission_filename(
            candidate.participation_id,
            candidate.submission.id,
            &participant,
        ));
        let text = candidate.submission.text.as_deref().unwrap_or_default();

        if let Err(e) = tokio::fs::write(&path, text).await {
            warn!(path = %path.display(), error = %e, "Could not write text submission");
            acquisition.warnings.push(CheckWarning::new(
                WarningKind::CheckoutFailed,
                path.display().to_string(),
                e.to_string(),
            ));
            continue;
        }

        acquisition.artifacts.push(Artifact {
            key: candidate.artifact_key(),
            path,
            kind: ArtifactKind::TextFile,
            origin: ArtifactOrigin::Submission {
                submission_id: candidate.submission.id,
                participation_id: candidate.participation_id,
                participant,
            },
        });
    }

    acquisition.artifacts.sort_by_key(|a| a.submission_id());
    info!(exercise_id, written = acquisition.artifacts.len(), "Wrote text submissions");
    Ok(acquisition)
}
