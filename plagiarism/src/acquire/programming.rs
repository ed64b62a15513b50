use super::Acquisition;
use crate::model::{Artifact, ArtifactKind, ArtifactOrigin, Candidate, CheckWarning, WarningKind};
use crate::tokens::meets_minimum_size;
use crate::vcs::{VersionControl, repo_slug};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use util::languages::Language;
use util::paths::repository_checkout_dir;

pub const TEMPLATE_KEY: &str = "template";

/// Checks out student repositories in parallel, at most `concurrency` at a time.
#[derive(Clone)]
pub struct RepositoryAcquirer {
    vcs: Arc<dyn VersionControl>,
    concurrency: usize,
    cancel: CancellationToken,
}

enum Outcome {
    Acquired(Artifact),
    Skipped(Vec<CheckWarning>),
    Cancelled,
}

impl RepositoryAcquirer {
    pub fn new(vcs: Arc<dyn VersionControl>, concurrency: usize, cancel: CancellationToken) -> Self {
        Self {
            vcs,
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    /// Checks out the template (best effort) and every candidate's repository.
    ///
    /// Failed checkouts are skipped with a warning. With `minimum_size > 0`,
    /// checkouts holding fewer tokens are deleted straight away. Once the
    /// cancellation token fires, checkouts that have not started are skipped.
    pub async fn acquire(
        &self,
        language: Language,
        project_key: &str,
        template_uri: Option<&str>,
        candidates: Vec<Candidate>,
        minimum_size: u32,
        run_dir: &Path,
    ) -> Acquisition {
        let started = Instant::now();
        let total = candidates.len();
        let mut acquisition = Acquisition::default();
        let mut used_slugs = HashSet::new();

        if let Some(uri) = template_uri {
            let target = unique_target(run_dir, project_key, uri, None, &mut used_slugs);
            match checkout_clean(self.vcs.as_ref(), uri, &target).await {
                Ok(()) => {
                    acquisition.template = Some(Artifact {
                        key: TEMPLATE_KEY.to_string(),
                        path: target,
                        kind: ArtifactKind::Checkout,
                        origin: ArtifactOrigin::Template,
                    });
                }
                Err(e) => {
                    warn!(template = uri, error = %e, "Template checkout failed; continuing without it");
                    acquisition
                        .warnings
                        .push(CheckWarning::new(WarningKind::TemplateUnavailable, uri, e));
                    discard(self.vcs.as_ref(), &target, &mut acquisition.warnings).await;
                }
            }
        }

        let extensions = language.file_extensions();
        let minimum = minimum_size as usize;
        let jobs: Vec<(Candidate, String, PathBuf)> = candidates
            .into_iter()
            .map(|candidate| {
                let uri = candidate.repository_uri.clone().unwrap_or_default();
                let target = unique_target(
                    run_dir,
                    project_key,
                    &uri,
                    Some(candidate.participation_id),
                    &mut used_slugs,
                );
                (candidate, uri, target)
            })
            .collect();

        // Checkouts live inside this future; dropping it stops them.
        let vcs = self.vcs.as_ref();
        let cancel = &self.cancel;
        let mut outcomes = stream::iter(jobs)
            .map(|(candidate, uri, target)| async move {
                if cancel.is_cancelled() {
                    return Outcome::Cancelled;
                }
                acquire_one(vcs, candidate, uri, target, extensions, minimum).await
            })
            .buffer_unordered(self.concurrency);

        let mut cancelled = 0usize;
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Outcome::Acquired(a) => acquisition.artifacts.push(a),
                Outcome::Skipped(w) => acquisition.warnings.extend(w),
                Outcome::Cancelled => cancelled += 1,
            }
        }
        acquisition.artifacts.sort_by_key(|a| a.submission_id());

        info!(
            total,
            acquired = acquisition.artifacts.len(),
            cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Repository download finished"
        );
        acquisition
    }
}

async fn acquire_one(
    vcs: &dyn VersionControl,
    candidate: Candidate,
    uri: String,
    target: PathBuf,
    extensions: &'static [&'static str],
    minimum: usize,
) -> Outcome {
    let mut warnings = Vec::new();

    if let Err(e) = checkout_clean(vcs, &uri, &target).await {
        warn!(
            participation_id = candidate.participation_id,
            repository = %uri,
            error = %e,
            "Checkout failed; skipping submission"
        );
        warnings.push(CheckWarning::new(WarningKind::CheckoutFailed, &uri, e));
        discard(vcs, &target, &mut warnings).await;
        return Outcome::Skipped(warnings);
    }

    if minimum > 0 {
        let dir = target.clone();
        let meets = tokio::task::spawn_blocking(move || meets_minimum_size(&dir, extensions, minimum))
            .await
            .unwrap_or(true);
        if !meets {
            debug!(repository = %uri, minimum, "Below minimum size; deleting checkout");
            warnings.push(CheckWarning::new(
                WarningKind::BelowMinimumSize,
                &uri,
                format!("fewer than {minimum} tokens"),
            ));
            discard(vcs, &target, &mut warnings).await;
            return Outcome::Skipped(warnings);
        }
    }

    let key = candidate.artifact_key();
    let participant = candidate.participant_or_unknown().to_string();
    Outcome::Acquired(Artifact {
        key,
        path: target,
        kind: ArtifactKind::Checkout,
        origin: ArtifactOrigin::Submission {
            submission_id: candidate.submission.id,
            participation_id: candidate.participation_id,
            participant,
        },
    })
}

async fn checkout_clean(vcs: &dyn VersionControl, uri: &str, target: &Path) -> Result<(), String> {
    vcs.checkout(uri, target).await.map_err(|e| e.to_string())?;
    vcs.reset_to_clean(target).await.map_err(|e| e.to_string())
}

async fn discard(vcs: &dyn VersionControl, target: &Path, warnings: &mut Vec<CheckWarning>) {
    if let Err(e) = vcs.delete(target).await {
        warn!(path = %target.display(), error = %e, "Failed to delete checkout");
        warnings.push(CheckWarning::new(
            WarningKind::DeleteFailed,
            target.display().to_string(),
            e.to_string(),
        ));
    }
}

/// `<run>/<project_key>/<slug>`, suffixed with the participation id (and a counter)
/// until the folder name is unused.
fn unique_target(
    run_dir: &Path,
    project_key: &str,
    uri: &str,
    participation_id: Option<i64>,
    used: &mut HashSet<String>,
) -> PathBuf {
    let base = repo_slug(uri);
    let suffix = match participation_id {
        Some(id) => id.to_string(),
        None => TEMPLATE_KEY.to_string(),
    };
    let mut slug = base.clone();
    let mut attempt = 0u32;
    while !used.insert(slug.clone()) {
        attempt += 1;
        slug = match attempt {
            1 => format!("{base}-{suffix}"),
            n => format!("{base}-{suffix}-{n}"),
        };
    }
    repository_checkout_dir(run_dir, project_key, &slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubmissionSnapshot;
    use crate::vcs::VcsError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writes `tokens` words of Java into each checkout; URIs containing "broken" fail.
    #[derive(Default)]
    struct FakeVcs {
        tokens: usize,
        started: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl VersionControl for FakeVcs {
        async fn checkout(&self, uri: &str, target: &Path) -> Result<(), VcsError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if uri.contains("broken") {
                return Err(VcsError::CommandFailed {
                    command: "git clone".into(),
                    status: 128,
                    stderr: "repository not found".into(),
                });
            }
            tokio::fs::create_dir_all(target).await?;
            tokio::fs::write(target.join("Main.java"), "x ".repeat(self.tokens)).await?;
            Ok(())
        }

        async fn reset_to_clean(&self, _dir: &Path) -> Result<(), VcsError> {
            Ok(())
        }

        async fn delete(&self, dir: &Path) -> Result<(), VcsError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            match tokio::fs::remove_dir_all(dir).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            }
        }
    }

    fn candidate(id: i64, uri: &str) -> Candidate {
        Candidate {
            participation_id: id,
            participant: Some(format!("u{id}")),
            repository_uri: Some(uri.to_string()),
            submission: SubmissionSnapshot {
                id: 100 + id,
                text: None,
                score: None,
                submitted_at: Utc::now(),
            },
        }
    }

    fn candidates(n: i64) -> Vec<Candidate> {
        (1..=n)
            .map(|i| candidate(i, &format!("https://git.example.org/p/p-u{i}.git")))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fan_out_is_bounded() {
        let td = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs { tokens: 5, ..Default::default() });
        let acquirer = RepositoryAcquirer::new(vcs.clone(), 3, CancellationToken::new());

        let acq = acquirer
            .acquire(Language::Java, "P", None, candidates(12), 0, td.path())
            .await;

        assert_eq!(acq.artifacts.len(), 12);
        let max = vcs.max_active.load(Ordering::SeqCst);
        assert!(max <= 3, "saw {max} concurrent checkouts");
        assert!(max >= 2, "checkouts never overlapped");
        let ids: Vec<_> = acq.artifacts.iter().filter_map(|a| a.submission_id()).collect();
        assert_eq!(ids, (101..=112).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failures_and_small_repos_are_skipped() {
        let td = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs { tokens: 3, ..Default::default() });
        let acquirer = RepositoryAcquirer::new(vcs.clone(), 4, CancellationToken::new());

        let mut list = candidates(2);
        list.push(candidate(3, "https://git.example.org/p/broken.git"));
        let acq = acquirer
            .acquire(Language::Java, "P", None, list, 10, td.path())
            .await;

        assert!(acq.artifacts.is_empty());
        let kinds: Vec<_> = acq.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds.iter().filter(|k| **k == WarningKind::BelowMinimumSize).count(), 2);
        assert_eq!(kinds.iter().filter(|k| **k == WarningKind::CheckoutFailed).count(), 1);
        assert!(!td.path().join("P").join("p-u1").exists());
    }

    #[tokio::test]
    async fn template_failure_is_not_fatal() {
        let td = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs { tokens: 50, ..Default::default() });
        let acquirer = RepositoryAcquirer::new(vcs, 2, CancellationToken::new());

        let acq = acquirer
            .acquire(
                Language::Java,
                "P",
                Some("https://git.example.org/p/broken-template.git"),
                candidates(2),
                10,
                td.path(),
            )
            .await;

        assert!(acq.template.is_none());
        assert_eq!(acq.artifacts.len(), 2);
        assert_eq!(acq.warnings[0].kind, WarningKind::TemplateUnavailable);
    }

    #[tokio::test]
    async fn template_is_checked_out_once() {
        let td = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs { tokens: 50, ..Default::default() });
        let acquirer = RepositoryAcquirer::new(vcs, 2, CancellationToken::new());

        let acq = acquirer
            .acquire(
                Language::Java,
                "P",
                Some("https://git.example.org/p/p-exercise.git"),
                candidates(2),
                0,
                td.path(),
            )
            .await;

        let template = acq.template.as_ref().unwrap();
        assert_eq!(template.key, TEMPLATE_KEY);
        assert_eq!(template.path, td.path().join("P").join("p-exercise"));
        assert_eq!(acq.disposables().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_token_skips_pending_checkouts() {
        let td = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs { tokens: 5, ..Default::default() });
        let token = CancellationToken::new();
        token.cancel();
        let acquirer = RepositoryAcquirer::new(vcs.clone(), 2, token);

        let acq = acquirer
            .acquire(Language::Java, "P", None, candidates(4), 0, td.path())
            .await;
        assert!(acq.artifacts.is_empty());
        assert_eq!(vcs.max_active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn duplicate_slugs_get_distinct_folders() {
        let run = PathBuf::from("/run");
        let mut used = HashSet::new();
        let a = unique_target(&run, "P", "https://h/a/repo.git", Some(1), &mut used);
        let b = unique_target(&run, "P", "https://h/b/repo.git", Some(2), &mut used);
        assert_eq!(a, run.join("P").join("repo"));
        assert_eq!(b, run.join("P").join("repo-2"));
    }

    #[test]
    fn fallback_folder_is_never_shared() {
        let run = PathBuf::from("/run");
        let mut used = HashSet::new();
        let a = unique_target(&run, "P", "https://h/a/repo.git", Some(1), &mut used);
        let b = unique_target(&run, "P", "https://h/b/repo-3.git", Some(2), &mut used);
        let c = unique_target(&run, "P", "https://h/c/repo.git", Some(3), &mut used);

        assert_eq!(b, run.join("P").join("repo-3"));
        assert_ne!(b, c);
        assert_ne!(a, c);
        assert_eq!(c, run.join("P").join("repo-3-2"));

        let t = unique_target(&run, "P", "https://h/t/repo.git", None, &mut used);
        assert_eq!(t, run.join("P").join("repo-template"));
        let t2 = unique_target(&run, "P", "https://h/u/repo.git", None, &mut used);
        assert_eq!(t2, run.join("P").join("repo-template-2"));
    }

    #[tokio::test]
    async fn dropping_the_acquisition_stops_pending_checkouts() {
        let td = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs { tokens: 5, ..Default::default() });
        let acquirer = RepositoryAcquirer::new(vcs.clone(), 1, CancellationToken::new());

        let cut_short = tokio::time::timeout(
            Duration::from_millis(30),
            acquirer.acquire(Language::Java, "P", None, candidates(5), 0, td.path()),
        )
        .await;
        assert!(cut_short.is_err());

        let started = vcs.started.load(Ordering::SeqCst);
        assert!(started <= 2, "{started} checkouts started");
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(vcs.started.load(Ordering::SeqCst), started);
    }
}
