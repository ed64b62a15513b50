//! Orchestrates a plagiarism check from gate to cleanup.

use crate::acquire::{Acquisition, RepositoryAcquirer, write_text_submissions};
use crate::analyzer::{
    Analyzer, AnalyzerInput, AnalyzerLanguage, AnalyzerRequest, invoke_with_fallback,
    threshold_to_unit,
};
use crate::cleanup::{CleanupReport, CleanupScheduler};
use crate::error::{PlagiarismError, Result};
use crate::filter::select_eligible;
use crate::gate::{ExclusivityGate, LockStore};
use crate::model::{CheckWarning, ExerciseInfo, ExerciseKind, WarningKind};
use crate::options::CheckOptions;
use crate::progress::{Notifier, ProgressReporter};
use crate::result::{PlagiarismResult, assemble};
use crate::store::PlagiarismStore;
use crate::vcs::VersionControl;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// A comparison needs at least this many artifacts.
pub const MINIMUM_ARTIFACTS: usize = 2;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Per-run folders are created below this root.
    pub work_root: PathBuf,
    pub acquire_concurrency: usize,
    pub cleanup_delay: Duration,
    pub max_comparisons: usize,
}

impl ServiceSettings {
    pub fn from_config() -> Self {
        Self {
            work_root: util::paths::download_root(),
            acquire_concurrency: util::config::acquire_concurrency(),
            cleanup_delay: Duration::from_secs(util::config::cleanup_delay_secs()),
            max_comparisons: util::config::max_comparisons(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckRequest {
    pub exercise_id: i64,
    pub options: CheckOptions,
}

/// Outcome of a finished check.
#[derive(Debug)]
pub struct CheckReport {
    pub result: PlagiarismResult,
    pub warnings: Vec<CheckWarning>,
    /// Resolves once the run's files are gone.
    pub cleanup: JoinHandle<CleanupReport>,
}

pub struct PlagiarismDetectionService {
    store: Arc<dyn PlagiarismStore>,
    gate: ExclusivityGate,
    vcs: Arc<dyn VersionControl>,
    analyzer: Arc<dyn Analyzer>,
    notifier: Arc<dyn Notifier>,
    settings: ServiceSettings,
    shutdown: CancellationToken,
    cleanup: CleanupScheduler,
}

impl PlagiarismDetectionService {
    pub fn new(
        store: Arc<dyn PlagiarismStore>,
        locks: Arc<dyn LockStore>,
        vcs: Arc<dyn VersionControl>,
        analyzer: Arc<dyn Analyzer>,
        notifier: Arc<dyn Notifier>,
        settings: ServiceSettings,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let cleanup = CleanupScheduler::new(Arc::clone(&vcs), settings.cleanup_delay, shutdown.clone());
        Self {
            store,
            gate: ExclusivityGate::new(locks),
            vcs,
            analyzer,
            notifier,
            settings,
            shutdown,
            cleanup,
        }
    }

    /// Runs the check matching the exercise's kind.
    pub async fn check(&self, exercise_id: i64, options: CheckOptions) -> Result<CheckReport> {
        options.validate()?;
        let exercise = self.store.load_exercise(exercise_id).await?;
        self.run_gated(exercise, options).await
    }

    pub async fn check_programming_plagiarism(
        &self,
        exercise_id: i64,
        options: CheckOptions,
    ) -> Result<CheckReport> {
        options.validate()?;
        let exercise = self.store.load_exercise(exercise_id).await?;
        if !exercise.is_programming() {
            return Err(PlagiarismError::InvalidOptions(format!(
                "exercise {exercise_id} is not a programming exercise"
            )));
        }
        self.run_gated(exercise, options).await
    }

    pub async fn check_text_plagiarism(
        &self,
        exercise_id: i64,
        options: CheckOptions,
    ) -> Result<CheckReport> {
        options.validate()?;
        let exercise = self.store.load_exercise(exercise_id).await?;
        if exercise.is_programming() {
            return Err(PlagiarismError::InvalidOptions(format!(
                "exercise {exercise_id} is not a text exercise"
            )));
        }
        self.run_gated(exercise, options).await
    }

    /// Runs a check in the background and stores its result.
    ///
    /// When there is not enough to compare, an empty result is stored before the
    /// error is returned, so the exercise shows that nothing was compared.
    pub fn spawn_check(self: &Arc<Self>, request: CheckRequest) -> JoinHandle<Result<CheckReport>> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            match service.check(request.exercise_id, request.options).await {
                Ok(report) => {
                    service.store.save_result(&report.result).await?;
                    Ok(report)
                }
                Err(e @ PlagiarismError::InsufficientData { .. }) => {
                    service
                        .store
                        .save_result(&PlagiarismResult::empty(request.exercise_id))
                        .await?;
                    Err(e)
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Stops new checkouts, runs pending cleanups now and waits for them.
    pub async fn shutdown(&self) {
        info!("Shutting down plagiarism service");
        self.shutdown.cancel();
        self.cleanup.wait_idle().await;
    }

    #[instrument(skip(self, exercise, options), fields(exercise_id = exercise.id, course_id = exercise.course_id))]
    async fn run_gated(&self, exercise: ExerciseInfo, options: CheckOptions) -> Result<CheckReport> {
        if let ExerciseKind::Programming { language, .. } = &exercise.kind {
            if !language.supports_plagiarism() {
                return Err(PlagiarismError::UnsupportedLanguage(language.to_string()));
            }
        }

        let guard = self.gate.try_enter(exercise.course_id).await?;
        let reporter = ProgressReporter::new(Arc::clone(&self.notifier), exercise.id);

        let outcome = self.run(&exercise, &options, &reporter).await;

        match &outcome {
            Ok(report) => {
                reporter.completed(Vec::new()).await;
                info!(
                    comparisons = report.result.comparisons.len(),
                    warnings = report.warnings.len(),
                    duration_ms = report.result.duration_ms,
                    "Plagiarism check finished"
                );
            }
            Err(e) => {
                reporter.completed(vec![e.to_string()]).await;
                error!(error = %e, "Plagiarism check failed");
            }
        }
        guard.leave().await;

        outcome.map(|mut report| {
            report.warnings.extend(reporter.take_warnings());
            report
        })
    }

    async fn run(
        &self,
        exercise: &ExerciseInfo,
        options: &CheckOptions,
        reporter: &ProgressReporter,
    ) -> Result<CheckReport> {
        let started = Instant::now();

        let records = self.store.load_participations(exercise.id).await?;
        let candidates = select_eligible(records, &exercise.kind, options);
        if candidates.len() < MINIMUM_ARTIFACTS {
            return Err(PlagiarismError::InsufficientData {
                available: candidates.len(),
                required: MINIMUM_ARTIFACTS,
            });
        }
        // Programming checks count the template as one more repository.
        let total = match exercise.kind {
            ExerciseKind::Programming { .. } => candidates.len() + 1,
            ExerciseKind::Text => candidates.len(),
        };

        let run_dir = util::paths::unique_run_dir(&self.settings.work_root);
        util::paths::ensure_dir(&run_dir)?;

        let (acquisition, language) = match &exercise.kind {
            ExerciseKind::Programming {
                language,
                project_key,
                template_uri,
            } => {
                reporter.running(format!("Downloading repositories: 0/{total}")).await;
                let acquirer = RepositoryAcquirer::new(
                    Arc::clone(&self.vcs),
                    self.settings.acquire_concurrency,
                    self.shutdown.clone(),
                );
                let acquisition = acquirer
                    .acquire(
                        *language,
                        project_key,
                        template_uri.as_deref(),
                        candidates,
                        options.minimum_size,
                        &run_dir,
                    )
                    .await;
                (acquisition, AnalyzerLanguage::Program(*language))
            }
            ExerciseKind::Text => {
                match write_text_submissions(&run_dir, exercise.id, candidates).await {
                    Ok(a) => (a, AnalyzerLanguage::Text),
                    Err(e) => {
                        drop(self.cleanup.schedule(Vec::new(), run_dir));
                        return Err(e);
                    }
                }
            }
        };
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            acquired = acquisition.artifacts.len(),
            "Acquisition finished"
        );
        let valid = acquisition.artifacts.len() + usize::from(acquisition.template.is_some());
        reporter
            .running(format!("Processing repositories: {valid} valid out of {total} total"))
            .await;

        let analysis = self.analyze(&acquisition, language, options, reporter).await;
        let cleanup = self.cleanup.schedule(acquisition.disposables(), run_dir);

        let (raw, retried) = analysis?;
        let mut warnings = acquisition.warnings;
        if let Some(first) = retried {
            warnings.push(CheckWarning::new(
                WarningKind::AnalyzerRetried,
                self.analyzer.name(),
                first,
            ));
        }

        let result = assemble(
            raw,
            &acquisition.artifacts,
            exercise.id,
            started.elapsed(),
            self.settings.max_comparisons,
        );
        Ok(CheckReport {
            result,
            warnings,
            cleanup,
        })
    }

    async fn analyze(
        &self,
        acquisition: &Acquisition,
        language: AnalyzerLanguage,
        options: &CheckOptions,
        reporter: &ProgressReporter,
    ) -> Result<(crate::analyzer::RawComparisonSet, Option<String>)> {
        if acquisition.artifacts.len() < MINIMUM_ARTIFACTS {
            return Err(PlagiarismError::InsufficientData {
                available: acquisition.artifacts.len(),
                required: MINIMUM_ARTIFACTS,
            });
        }

        reporter.running("Running analyzer...").await;
        let started = Instant::now();
        let request = AnalyzerRequest {
            language,
            inputs: acquisition
                .artifacts
                .iter()
                .map(|a| AnalyzerInput {
                    key: a.key.clone(),
                    path: a.path.clone(),
                })
                .collect(),
            baseline: acquisition.template.as_ref().map(|t| t.path.clone()),
            threshold: threshold_to_unit(options.similarity_threshold),
            clustering: false,
        };
        let invocation = invoke_with_fallback(self.analyzer.as_ref(), request).await?;
        info!(
            analyzer = self.analyzer.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            pairs = invocation.comparisons.comparisons.len(),
            "Analyzer finished"
        );
        Ok((invocation.comparisons, invocation.first_failure))
    }
}
