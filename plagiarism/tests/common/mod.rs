#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use db::models::participation::Role;
use plagiarism::analyzer::{
    Analyzer, AnalyzerError, AnalyzerRequest, RawComparison, RawComparisonSet,
};
use plagiarism::error::{PlagiarismError, Result};
use plagiarism::gate::InMemoryLockStore;
use plagiarism::model::{ExerciseInfo, ExerciseKind, ParticipationRecord, SubmissionSnapshot};
use plagiarism::progress::{Notifier, NotifyError, Phase, ProgressPayload};
use plagiarism::store::PlagiarismStore;
use plagiarism::vcs::{VcsError, VersionControl};
use plagiarism::{PlagiarismDetectionService, PlagiarismResult, ServiceSettings};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use util::languages::Language;

pub const COURSE: i64 = 1;

#[derive(Default)]
pub struct FakeStore {
    pub exercises: Mutex<HashMap<i64, ExerciseInfo>>,
    pub participations: Mutex<HashMap<i64, Vec<ParticipationRecord>>>,
    pub saved: Mutex<Vec<PlagiarismResult>>,
}

impl FakeStore {
    pub fn add_exercise(&self, info: ExerciseInfo, records: Vec<ParticipationRecord>) {
        self.participations.lock().unwrap().insert(info.id, records);
        self.exercises.lock().unwrap().insert(info.id, info);
    }
}

#[async_trait]
impl PlagiarismStore for FakeStore {
    async fn load_exercise(&self, exercise_id: i64) -> Result<ExerciseInfo> {
        self.exercises
            .lock()
            .unwrap()
            .get(&exercise_id)
            .cloned()
            .ok_or(PlagiarismError::ExerciseNotFound(exercise_id))
    }

    async fn load_participations(&self, exercise_id: i64) -> Result<Vec<ParticipationRecord>> {
        Ok(self
            .participations
            .lock()
            .unwrap()
            .get(&exercise_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_result(&self, result: &PlagiarismResult) -> Result<()> {
        self.saved.lock().unwrap().push(result.clone());
        Ok(())
    }
}

/// Writes `tokens` Java tokens per checkout. URIs containing "broken" fail.
pub struct FakeVcs {
    pub tokens: usize,
    pub latency: Duration,
    pub checkouts: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub deleted: Mutex<Vec<PathBuf>>,
}

impl FakeVcs {
    pub fn new(tokens: usize) -> Self {
        Self {
            tokens,
            latency: Duration::from_millis(5),
            checkouts: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn delete_count(&self) -> usize {
        self.deleted.lock().unwrap().len()
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn checkout(&self, uri: &str, target: &Path) -> std::result::Result<(), VcsError> {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if uri.contains("broken") {
            return Err(VcsError::CommandFailed {
                command: format!("git clone {uri}"),
                status: 128,
                stderr: "fatal: repository not found".into(),
            });
        }
        tokio::fs::create_dir_all(target).await?;
        tokio::fs::write(target.join("Main.java"), "tok ".repeat(self.tokens)).await?;
        Ok(())
    }

    async fn reset_to_clean(&self, _dir: &Path) -> std::result::Result<(), VcsError> {
        Ok(())
    }

    async fn delete(&self, dir: &Path) -> std::result::Result<(), VcsError> {
        self.deleted.lock().unwrap().push(dir.to_path_buf());
        match tokio::fs::remove_dir_all(dir).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Fails the first `failures` calls, then reports every neighbouring input pair at `similarity`.
pub struct ScriptedAnalyzer {
    pub failures: usize,
    pub similarity: f32,
    pub calls: Mutex<Vec<AnalyzerRequest>>,
    /// When set, `analyze` signals `entered` and waits for `release`.
    pub pause: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedAnalyzer {
    pub fn new(failures: usize, similarity: f32) -> Self {
        Self {
            failures,
            similarity,
            calls: Mutex::new(Vec::new()),
            pause: None,
        }
    }

    pub fn paused(entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            pause: Some((entered, release)),
            ..Self::new(0, 0.9)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn request(&self, i: usize) -> AnalyzerRequest {
        self.calls.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze(
        &self,
        request: &AnalyzerRequest,
    ) -> std::result::Result<RawComparisonSet, AnalyzerError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.len()
        };
        if let Some((entered, release)) = &self.pause {
            entered.notify_one();
            release.notified().await;
        }
        if attempt <= self.failures {
            return Err(AnalyzerError::Rejected(format!("attempt {attempt} failed")));
        }
        let comparisons = request
            .inputs
            .windows(2)
            .map(|w| RawComparison {
                key_a: w[0].key.clone(),
                key_b: w[1].key.clone(),
                similarity: self.similarity,
            })
            .filter(|c| c.similarity >= request.threshold)
            .collect();
        Ok(RawComparisonSet { comparisons })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(String, Phase, Vec<String>)>>,
}

impl RecordingNotifier {
    pub fn messages(&self, topic: &str) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| t == topic)
            .flat_map(|(_, _, m)| m.clone())
            .collect()
    }

    pub fn phases(&self, topic: &str) -> Vec<Phase> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, p, _)| *p)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, topic: &str, payload: &ProgressPayload) -> std::result::Result<(), NotifyError> {
        self.events
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.state, payload.messages.clone()));
        Ok(())
    }
}

pub fn programming_exercise(id: i64, template_uri: Option<&str>) -> ExerciseInfo {
    ExerciseInfo {
        id,
        course_id: COURSE,
        title: format!("Exercise {id}"),
        kind: ExerciseKind::Programming {
            language: Language::Java,
            project_key: format!("EX{id}"),
            template_uri: template_uri.map(str::to_string),
        },
    }
}

pub fn text_exercise(id: i64) -> ExerciseInfo {
    ExerciseInfo {
        id,
        course_id: COURSE,
        title: format!("Essay {id}"),
        kind: ExerciseKind::Text,
    }
}

pub fn student(id: i64, score: Option<f64>) -> ParticipationRecord {
    ParticipationRecord {
        participation_id: id,
        participant: Some(format!("student{id}")),
        role: Role::Student,
        team_based: false,
        practice_mode: false,
        repository_uri: Some(format!("https://git.example.org/scm/ex/ex-student{id}.git")),
        latest_submission: Some(SubmissionSnapshot {
            id: 1000 + id,
            text: Some(format!("essay number {id} with some shared words")),
            score,
            submitted_at: Utc::now(),
        }),
    }
}

pub fn students(n: i64) -> Vec<ParticipationRecord> {
    (1..=n).map(|i| student(i, Some(100.0))).collect()
}

pub struct Harness {
    pub work: TempDir,
    pub store: Arc<FakeStore>,
    pub locks: Arc<InMemoryLockStore>,
    pub vcs: Arc<FakeVcs>,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: Arc<PlagiarismDetectionService>,
}

impl Harness {
    pub fn new(analyzer: ScriptedAnalyzer) -> Self {
        Self::with(analyzer, FakeVcs::new(50), 4, Duration::ZERO)
    }

    pub fn with(
        analyzer: ScriptedAnalyzer,
        vcs: FakeVcs,
        concurrency: usize,
        cleanup_delay: Duration,
    ) -> Self {
        let work = TempDir::new().unwrap();
        let store = Arc::new(FakeStore::default());
        let locks = Arc::new(InMemoryLockStore::new());
        let vcs = Arc::new(vcs);
        let analyzer = Arc::new(analyzer);
        let notifier = Arc::new(RecordingNotifier::default());
        let service = Arc::new(PlagiarismDetectionService::new(
            store.clone(),
            locks.clone(),
            vcs.clone(),
            analyzer.clone(),
            notifier.clone(),
            ServiceSettings {
                work_root: work.path().to_path_buf(),
                acquire_concurrency: concurrency,
                cleanup_delay,
                max_comparisons: 500,
            },
        ));
        Self {
            work,
            store,
            locks,
            vcs,
            analyzer,
            notifier,
            service,
        }
    }

    /// Entries left in the work root.
    pub fn leftovers(&self) -> usize {
        std::fs::read_dir(self.work.path()).map(|d| d.count()).unwrap_or(0)
    }
}
