//! In-memory view of the data a plagiarism check reads, detached from the database.

use crate::error::{PlagiarismError, Result};
use chrono::{DateTime, Utc};
use db::models::{
    exercise::{self, ExerciseType},
    participation::{self, Role},
    submission,
};
use serde::Serialize;
use std::path::PathBuf;
use util::languages::Language;

/// What is being compared. Chosen once per check.
#[derive(Debug, Clone, PartialEq)]
pub enum ExerciseKind {
    Programming {
        language: Language,
        project_key: String,
        template_uri: Option<String>,
    },
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseInfo {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub kind: ExerciseKind,
}

impl ExerciseInfo {
    pub fn from_model(model: exercise::Model) -> Result<Self> {
        let kind = match model.exercise_type {
            ExerciseType::Text => ExerciseKind::Text,
            ExerciseType::Programming => {
                let raw = model.language.clone().unwrap_or_default();
                let language: Language = raw
                    .parse()
                    .map_err(|_| PlagiarismError::UnsupportedLanguage(raw.clone()))?;
                ExerciseKind::Programming {
                    language,
                    project_key: model
                        .project_key
                        .clone()
                        .unwrap_or_else(|| format!("exercise-{}", model.id)),
                    template_uri: model.template_repository_uri.clone(),
                }
            }
        };
        Ok(Self {
            id: model.id,
            course_id: model.course_id,
            title: model.title,
            kind,
        })
    }

    pub fn is_programming(&self) -> bool {
        matches!(self.kind, ExerciseKind::Programming { .. })
    }
}

/// Owned copy of a submission. Nothing here points back into the participation graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionSnapshot {
    pub id: i64,
    pub text: Option<String>,
    pub score: Option<f64>,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionSnapshot {
    pub fn word_count(&self) -> usize {
        self.text
            .as_deref()
            .map(|t| t.split_whitespace().count())
            .unwrap_or(0)
    }
}

impl From<submission::Model> for SubmissionSnapshot {
    fn from(m: submission::Model) -> Self {
        Self {
            id: m.id,
            text: m.text,
            score: m.score,
            submitted_at: m.submitted_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipationRecord {
    pub participation_id: i64,
    pub participant: Option<String>,
    pub role: Role,
    pub team_based: bool,
    pub practice_mode: bool,
    pub repository_uri: Option<String>,
    pub latest_submission: Option<SubmissionSnapshot>,
}

impl ParticipationRecord {
    pub fn from_models(p: participation::Model, latest: Option<submission::Model>) -> Self {
        Self {
            participation_id: p.id,
            participant: p.participant_identifier,
            role: p.role,
            team_based: p.team_id.is_some(),
            practice_mode: p.practice_mode,
            repository_uri: p.repository_uri,
            latest_submission: latest.map(Into::into),
        }
    }
}

/// A participation that passed the resource filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub participation_id: i64,
    pub participant: Option<String>,
    pub repository_uri: Option<String>,
    pub submission: SubmissionSnapshot,
}

impl Candidate {
    pub fn participant_or_unknown(&self) -> &str {
        self.participant
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or("unknown")
    }

    /// Stable, path-safe name for this candidate's artifact.
    pub fn artifact_key(&self) -> String {
        format!(
            "{}-{}",
            self.participation_id,
            util::paths::sanitize_segment(self.participant_or_unknown())
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A repository checkout directory.
    Checkout,
    /// A single file holding a text submission.
    TextFile,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactOrigin {
    Template,
    Submission {
        submission_id: i64,
        participation_id: i64,
        participant: String,
    },
}

/// Local, disposable material handed to the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub key: String,
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub origin: ArtifactOrigin,
}

impl Artifact {
    pub fn submission_id(&self) -> Option<i64> {
        match self.origin {
            ArtifactOrigin::Submission { submission_id, .. } => Some(submission_id),
            ArtifactOrigin::Template => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    CheckoutFailed,
    TemplateUnavailable,
    BelowMinimumSize,
    DeleteFailed,
    NotifyFailed,
    AnalyzerRetried,
}

/// Something that went wrong without failing the check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckWarning {
    pub kind: WarningKind,
    /// Repository, path or topic the warning is about.
    pub subject: String,
    pub message: String,
}

impl CheckWarning {
    pub fn new(kind: WarningKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}
