use sea_orm::DbErr;
use thiserror::Error;

/// Errors a plagiarism check can end with.
#[derive(Debug, Error)]
pub enum PlagiarismError {
    #[error("a plagiarism check is already running for course {course_id}")]
    Conflict { course_id: i64 },

    #[error("not enough submissions: {available} qualified, at least {required} are needed")]
    InsufficientData { available: usize, required: usize },

    /// The analyzer failed on the first attempt and again without the baseline.
    #[error("plagiarism analysis failed: {0}")]
    Analyzer(String),

    #[error("plagiarism checks are not supported for language '{0}'")]
    UnsupportedLanguage(String),

    #[error("exercise {0} not found")]
    ExerciseNotFound(i64),

    #[error("invalid check options: {0}")]
    InvalidOptions(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlagiarismError {
    /// Whether the message is meant for the instructor who started the check.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Database(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, PlagiarismError>;
