//! Boundary to the external similarity engine.

pub mod moss;

pub use moss::MossAnalyzer;

use crate::error::PlagiarismError;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};
use util::languages::Language;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The engine refused the request (language, account, too few inputs).
    #[error("analyzer rejected the request: {0}")]
    Rejected(String),

    #[error("analyzer protocol error: {0}")]
    Protocol(String),

    #[error("analyzer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not read analyzer report: {0}")]
    Report(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerLanguage {
    Program(Language),
    Text,
}

/// One artifact root as the analyzer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerInput {
    pub key: String,
    /// A directory (checkout) or a single file (text submission).
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerRequest {
    pub language: AnalyzerLanguage,
    pub inputs: Vec<AnalyzerInput>,
    /// Template code whose matches are not counted.
    pub baseline: Option<PathBuf>,
    /// Minimum similarity in [0.0, 1.0].
    pub threshold: f32,
    /// Always false here.
    pub clustering: bool,
}

/// A pair reported by the analyzer, keyed by `AnalyzerInput::key`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawComparison {
    pub key_a: String,
    pub key_b: String,
    /// In [0.0, 1.0].
    pub similarity: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawComparisonSet {
    pub comparisons: Vec<RawComparison>,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, request: &AnalyzerRequest) -> Result<RawComparisonSet, AnalyzerError>;
}

/// Converts a percentage in [0, 100] to the analyzer's [0.0, 1.0] scale.
pub fn threshold_to_unit(percent: f32) -> f32 {
    percent / 100.0
}

/// Outcome of `invoke_with_fallback`.
#[derive(Debug)]
pub struct Invocation {
    pub comparisons: RawComparisonSet,
    /// Error of the first attempt when the result came from the retry without baseline.
    pub first_failure: Option<String>,
}

/// Runs the analyzer; on failure runs it exactly once more without the baseline.
pub async fn invoke_with_fallback(
    analyzer: &dyn Analyzer,
    mut request: AnalyzerRequest,
) -> Result<Invocation, PlagiarismError> {
    request.clustering = false;

    let first = match analyzer.analyze(&request).await {
        Ok(comparisons) => {
            return Ok(Invocation {
                comparisons,
                first_failure: None,
            });
        }
        Err(e) => e,
    };

    warn!(
        analyzer = analyzer.name(),
        error = %first,
        had_baseline = request.baseline.is_some(),
        "Analyzer failed, retrying without template"
    );
    request.baseline = None;

    match analyzer.analyze(&request).await {
        Ok(comparisons) => Ok(Invocation {
            comparisons,
            first_failure: Some(first.to_string()),
        }),
        Err(second) => {
            error!(analyzer = analyzer.name(), error = %second, "Analyzer failed again");
            Err(PlagiarismError::Analyzer(second.to_string()))
        }
    }
}
