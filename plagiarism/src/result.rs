//! Domain form of a finished comparison.

use crate::analyzer::RawComparisonSet;
use crate::model::Artifact;
use chrono::{DateTime, Utc};
use db::models::plagiarism_comparison::ComparisonStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

pub const HISTOGRAM_BUCKETS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlagiarismComparison {
    /// Always the smaller of the two ids.
    pub submission_a: i64,
    pub submission_b: i64,
    /// Percentage in [0, 100].
    pub similarity: f32,
    pub status: ComparisonStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlagiarismResult {
    pub exercise_id: i64,
    pub comparisons: Vec<PlagiarismComparison>,
    /// Ten buckets of ten percentage points, or empty when nothing was compared.
    pub similarity_distribution: Vec<u32>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl PlagiarismResult {
    /// Result of a check that never reached the analyzer.
    pub fn empty(exercise_id: i64) -> Self {
        Self {
            exercise_id,
            comparisons: Vec::new(),
            similarity_distribution: Vec::new(),
            duration_ms: 0,
            created_at: Utc::now(),
        }
    }

    /// False for `empty` results, true once the analyzer produced output (even with no pairs).
    pub fn analyzer_ran(&self) -> bool {
        !self.similarity_distribution.is_empty()
    }
}

/// Ten-bucket histogram of percentages; 100 lands in the last bucket.
pub fn similarity_histogram(similarities: impl IntoIterator<Item = f32>) -> [u32; HISTOGRAM_BUCKETS] {
    let mut buckets = [0u32; HISTOGRAM_BUCKETS];
    for s in similarities {
        let idx = ((s.clamp(0.0, 100.0) / 10.0) as usize).min(HISTOGRAM_BUCKETS - 1);
        buckets[idx] += 1;
    }
    buckets
}

/// Maps analyzer keys back to submissions and builds the result.
///
/// Pairs involving unknown keys (the template) or a submission with itself are
/// dropped; duplicate pairs keep the highest similarity. The histogram covers
/// every pair, the comparison list only the top `max_comparisons`.
pub fn assemble(
    raw: RawComparisonSet,
    artifacts: &[Artifact],
    exercise_id: i64,
    duration: Duration,
    max_comparisons: usize,
) -> PlagiarismResult {
    let by_key: HashMap<&str, i64> = artifacts
        .iter()
        .filter_map(|a| Some((a.key.as_str(), a.submission_id()?)))
        .collect();

    let mut best: HashMap<(i64, i64), f32> = HashMap::new();
    for c in raw.comparisons {
        let (Some(&a), Some(&b)) = (by_key.get(c.key_a.as_str()), by_key.get(c.key_b.as_str())) else {
            continue;
        };
        if a == b {
            continue;
        }
        let pair = (a.min(b), a.max(b));
        let pct = (c.similarity * 100.0).clamp(0.0, 100.0);
        best.entry(pair)
            .and_modify(|s| *s = s.max(pct))
            .or_insert(pct);
    }

    let mut comparisons: Vec<PlagiarismComparison> = best
        .into_iter()
        .map(|((a, b), similarity)| PlagiarismComparison {
            submission_a: a,
            submission_b: b,
            similarity,
            status: ComparisonStatus::None,
        })
        .collect();

    let distribution = similarity_histogram(comparisons.iter().map(|c| c.similarity));

    comparisons.sort_by(|x, y| {
        y.similarity
            .total_cmp(&x.similarity)
            .then(x.submission_a.cmp(&y.submission_a))
            .then(x.submission_b.cmp(&y.submission_b))
    });
    comparisons.truncate(max_comparisons);

    PlagiarismResult {
        exercise_id,
        comparisons,
        similarity_distribution: distribution.to_vec(),
        duration_ms: i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
        created_at: Utc::now(),
    }
}
