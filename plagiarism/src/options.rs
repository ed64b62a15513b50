use crate::error::{PlagiarismError, Result};
use serde::{Deserialize, Serialize};

/// Per-call knobs of a plagiarism check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckOptions {
    /// Percentage in [0, 100]; pairs below it are not reported.
    pub similarity_threshold: f32,
    /// Submissions scoring below this percentage are skipped. 0 disables the filter.
    pub minimum_score: u32,
    /// Tokens for programming exercises, words for text exercises. 0 disables the filter.
    pub minimum_size: u32,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: 50.0,
            minimum_score: 0,
            minimum_size: 0,
        }
    }
}

impl CheckOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.similarity_threshold.is_finite()
            || !(0.0..=100.0).contains(&self.similarity_threshold)
        {
            return Err(PlagiarismError::InvalidOptions(format!(
                "similarity threshold must be between 0 and 100, got {}",
                self.similarity_threshold
            )));
        }
        if self.minimum_score > 100 {
            return Err(PlagiarismError::InvalidOptions(format!(
                "minimum score must be between 0 and 100, got {}",
                self.minimum_score
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bounds() {
        for t in [0.0, 50.0, 100.0] {
            let o = CheckOptions { similarity_threshold: t, ..Default::default() };
            assert!(o.validate().is_ok());
        }
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        for t in [-1.0, 100.5, f32::NAN] {
            let o = CheckOptions { similarity_threshold: t, ..Default::default() };
            assert!(matches!(o.validate(), Err(PlagiarismError::InvalidOptions(_))));
        }
    }

    #[test]
    fn rejects_minimum_score_above_hundred() {
        let o = CheckOptions { minimum_score: 101, ..Default::default() };
        assert!(o.validate().is_err());
    }
}
