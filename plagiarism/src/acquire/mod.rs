//! Materializing submissions on local disk so the analyzer can read them.

pub mod programming;
pub mod text;

pub use programming::RepositoryAcquirer;
pub use text::write_text_submissions;

use crate::model::{Artifact, CheckWarning};

#[derive(Debug, Default)]
pub struct Acquisition {
    /// One per qualifying submission, ordered by submission id.
    pub artifacts: Vec<Artifact>,
    pub template: Option<Artifact>,
    pub warnings: Vec<CheckWarning>,
}

impl Acquisition {
    /// Everything on disk that cleanup must remove, template included.
    pub fn disposables(&self) -> Vec<Artifact> {
        self.template
            .iter()
            .chain(self.artifacts.iter())
            .cloned()
            .collect()
    }
}
