//! Plagiarism checks for programming and text exercises.
//!
//! A check takes the course lock, selects eligible submissions, puts them on
//! disk, runs the analyzer (retrying once without the template), builds the
//! result and schedules removal of everything it downloaded.

pub mod acquire;
pub mod analyzer;
pub mod cleanup;
pub mod error;
pub mod filter;
pub mod gate;
pub mod model;
pub mod options;
pub mod progress;
pub mod result;
pub mod service;
pub mod store;
pub mod tokens;
pub mod vcs;

pub use error::{PlagiarismError, Result};
pub use options::CheckOptions;
pub use result::{PlagiarismComparison, PlagiarismResult};
pub use service::{CheckReport, CheckRequest, PlagiarismDetectionService, ServiceSettings};
