//! Version-control primitives needed to materialize repository artifacts.

pub mod git;

pub use git::GitCli;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
}

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Makes a local copy of `repository_uri` at `target`, reusing an existing checkout.
    async fn checkout(&self, repository_uri: &str, target: &Path) -> Result<(), VcsError>;

    /// Discards local changes and untracked files in the checkout at `dir`.
    async fn reset_to_clean(&self, dir: &Path) -> Result<(), VcsError>;

    /// Removes the checkout at `dir`. A missing directory is not an error.
    async fn delete(&self, dir: &Path) -> Result<(), VcsError>;
}

/// Folder name for a repository: the last path segment of its URI without `.git`.
pub fn repo_slug(uri: &str) -> String {
    let trimmed = uri.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    let slug = last.strip_suffix(".git").unwrap_or(last);
    util::paths::sanitize_segment(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_strips_host_and_suffix() {
        assert_eq!(repo_slug("https://git.example.org/scm/PROG1/prog1-ab12.git"), "prog1-ab12");
        assert_eq!(repo_slug("git@example.org:course/prog1-exercise.git/"), "prog1-exercise");
        assert_eq!(repo_slug("/srv/repos/local"), "local");
        assert_eq!(repo_slug(""), "_");
    }
}
