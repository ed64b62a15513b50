use crate::config;
use chrono::Utc;
use std::{fs, io, path::{Path, PathBuf}};

/// Create a directory (and all parents) if it doesn't exist, and return the path.
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> io::Result<PathBuf> {
    let p = path.as_ref();
    fs::create_dir_all(p)?;
    Ok(p.to_path_buf())
}

/// Ensure the parent directory of a *file path* exists (no-op if none).
pub fn ensure_parent_dir<P: AsRef<Path>>(file_path: P) -> io::Result<()> {
    if let Some(parent) = file_path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Absolute download root, from `config::repo_download_clone_path()`.
/// If relative in env, resolve against current_dir().
pub fn download_root() -> PathBuf {
    absolutize(PathBuf::from(config::repo_download_clone_path()))
}

fn absolutize(p: PathBuf) -> PathBuf {
    if p.is_absolute() {
        p
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(p)
    }
}

/// A fresh, uniquely named run folder below `root` (not created):
/// {root}/{yyyyMMdd-HHmmss}-{uuid}
pub fn unique_run_dir(root: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    root.join(format!("{stamp}-{}", uuid::Uuid::new_v4().simple()))
}

/// Folder that holds one programming exercise's checkouts: {run}/{project_key}
pub fn project_checkout_dir(run_dir: &Path, project_key: &str) -> PathBuf {
    run_dir.join(sanitize_segment(project_key))
}

/// A single repository checkout: {run}/{project_key}/{repo_slug}
pub fn repository_checkout_dir(run_dir: &Path, project_key: &str, repo_slug: &str) -> PathBuf {
    project_checkout_dir(run_dir, project_key).join(sanitize_segment(repo_slug))
}

/// Folder that holds serialized text submissions: {run}/{exercise_id}-text
pub fn text_submissions_dir(run_dir: &Path, exercise_id: i64) -> PathBuf {
    run_dir.join(format!("{exercise_id}-text"))
}

/// Stored filename for a text submission:
/// "{participation_id}-{submission_id}-{participant}.txt"
pub fn text_submission_filename(participation_id: i64, submission_id: i64, participant: &str) -> String {
    format!(
        "{participation_id}-{submission_id}-{}.txt",
        sanitize_segment(participant)
    )
}

/// Replace characters that must not appear in a single path segment.
pub fn sanitize_segment(s: &str) -> String {
    let cleaned: String = s
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ' ' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
