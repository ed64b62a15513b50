//! Cheap token counting used to skip trivially small checkouts.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use walkdir::WalkDir;

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\s{}();,=+\-*/<>!&|\[\]]+").expect("static regex")
});

/// Adds the tokens of `content` to `start`, stopping once `limit` is reached.
pub fn count_tokens(content: &str, limit: usize, start: usize) -> usize {
    let mut count = start;
    for token in SEPARATORS.split(content) {
        if count >= limit {
            break;
        }
        if !token.is_empty() {
            count += 1;
        }
    }
    count
}

/// Token count of the file at `path`. A file that cannot be read counts as `limit`.
pub fn count_tokens_in_file(path: &Path, limit: usize, start: usize) -> usize {
    match std::fs::read(path) {
        Ok(bytes) => count_tokens(&String::from_utf8_lossy(&bytes), limit, start),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not read file for token count");
            limit
        }
    }
}

/// Whether the source files under `dir` hold at least `minimum` tokens.
///
/// Only files whose lowercase name ends in one of `extensions` (given without
/// the dot) are counted. Missing directories and walk errors count as meeting
/// the minimum so a scan problem never hides a submission.
pub fn meets_minimum_size(dir: &Path, extensions: &[&str], minimum: usize) -> bool {
    if minimum == 0 || !dir.is_dir() {
        return true;
    }

    let suffixes: Vec<String> = extensions
        .iter()
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .collect();

    let mut total = 0;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Size scan failed; keeping submission");
                return true;
            }
        };
        // Symlinks are read through; a dangling one is an unreadable file.
        if entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if !suffixes.iter().any(|s| name.ends_with(s.as_str())) {
            continue;
        }
        total = count_tokens_in_file(entry.path(), minimum, total);
        if total >= minimum {
            return true;
        }
    }
    false
}
