//! Recursive project file listing for generation prompts.

use std::path::Path;

use anyhow::{Context, Result};
use walkdir::{DirEntry, WalkDir};

/// List files under `root` as sorted relative paths, skipping `.git` trees.
///
/// Returns at most `limit` entries; the second value is how many were left out.
pub fn list_files(root: &Path, limit: usize) -> Result<(Vec<String>, usize)> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_git_dir(entry));
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        files.push(relative.to_string_lossy().replace('\\', "/"));
    }
    files.sort();
    let omitted = files.len().saturating_sub(limit);
    files.truncate(limit);
    Ok((files, omitted))
}

fn is_git_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_string_lossy().ends_with(".git")
}
