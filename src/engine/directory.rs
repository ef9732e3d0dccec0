//! Candidate file collection
//!
//! Walks the workspace honoring gitignore rules, skips the standard
//! build/dependency directories, and keeps only files with configured
//! extensions. Returns absolute paths.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

use crate::config::EngineConfig;

/// Directories that never contain analyzable sources, by ecosystem.
const EXCLUDED_DIRS: &[&str] = &[
    // Rust
    "target",
    // Node.js
    "node_modules",
    "dist",
    "build",
    ".next",
    ".nuxt",
    // Python
    "__pycache__",
    ".pytest_cache",
    "venv",
    ".venv",
    // Go / Java
    "vendor",
    "out",
    // VCS and editors
    ".git",
    ".svn",
    ".hg",
    ".vscode",
    ".idea",
    // Generic caches and coverage
    "cache",
    ".cache",
    "tmp",
    ".tmp",
    "coverage",
    ".nyc_output",
];

/// Collect all candidate files under `root` for analysis.
pub fn collect_files(root: &Path, config: &EngineConfig) -> Result<Vec<PathBuf>> {
    let root = root
        .canonicalize()
        .with_context(|| format!("workspace root not found: {}", root.display()))?;

    let mut builder = WalkBuilder::new(&root);
    builder
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .follow_links(config.follow_symlinks)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            !(is_dir && EXCLUDED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref()))
        });

    let mut files = Vec::new();
    for entry in builder.build() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_some_and(|ft| ft.is_file())
                    && matches_extensions(entry.path(), &config.extensions)
                {
                    files.push(entry.into_path());
                }
            }
            Err(e) => {
                // Permission errors and dangling links are skipped, not fatal
                tracing::debug!("skipping unreadable path: {e}");
            }
        }
    }
    files.sort_unstable();
    Ok(files)
}

fn matches_extensions(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .is_some_and(|ext| extensions.iter().any(|allowed| *allowed == ext))
}
