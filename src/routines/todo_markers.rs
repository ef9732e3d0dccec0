//! Leftover work-marker detection

use std::path::Path;
use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use anyhow::Result;

use super::{Finding, Routine, Severity, read_lines};

const MARKERS: &[&str] = &["TODO", "FIXME", "HACK", "XXX"];

static MATCHER: LazyLock<AhoCorasick> =
    LazyLock::new(|| AhoCorasick::new(MARKERS).expect("static marker patterns compile"));

/// Flags TODO/FIXME/HACK/XXX markers left in source.
pub struct TodoMarkers;

impl Routine for TodoMarkers {
    fn name(&self) -> &'static str {
        "todo-markers"
    }

    fn description(&self) -> &'static str {
        "Finds TODO, FIXME, HACK and XXX markers left in source files"
    }

    fn run(&self, path: &Path) -> Result<Vec<Finding>> {
        let content = read_lines(path)?;
        let mut findings = Vec::new();

        for (index, line) in content.lines().enumerate() {
            if let Some(hit) = MATCHER.find(line) {
                let marker = MARKERS[hit.pattern().as_usize()];
                findings.push(Finding::new(
                    path,
                    index + 1,
                    format!("'{marker}' marker left in code"),
                    Severity::Info,
                ));
            }
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_markers_with_line_numbers() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("sample.rs");
        fs::write(&file, "fn main() {}\n// TODO: finish this\nlet x = 1; // FIXME later\n").unwrap();

        let findings = TodoMarkers.run(&file).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].line, Some(2));
        assert!(findings[0].message.contains("TODO"));
        assert_eq!(findings[1].line, Some(3));
        assert!(findings[1].message.contains("FIXME"));
    }

    #[test]
    fn clean_file_has_no_findings() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("clean.rs");
        fs::write(&file, "fn main() { println!(\"ok\"); }\n").unwrap();

        assert!(TodoMarkers.run(&file).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(TodoMarkers.run(Path::new("/definitely/not/here.rs")).is_err());
    }
}
