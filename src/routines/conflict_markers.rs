//! Unresolved merge-conflict detection

use std::path::Path;

use anyhow::Result;

use super::{Finding, Routine, Severity, read_lines};

/// Flags unresolved git merge-conflict markers.
pub struct ConflictMarkers;

fn is_conflict_marker(line: &str) -> bool {
    line.starts_with("<<<<<<< ") || line.starts_with(">>>>>>> ") || line == "======="
}

impl Routine for ConflictMarkers {
    fn name(&self) -> &'static str {
        "conflict-markers"
    }

    fn description(&self) -> &'static str {
        "Finds unresolved git merge-conflict markers"
    }

    fn run(&self, path: &Path) -> Result<Vec<Finding>> {
        let content = read_lines(path)?;
        let findings = content
            .lines()
            .enumerate()
            .filter(|(_, line)| is_conflict_marker(line))
            .map(|(index, _)| {
                Finding::new(
                    path,
                    index + 1,
                    "unresolved merge-conflict marker",
                    Severity::Error,
                )
            })
            .collect();
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn flags_all_three_marker_kinds() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("conflicted.txt");
        fs::write(
            &file,
            "ok\n<<<<<<< HEAD\nours\n=======\ntheirs\n>>>>>>> feature\nok\n",
        )
        .unwrap();

        let findings = ConflictMarkers.run(&file).unwrap();
        assert_eq!(findings.len(), 3);
        assert!(findings.iter().all(|f| f.severity == Severity::Error));
        let lines: Vec<usize> = findings.iter().filter_map(|f| f.line).collect();
        assert_eq!(lines, [2, 4, 6]);
    }

    #[test]
    fn separator_rows_longer_than_the_marker_are_ignored() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("separators.md");
        fs::write(&file, "========\ntext\n==========================\n").unwrap();

        assert!(ConflictMarkers.run(&file).unwrap().is_empty());
    }
}
