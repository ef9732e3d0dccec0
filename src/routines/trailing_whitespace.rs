//! Trailing-whitespace detection

use std::path::Path;

use anyhow::Result;

use super::{Finding, Routine, Severity, read_lines};

/// Flags lines ending in spaces or tabs.
pub struct TrailingWhitespace;

impl Routine for TrailingWhitespace {
    fn name(&self) -> &'static str {
        "trailing-whitespace"
    }

    fn description(&self) -> &'static str {
        "Finds lines with trailing spaces or tabs"
    }

    fn run(&self, path: &Path) -> Result<Vec<Finding>> {
        let content = read_lines(path)?;
        let findings = content
            .lines()
            .enumerate()
            .filter(|(_, line)| line.ends_with(' ') || line.ends_with('\t'))
            .map(|(index, _)| {
                Finding::new(path, index + 1, "trailing whitespace", Severity::Info)
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
    fn flags_trailing_spaces_and_tabs() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pad.py");
        fs::write(&file, "clean\npadded \ntabbed\t\n").unwrap();

        let findings = TrailingWhitespace.run(&file).unwrap();
        let lines: Vec<usize> = findings.iter().filter_map(|f| f.line).collect();
        assert_eq!(lines, [2, 3]);
    }
}
