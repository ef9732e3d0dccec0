//! Overlong-line detection

use std::path::Path;

use anyhow::Result;

use super::{Finding, Routine, Severity, read_lines};

const DEFAULT_MAX_LENGTH: usize = 120;

/// Flags lines longer than a fixed character budget.
pub struct LongLines {
    max_length: usize,
}

impl LongLines {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Default for LongLines {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LENGTH)
    }
}

impl Routine for LongLines {
    fn name(&self) -> &'static str {
        "long-lines"
    }

    fn description(&self) -> &'static str {
        "Finds lines exceeding the maximum line length"
    }

    fn run(&self, path: &Path) -> Result<Vec<Finding>> {
        let content = read_lines(path)?;
        let findings = content
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let length = line.chars().count();
                (length > self.max_length).then(|| {
                    Finding::new(
                        path,
                        index + 1,
                        format!("line is {length} characters (max {})", self.max_length),
                        Severity::Warning,
                    )
                })
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
    fn flags_only_lines_over_the_budget() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("wide.rs");
        let long = "x".repeat(130);
        fs::write(&file, format!("short\n{long}\nalso short\n")).unwrap();

        let findings = LongLines::default().run(&file).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(2));
        assert!(findings[0].message.contains("130"));
    }

    #[test]
    fn budget_is_configurable() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("narrow.rs");
        fs::write(&file, "12345678901\n").unwrap();

        assert_eq!(LongLines::new(10).run(&file).unwrap().len(), 1);
        assert!(LongLines::new(11).run(&file).unwrap().is_empty());
    }
}
