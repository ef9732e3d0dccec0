//! Debug-print detection for common languages

use std::path::Path;

use anyhow::Result;

use super::{Finding, Routine, Severity, read_lines};

const EXTENSIONS: &[&str] = &["rs", "py", "js", "jsx", "ts", "tsx"];

/// Flags debug print statements likely left over from development.
pub struct DebugPrints;

fn patterns_for(extension: &str) -> &'static [&'static str] {
    match extension {
        "rs" => &["dbg!(", "eprintln!("],
        "py" => &["print(", "pprint("],
        "js" | "jsx" | "ts" | "tsx" => &["console.log(", "console.debug(", "debugger"],
        _ => &[],
    }
}

impl Routine for DebugPrints {
    fn name(&self) -> &'static str {
        "debug-prints"
    }

    fn description(&self) -> &'static str {
        "Finds debug print statements left over from development"
    }

    fn extensions(&self) -> Option<&'static [&'static str]> {
        Some(EXTENSIONS)
    }

    fn run(&self, path: &Path) -> Result<Vec<Finding>> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();
        let patterns = patterns_for(&extension);
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let content = read_lines(path)?;
        let mut findings = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if let Some(pattern) = patterns.iter().find(|p| line.contains(*p)) {
                findings.push(Finding::new(
                    path,
                    index + 1,
                    format!("debug statement '{}'", pattern.trim_end_matches('(')),
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
    fn flags_language_specific_patterns() {
        let dir = TempDir::new().unwrap();
        let rust = dir.path().join("lib.rs");
        fs::write(&rust, "fn f() { dbg!(1); }\n").unwrap();
        let python = dir.path().join("app.py");
        fs::write(&python, "print(value)\n").unwrap();

        assert_eq!(DebugPrints.run(&rust).unwrap().len(), 1);
        assert_eq!(DebugPrints.run(&python).unwrap().len(), 1);
    }

    #[test]
    fn unknown_extensions_produce_nothing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.md");
        fs::write(&file, "print( is mentioned here\n").unwrap();

        assert!(DebugPrints.run(&file).unwrap().is_empty());
    }
}
