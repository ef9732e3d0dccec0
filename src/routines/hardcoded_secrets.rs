//! Hardcoded credential detection

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use super::{Finding, Routine, Severity, read_lines};

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(api[_-]?key|secret|password|passwd|token|auth)\b\s*[:=]\s*["'][^"']{8,}["']"#)
        .expect("static secret pattern compiles")
});

/// Markers that mark a line as a deliberate placeholder, not a leak.
const PLACEHOLDERS: &[&str] = &["example", "changeme", "your-", "xxxx", "<", "${", "{{"];

/// Flags string literals that look like hardcoded credentials.
pub struct HardcodedSecrets;

impl Routine for HardcodedSecrets {
    fn name(&self) -> &'static str {
        "hardcoded-secrets"
    }

    fn description(&self) -> &'static str {
        "Finds string literals that look like hardcoded credentials"
    }

    fn run(&self, path: &Path) -> Result<Vec<Finding>> {
        let content = read_lines(path)?;
        let mut findings = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let Some(capture) = ASSIGNMENT.captures(line) else {
                continue;
            };
            let lowered = line.to_lowercase();
            if PLACEHOLDERS.iter().any(|p| lowered.contains(p)) {
                continue;
            }
            let name = capture.get(1).map_or("credential", |m| m.as_str());
            findings.push(Finding::new(
                path,
                index + 1,
                format!("possible hardcoded {}", name.to_lowercase()),
                Severity::Warning,
            ));
        }
        Ok(findings)
    }
}
