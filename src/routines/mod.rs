//! Pluggable analysis routines
//!
//! A routine is a single capability: take a file path, return findings. The
//! registry is a startup-time table from stable string names to factory
//! functions; resolution is always by table lookup, never by dynamic path
//! construction. Routines are expected to be side-effect-free beyond their
//! returned findings.

mod conflict_markers;
mod debug_prints;
mod hardcoded_secrets;
mod long_lines;
mod todo_markers;
mod trailing_whitespace;

pub use conflict_markers::ConflictMarkers;
pub use debug_prints::DebugPrints;
pub use hardcoded_secrets::HardcodedSecrets;
pub use long_lines::LongLines;
pub use todo_markers::TodoMarkers;
pub use trailing_whitespace::TrailingWhitespace;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One issue reported by a routine, tagged with the routine that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub routine: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
    pub severity: Severity,
}

impl Finding {
    pub fn new(
        file_path: &Path,
        line: usize,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            // Tagged with the originating routine during aggregation
            routine: String::new(),
            file_path: file_path.display().to_string(),
            line: Some(line),
            message: message.into(),
            severity,
        }
    }
}

/// A pluggable analysis unit.
pub trait Routine: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// File extensions this routine is interested in; `None` means all
    /// files. Used to prune routines against a changed-file hint; purely
    /// advisory, a routine must still behave on any file it is handed.
    fn extensions(&self) -> Option<&'static [&'static str]> {
        None
    }

    fn run(&self, path: &Path) -> Result<Vec<Finding>>;
}

type RoutineFactory = fn() -> Arc<dyn Routine>;

/// Startup-time mapping from routine names to factories.
#[derive(Default)]
pub struct RoutineRegistry {
    factories: HashMap<String, RoutineFactory>,
}

impl RoutineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in routine.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(|| Arc::new(TodoMarkers));
        registry.register(|| Arc::new(ConflictMarkers));
        registry.register(|| Arc::new(HardcodedSecrets));
        registry.register(|| Arc::new(LongLines::default()));
        registry.register(|| Arc::new(TrailingWhitespace));
        registry.register(|| Arc::new(DebugPrints));
        registry
    }

    /// Register a factory under the name its routine reports.
    pub fn register(&mut self, factory: RoutineFactory) {
        let name = factory().name().to_string();
        self.factories.insert(name, factory);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Routine>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// Registered names, sorted for deterministic iteration.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate every registered routine, sorted by name.
    pub fn routines(&self) -> Vec<Arc<dyn Routine>> {
        self.names()
            .into_iter()
            .filter_map(|name| self.resolve(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Read a file for line-oriented analysis.
pub(crate) fn read_lines(path: &Path) -> Result<String> {
    use anyhow::Context;
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_resolves_by_name() {
        let registry = RoutineRegistry::builtin();
        assert!(registry.len() >= 5);

        let routine = registry.resolve("todo-markers").unwrap();
        assert_eq!(routine.name(), "todo-markers");
        assert!(registry.resolve("does-not-exist").is_none());
    }

    #[test]
    fn names_are_sorted_and_stable() {
        let registry = RoutineRegistry::builtin();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn routines_instantiate_for_every_name() {
        let registry = RoutineRegistry::builtin();
        assert_eq!(registry.routines().len(), registry.len());
    }
}
