//! Progress reporting for analysis runs
//!
//! Events fire at phase boundaries and after each completed task. Callbacks
//! are invoked from worker contexts, so they must be cheap and thread-safe.

use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressPhase {
    CollectFiles,
    RunRoutines,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routines_skipped: Option<usize>,
}

impl ProgressEvent {
    pub fn phase(phase: ProgressPhase) -> Self {
        Self {
            phase,
            total: None,
            completed: None,
            message: None,
            routines_skipped: None,
        }
    }

    pub fn with_totals(mut self, completed: usize, total: usize) -> Self {
        self.completed = Some(completed);
        self.total = Some(total);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_routines_skipped(mut self, skipped: usize) -> Self {
        self.routines_skipped = Some(skipped);
        self
    }
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;
