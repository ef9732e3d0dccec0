//! Task and result types shared by every executor
//!
//! A task is an opaque unit of work: a caller-unique id, a `task_type`
//! string that selects a registered handler, a JSON payload, and a priority.
//! Exactly one [`TaskResult`] is produced per task, ever; failures are data,
//! not errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A unit of work awaiting execution. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Caller-unique id within a batch
    pub id: String,
    /// Handler selector, resolved through the [`HandlerRegistry`]
    pub task_type: String,
    /// Opaque JSON payload handed to the handler
    pub data: Value,
    /// Strictly higher priorities are dispatched first; default 0
    #[serde(default)]
    pub priority: i64,
}

impl Task {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            data,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

/// Outcome of a single task. Task-level failures live here rather than in
/// `Result` so a failing task can never abort its batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub worker_id: usize,
    pub duration_ms: u64,
}

impl TaskResult {
    pub fn completed(task_id: String, data: Value, worker_id: usize, duration_ms: u64) -> Self {
        Self {
            task_id,
            success: true,
            data: Some(data),
            error: None,
            worker_id,
            duration_ms,
        }
    }

    pub fn failed(
        task_id: String,
        error: impl Into<String>,
        worker_id: usize,
        duration_ms: u64,
    ) -> Self {
        Self {
            task_id,
            success: false,
            data: None,
            error: Some(error.into()),
            worker_id,
            duration_ms,
        }
    }
}

/// A registered task handler. Implementations must be callable from any
/// worker thread; a returned `Err` becomes a failed [`TaskResult`] at the
/// worker boundary and never propagates further.
pub trait TaskHandler: Send + Sync {
    fn handle(&self, data: &Value) -> Result<Value>;
}

/// Startup-time table from stable `task_type` strings to handler
/// implementations. Resolution is always by table lookup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    pub fn get(&self, task_type: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(task_type)
    }

    pub fn task_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

/// Run one task against the registry, converting handler errors and unknown
/// task types into failed results. Panics are deliberately not caught here:
/// each executor decides what a panic means (worker crash vs. inline unwind).
pub(crate) fn run_task(registry: &HandlerRegistry, task: &Task, worker_id: usize) -> TaskResult {
    let started = Instant::now();
    let outcome = match registry.get(&task.task_type) {
        Some(handler) => handler.handle(&task.data),
        None => Err(anyhow!(
            "no handler registered for task type '{}'",
            task.task_type
        )),
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(data) => TaskResult::completed(task.id.clone(), data, worker_id, duration_ms),
        Err(e) => TaskResult::failed(task.id.clone(), format!("{e:#}"), worker_id, duration_ms),
    }
}
