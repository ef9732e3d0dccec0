//! Inline concurrent executor
//!
//! The non-pooled execution strategy: the same `submit`/`process` contract
//! as the worker pool, run as a rayon parallel map inside the caller's own
//! context. Each task is wrapped in `catch_unwind` so a panicking handler
//! becomes a failed result instead of propagating. There is no thread
//! isolation and no timeout enforcement: a task that blocks its thread can
//! stall the batch.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use super::TaskExecutor;
use crate::task::{HandlerRegistry, Task, TaskResult, run_task};

pub struct InlineConcurrentExecutor {
    registry: Arc<HandlerRegistry>,
}

impl InlineConcurrentExecutor {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    fn run_one(&self, task: Task) -> TaskResult {
        let task_id = task.id.clone();
        let started = Instant::now();
        let worker_id = rayon::current_thread_index().unwrap_or(0);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            run_task(&self.registry, &task, worker_id)
        }));

        match outcome {
            Ok(result) => result,
            Err(payload) => TaskResult::failed(
                task_id,
                format!("task panicked: {}", panic_message(&payload)),
                worker_id,
                started.elapsed().as_millis() as u64,
            ),
        }
    }
}

impl TaskExecutor for InlineConcurrentExecutor {
    fn submit(&self, task: Task) -> TaskResult {
        self.run_one(task)
    }

    fn process(&self, tasks: Vec<Task>) -> Vec<TaskResult> {
        // The parallel map preserves input order in its output, so results
        // come back index-aligned no matter which task finishes first.
        tasks.into_par_iter().map(|task| self.run_one(task)).collect()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
