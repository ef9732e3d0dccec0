//! Pool worker threads
//!
//! A worker is a persistent OS thread that executes one task at a time. It
//! owns no shared state: a private assignment channel in, the pool-wide
//! event channel out. A handler that returns `Err` is converted to a failed
//! result at the worker boundary; a handler that panics unwinds out of the
//! loop and kills the thread; detection is the dispatcher's responsibility,
//! never the worker's.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam::channel::{Receiver, Sender, bounded};

use crate::task::{HandlerRegistry, Task, TaskResult, run_task};

/// Caller-visible worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Busy,
    Restarting,
}

/// Events flowing from worker threads to the dispatcher. Every event carries
/// the worker's generation so output from an abandoned (timed-out) thread is
/// recognizable as stale.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Ready { slot: usize, generation: u64 },
    Completed {
        slot: usize,
        generation: u64,
        result: TaskResult,
    },
}

/// The task currently assigned to a worker slot.
#[derive(Debug)]
pub(crate) struct RunningTask {
    pub task_id: String,
    pub started: Instant,
    pub deadline: Instant,
}

/// Dispatcher-side handle to one worker slot. The slot id is stable across
/// restarts; the generation increments every time the slot is respawned.
pub(crate) struct WorkerHandle {
    pub slot: usize,
    pub generation: u64,
    pub status: WorkerStatus,
    pub current: Option<RunningTask>,
    pub assign_tx: Sender<Task>,
    pub thread: JoinHandle<()>,
    /// Set when a respawn attempt failed; retried on the next tick
    pub respawn_failed: bool,
}

impl WorkerHandle {
    pub fn spawn(
        slot: usize,
        generation: u64,
        registry: Arc<HandlerRegistry>,
        events_tx: Sender<WorkerEvent>,
    ) -> io::Result<Self> {
        let (assign_tx, assign_rx) = bounded::<Task>(1);
        let thread = std::thread::Builder::new()
            .name(format!("scrutiny-worker-{slot}"))
            .spawn(move || worker_loop(slot, generation, registry, assign_rx, events_tx))?;

        Ok(Self {
            slot,
            generation,
            status: WorkerStatus::Restarting,
            current: None,
            assign_tx,
            thread,
            respawn_failed: false,
        })
    }
}

fn worker_loop(
    slot: usize,
    generation: u64,
    registry: Arc<HandlerRegistry>,
    assign_rx: Receiver<Task>,
    events_tx: Sender<WorkerEvent>,
) {
    if events_tx.send(WorkerEvent::Ready { slot, generation }).is_err() {
        return;
    }

    while let Ok(task) = assign_rx.recv() {
        tracing::trace!(worker = slot, task = %task.id, "executing task");
        let result = run_task(&registry, &task, slot);
        let sent = events_tx.send(WorkerEvent::Completed {
            slot,
            generation,
            result,
        });
        if sent.is_err() {
            break;
        }
    }
}
