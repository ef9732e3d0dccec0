//! Crash-tolerant worker pool
//!
//! The pool owns a fixed set of worker threads and a single dispatcher
//! thread. The dispatcher is the only actor that touches the task queue and
//! the worker table: callers talk to it over a control channel, workers
//! report back over an event channel. That serialization is what guarantees
//! a task is assigned to at most one worker, ever.
//!
//! Failure handling:
//! - a handler error is a failed result, produced by the worker itself
//! - a timeout resolves the pending result and replaces the worker (the
//!   stuck thread cannot be preempted; it is abandoned and its eventual
//!   output discarded by generation tagging)
//! - a worker crash (handler panic) is detected from the dead thread and
//!   recovered the same way, so the pool never shrinks
//!
//! If the pool cannot be established at all, every call transparently routes
//! through the [`InlineConcurrentExecutor`] instead.

mod inline;
mod queue;
mod stats;
mod worker;

pub use inline::InlineConcurrentExecutor;
pub use queue::TaskQueue;
pub use stats::PoolStats;
pub use worker::WorkerStatus;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender, bounded, tick, unbounded};
use tracing::{debug, error, info, trace, warn};

use crate::config::PoolConfig;
use crate::error::EngineError;
use crate::task::{HandlerRegistry, Task, TaskResult};
use worker::{RunningTask, WorkerEvent, WorkerHandle};

/// Dispatcher tick cadence; bounds timeout and crash detection latency.
const TICK_MS: u64 = 10;

/// How long `initialize` waits for the full worker set to report ready.
const READY_WAIT: Duration = Duration::from_secs(5);

/// One interface, two interchangeable execution strategies: the pooled
/// executor and the inline concurrent fallback. Callers depend only on this
/// trait; task-level failures never surface as errors from either method.
pub trait TaskExecutor: Send + Sync {
    /// Execute one task, blocking until its result is available.
    fn submit(&self, task: Task) -> TaskResult;

    /// Execute a batch, blocking until every result is available. Results
    /// are index-aligned with the input regardless of completion order.
    fn process(&self, tasks: Vec<Task>) -> Vec<TaskResult>;
}

type IndexedResult = (usize, TaskResult);

enum Control {
    Submit {
        task: Task,
        reply: Sender<IndexedResult>,
    },
    SubmitBatch {
        tasks: Vec<Task>,
        reply: Sender<IndexedResult>,
    },
    Stats {
        reply: Sender<PoolStats>,
    },
    Shutdown {
        reply: Sender<()>,
    },
}

struct PendingReply {
    reply: Sender<IndexedResult>,
    index: usize,
}

struct DrainState {
    deadline: Instant,
    replies: Vec<Sender<()>>,
}

pub struct WorkerPool {
    config: PoolConfig,
    registry: Arc<HandlerRegistry>,
    control_tx: Option<Sender<Control>>,
    closed: AtomicBool,
    disabled: bool,
    inline: InlineConcurrentExecutor,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("closed", &self.closed)
            .field("disabled", &self.disabled)
            .field("initialized", &self.control_tx.is_some())
            .finish()
    }
}

impl WorkerPool {
    /// Validate configuration and build an uninitialized pool. A zero worker
    /// count is rejected here, before anything is spawned.
    pub fn new(config: PoolConfig, registry: Arc<HandlerRegistry>) -> Result<Self, EngineError> {
        if config.max_workers == 0 {
            return Err(EngineError::Configuration(
                "max_workers must be at least 1".into(),
            ));
        }
        Ok(Self {
            config,
            registry: registry.clone(),
            control_tx: None,
            closed: AtomicBool::new(false),
            disabled: false,
            inline: InlineConcurrentExecutor::new(registry),
        })
    }

    /// Spawn the dispatcher and worker threads and wait until every worker
    /// reports ready. Initialization failure is not an error for callers:
    /// the pool marks itself disabled and routes all further work through
    /// the inline executor.
    pub fn initialize(&mut self) {
        if self.control_tx.is_some() || self.disabled {
            return;
        }

        let (control_tx, control_rx) = unbounded();
        let (init_tx, init_rx) = bounded::<Result<(), EngineError>>(1);
        let config = self.config.clone();
        let registry = self.registry.clone();

        let spawned = std::thread::Builder::new()
            .name("scrutiny-dispatcher".into())
            .spawn(move || match Dispatcher::new(config, registry, control_rx) {
                Ok(dispatcher) => {
                    let _ = init_tx.send(Ok(()));
                    dispatcher.run();
                }
                Err(e) => {
                    let _ = init_tx.send(Err(e));
                }
            });

        let init_error = match spawned {
            Err(e) => Some(EngineError::WorkerInit(format!(
                "failed to spawn dispatcher thread: {e}"
            ))),
            Ok(_) => match init_rx.recv_timeout(READY_WAIT) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => Some(EngineError::WorkerInit(
                    "timed out waiting for workers to report ready".into(),
                )),
            },
        };

        match init_error {
            None => {
                info!(workers = self.config.max_workers, "worker pool ready");
                self.control_tx = Some(control_tx);
            }
            Some(e) => {
                warn!("{e}; falling back to inline concurrent execution");
                self.disabled = true;
            }
        }
    }

    /// Whether the pool fell back to inline execution.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Point-in-time utilization snapshot. Zeroed once the pool has shut
    /// down or when running in inline fallback mode (no workers exist).
    pub fn stats(&self) -> PoolStats {
        if self.closed.load(Ordering::SeqCst) {
            return PoolStats::default();
        }
        let Some(control_tx) = &self.control_tx else {
            return PoolStats::default();
        };
        let (reply_tx, reply_rx) = bounded(1);
        if control_tx.send(Control::Stats { reply: reply_tx }).is_err() {
            return PoolStats::default();
        }
        reply_rx.recv().unwrap_or_default()
    }

    /// Stop accepting submissions, wait for in-flight tasks up to the
    /// configured grace period, then force-terminate whatever is left.
    /// Idempotent; completes immediately when nothing is in flight.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(control_tx) = &self.control_tx else {
            return;
        };
        let (reply_tx, reply_rx) = bounded(1);
        if control_tx
            .send(Control::Shutdown { reply: reply_tx })
            .is_ok()
        {
            // The dispatcher guarantees completion by the grace deadline.
            let _ = reply_rx.recv();
        }
    }

    fn rejected(task_id: String) -> TaskResult {
        TaskResult::failed(task_id, "worker pool is shut down", 0, 0)
    }

    #[cfg(test)]
    pub(crate) fn force_disable_for_tests(&mut self) {
        self.disabled = true;
    }
}

impl TaskExecutor for WorkerPool {
    fn submit(&self, task: Task) -> TaskResult {
        if self.closed.load(Ordering::SeqCst) {
            return Self::rejected(task.id);
        }
        let Some(control_tx) = &self.control_tx else {
            return self.inline.submit(task);
        };

        let task_id = task.id.clone();
        let (reply_tx, reply_rx) = bounded(1);
        let sent = control_tx.send(Control::Submit {
            task,
            reply: reply_tx,
        });
        if sent.is_err() {
            return Self::rejected(task_id);
        }
        match reply_rx.recv() {
            Ok((_, result)) => result,
            Err(_) => TaskResult::failed(
                task_id,
                "worker pool terminated before task completed",
                0,
                0,
            ),
        }
    }

    fn process(&self, tasks: Vec<Task>) -> Vec<TaskResult> {
        if tasks.is_empty() {
            return Vec::new();
        }
        if self.closed.load(Ordering::SeqCst) {
            return tasks.into_iter().map(|t| Self::rejected(t.id)).collect();
        }
        let Some(control_tx) = &self.control_tx else {
            return self.inline.process(tasks);
        };

        let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let (reply_tx, reply_rx) = unbounded();
        let sent = control_tx.send(Control::SubmitBatch {
            tasks,
            reply: reply_tx,
        });
        if sent.is_err() {
            return ids.into_iter().map(Self::rejected).collect();
        }

        let mut slots: Vec<Option<TaskResult>> = ids.iter().map(|_| None).collect();
        for _ in 0..ids.len() {
            match reply_rx.recv() {
                Ok((index, result)) => slots[index] = Some(result),
                Err(_) => break,
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.unwrap_or_else(|| {
                    TaskResult::failed(
                        ids[i].clone(),
                        "worker pool terminated before task completed",
                        0,
                        0,
                    )
                })
            })
            .collect()
    }
}

/// The serialized dispatcher. Owns the queue, the worker table, and the
/// pending-reply table; nothing else ever mutates them.
struct Dispatcher {
    config: PoolConfig,
    registry: Arc<HandlerRegistry>,
    control_rx: Receiver<Control>,
    events_tx: Sender<WorkerEvent>,
    events_rx: Receiver<WorkerEvent>,
    workers: Vec<WorkerHandle>,
    queue: TaskQueue,
    pending: HashMap<String, PendingReply>,
    draining: Option<DrainState>,
    running: bool,
    tick_count: u64,
}

enum Recovery {
    Timeout(usize),
    Crash(usize),
    Respawn(usize),
}

impl Dispatcher {
    fn new(
        config: PoolConfig,
        registry: Arc<HandlerRegistry>,
        control_rx: Receiver<Control>,
    ) -> Result<Self, EngineError> {
        let (events_tx, events_rx) = unbounded();

        if config.verbose {
            info!(
                workers = config.max_workers,
                timeout_ms = config.task_timeout_ms,
                "spawning worker pool"
            );
        }

        let mut workers = Vec::with_capacity(config.max_workers);
        for slot in 0..config.max_workers {
            let handle = WorkerHandle::spawn(slot, 0, registry.clone(), events_tx.clone())
                .map_err(|e| {
                    EngineError::WorkerInit(format!("failed to spawn worker {slot}: {e}"))
                })?;
            workers.push(handle);
        }

        let mut dispatcher = Self {
            config,
            registry,
            control_rx,
            events_tx,
            events_rx,
            workers,
            queue: TaskQueue::new(),
            pending: HashMap::new(),
            draining: None,
            running: true,
            tick_count: 0,
        };
        dispatcher.await_ready()?;
        Ok(dispatcher)
    }

    /// Wait until every spawned worker has reported ready (= idle).
    fn await_ready(&mut self) -> Result<(), EngineError> {
        let deadline = Instant::now() + READY_WAIT;
        let mut ready = 0;
        while ready < self.workers.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events_rx.recv_timeout(remaining) {
                Ok(WorkerEvent::Ready { slot, generation })
                    if self.workers[slot].generation == generation =>
                {
                    self.workers[slot].status = WorkerStatus::Idle;
                    ready += 1;
                }
                Ok(_) => {}
                Err(_) => {
                    return Err(EngineError::WorkerInit(
                        "timed out waiting for workers to report ready".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn run(mut self) {
        // Local clones keep the select arms free to mutate dispatcher state.
        let control_rx = self.control_rx.clone();
        let events_rx = self.events_rx.clone();
        let ticker = tick(Duration::from_millis(TICK_MS));
        while self.running {
            crossbeam::select! {
                recv(control_rx) -> message => match message {
                    Ok(control) => self.handle_control(control),
                    Err(_) => self.abort(),
                },
                recv(events_rx) -> event => {
                    if let Ok(event) = event {
                        self.handle_event(event);
                    }
                },
                recv(ticker) -> _ => self.on_tick(),
            }
        }
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Submit { task, reply } => {
                self.accept(task, reply, 0);
                self.dispatch_idle();
            }
            Control::SubmitBatch { tasks, reply } => {
                // The whole batch lands in the queue before any dispatch so
                // priority ordering applies across the batch.
                for (index, task) in tasks.into_iter().enumerate() {
                    self.accept(task, reply.clone(), index);
                }
                self.dispatch_idle();
            }
            Control::Stats { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Control::Shutdown { reply } => {
                if let Some(drain) = &mut self.draining {
                    drain.replies.push(reply);
                } else {
                    debug!(in_flight = self.pending.len(), "draining worker pool");
                    self.draining = Some(DrainState {
                        deadline: Instant::now()
                            + Duration::from_millis(self.config.shutdown_grace_ms),
                        replies: vec![reply],
                    });
                }
                self.maybe_finish_drain();
            }
        }
    }

    fn accept(&mut self, task: Task, reply: Sender<IndexedResult>, index: usize) {
        if self.draining.is_some() {
            let failure =
                TaskResult::failed(task.id.clone(), "worker pool is shutting down", 0, 0);
            let _ = reply.send((index, failure));
            return;
        }
        if self.pending.contains_key(&task.id) {
            let failure = TaskResult::failed(
                task.id.clone(),
                format!("duplicate task id '{}' already in flight", task.id),
                0,
                0,
            );
            let _ = reply.send((index, failure));
            return;
        }
        self.pending
            .insert(task.id.clone(), PendingReply { reply, index });
        self.queue.enqueue(task);
    }

    /// Assign queued tasks to idle workers, highest priority first.
    fn dispatch_idle(&mut self) {
        while !self.queue.is_empty() {
            let Some(index) = self
                .workers
                .iter()
                .position(|w| w.status == WorkerStatus::Idle)
            else {
                break;
            };
            let task = self.queue.dequeue().expect("non-empty queue");
            let task_id = task.id.clone();
            let deadline = Instant::now() + Duration::from_millis(self.config.task_timeout_ms);

            match self.workers[index].assign_tx.send(task) {
                Ok(()) => {
                    trace!(worker = index, task = %task_id, "dispatched task");
                    let worker = &mut self.workers[index];
                    worker.status = WorkerStatus::Busy;
                    worker.current = Some(RunningTask {
                        task_id,
                        started: Instant::now(),
                        deadline,
                    });
                }
                Err(send_error) => {
                    // The worker died between its last report and now; put
                    // the task back and replace the thread.
                    warn!(worker = index, "worker channel closed; restarting worker");
                    self.queue.enqueue(send_error.into_inner());
                    self.replace_worker(index);
                }
            }
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Ready { slot, generation } => {
                let Some(worker) = self.workers.get_mut(slot) else {
                    return;
                };
                if worker.generation == generation {
                    worker.status = WorkerStatus::Idle;
                    worker.respawn_failed = false;
                    self.dispatch_idle();
                }
            }
            WorkerEvent::Completed {
                slot,
                generation,
                result,
            } => {
                let Some(worker) = self.workers.get_mut(slot) else {
                    return;
                };
                if worker.generation != generation {
                    debug!(worker = slot, task = %result.task_id, "discarding result from abandoned worker");
                    return;
                }
                worker.status = WorkerStatus::Idle;
                worker.current = None;
                let task_id = result.task_id.clone();
                self.resolve(&task_id, result);
                self.dispatch_idle();
                self.maybe_finish_drain();
            }
        }
    }

    fn on_tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
        let now = Instant::now();

        let mut recoveries = Vec::new();
        for (index, worker) in self.workers.iter().enumerate() {
            match worker.status {
                WorkerStatus::Busy => {
                    let current = worker.current.as_ref().expect("busy worker has a task");
                    if now >= current.deadline {
                        recoveries.push(Recovery::Timeout(index));
                    } else if worker.thread.is_finished() {
                        recoveries.push(Recovery::Crash(index));
                    }
                }
                WorkerStatus::Idle if worker.thread.is_finished() => {
                    recoveries.push(Recovery::Crash(index));
                }
                WorkerStatus::Restarting if worker.respawn_failed => {
                    recoveries.push(Recovery::Respawn(index));
                }
                _ => {}
            }
        }

        for recovery in recoveries {
            match recovery {
                Recovery::Timeout(index) => {
                    if let Some(current) = self.workers[index].current.take() {
                        warn!(worker = index, task = %current.task_id, "task timed out; restarting worker");
                        let failure = TaskResult::failed(
                            current.task_id.clone(),
                            format!("task timeout after {} ms", self.config.task_timeout_ms),
                            index,
                            self.config.task_timeout_ms,
                        );
                        self.resolve(&current.task_id, failure);
                    }
                    self.replace_worker(index);
                }
                Recovery::Crash(index) => {
                    if let Some(current) = self.workers[index].current.take() {
                        warn!(worker = index, task = %current.task_id, "worker crashed while executing task; restarting");
                        let failure = TaskResult::failed(
                            current.task_id.clone(),
                            format!("worker {index} crashed while executing task (panic)"),
                            index,
                            current.started.elapsed().as_millis() as u64,
                        );
                        self.resolve(&current.task_id, failure);
                    } else {
                        warn!(worker = index, "idle worker thread died; restarting");
                    }
                    self.replace_worker(index);
                }
                Recovery::Respawn(index) => self.replace_worker(index),
            }
        }

        self.dispatch_idle();
        self.maybe_finish_drain();

        let grace_expired = self
            .draining
            .as_ref()
            .is_some_and(|drain| now >= drain.deadline);
        if grace_expired {
            warn!(
                in_flight = self.pending.len(),
                "shutdown grace period expired; force-terminating busy workers"
            );
            self.finish_shutdown();
        }

        // Memory watermark check roughly once a second
        if self.config.memory_limit_mb > 0 && self.tick_count % 100 == 0 {
            let used_mb = stats::process_memory_mb();
            if used_mb > self.config.memory_limit_mb {
                warn!(
                    used_mb,
                    limit_mb = self.config.memory_limit_mb,
                    "memory usage exceeds configured limit"
                );
            }
        }
    }

    /// Replace the worker in `index` with a fresh thread at the next
    /// generation. The old thread, if still alive, is abandoned: dropping
    /// its assignment channel makes it exit after its current task, and its
    /// stale generation keeps any late output out of the pool.
    fn replace_worker(&mut self, index: usize) {
        let slot = self.workers[index].slot;
        let next_generation = self.workers[index].generation + 1;
        match WorkerHandle::spawn(
            slot,
            next_generation,
            self.registry.clone(),
            self.events_tx.clone(),
        ) {
            Ok(handle) => self.workers[index] = handle,
            Err(e) => {
                error!(worker = slot, "failed to respawn worker: {e}");
                let worker = &mut self.workers[index];
                worker.generation = next_generation;
                worker.status = WorkerStatus::Restarting;
                worker.current = None;
                worker.respawn_failed = true;
            }
        }
    }

    fn resolve(&mut self, task_id: &str, result: TaskResult) {
        if let Some(pending) = self.pending.remove(task_id) {
            let _ = pending.reply.send((pending.index, result));
        }
    }

    fn snapshot(&self) -> PoolStats {
        let total = self.workers.len();
        let busy = self
            .workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Busy)
            .count();
        let idle = self
            .workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Idle)
            .count();
        PoolStats {
            total_workers: total,
            idle_workers: idle,
            busy_workers: busy,
            active_tasks: busy,
            utilization_rate: if total == 0 {
                0.0
            } else {
                busy as f64 / total as f64
            },
            memory_usage_mb: stats::process_memory_mb(),
        }
    }

    fn maybe_finish_drain(&mut self) {
        if self.draining.is_some() && self.pending.is_empty() && self.queue.is_empty() {
            self.finish_shutdown();
        }
    }

    /// Tear the pool down: fail whatever is still queued or in flight,
    /// release the workers, and acknowledge every shutdown caller.
    fn finish_shutdown(&mut self) {
        let Some(drain) = self.draining.take() else {
            return;
        };
        for task in self.queue.drain() {
            let failure = TaskResult::failed(
                task.id.clone(),
                "worker pool shut down before task was dispatched",
                0,
                0,
            );
            self.resolve(&task.id, failure);
        }
        let in_flight: Vec<String> = self.pending.keys().cloned().collect();
        for task_id in in_flight {
            let failure = TaskResult::failed(
                task_id.clone(),
                "worker pool shut down before task completed",
                0,
                0,
            );
            self.resolve(&task_id, failure);
        }
        // Dropping the handles closes every assignment channel; worker
        // threads exit on their own once their current task finishes.
        self.workers.clear();
        for reply in drain.replies {
            let _ = reply.send(());
        }
        self.running = false;
        info!("worker pool shut down");
    }

    /// The pool handle was dropped without an explicit shutdown.
    fn abort(&mut self) {
        if self.draining.is_none() {
            self.draining = Some(DrainState {
                deadline: Instant::now(),
                replies: Vec::new(),
            });
        }
        self.finish_shutdown();
    }
}
