//! Analysis engine
//!
//! Translates "run these routines over this workspace" into a flat batch of
//! independent tasks, executes the batch on whichever executor is active,
//! and aggregates the findings. One failing (file, routine) pair never
//! aborts a batch; its result is logged and dropped.

mod directory;
mod progress;

pub use directory::collect_files;
pub use progress::{ProgressCallback, ProgressEvent, ProgressPhase};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ExecutionMode, ScrutinyConfig};
use crate::pool::{InlineConcurrentExecutor, TaskExecutor, WorkerPool};
use crate::routines::{Finding, Routine, RoutineRegistry};
use crate::task::{HandlerRegistry, Task, TaskHandler};

/// Task type under which analysis work is registered with executors.
pub const ANALYZE_TASK_TYPE: &str = "analyze-file";

/// Payload carried by every analysis task.
#[derive(Debug, Serialize, Deserialize)]
struct AnalyzePayload {
    workspace_root: PathBuf,
    file_path: PathBuf,
    routine: String,
}

/// Aggregated outcome of one analysis run.
#[derive(Debug, Default, Serialize)]
pub struct AnalysisReport {
    pub findings: Vec<Finding>,
    pub files_analyzed: usize,
    pub routines_run: usize,
    pub tasks_total: usize,
    pub tasks_failed: usize,
    pub duration_ms: u64,
}

pub struct AnalysisEngine {
    config: ScrutinyConfig,
    registry: Arc<RoutineRegistry>,
    progress: Option<ProgressCallback>,
}

impl AnalysisEngine {
    pub fn new(config: ScrutinyConfig, registry: Arc<RoutineRegistry>) -> Self {
        Self {
            config,
            registry,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Run the selected routines over the workspace. `changed_files` is an
    /// optional pruning hint: routines whose declared extensions match none
    /// of the changed files are skipped to save work.
    pub fn run(
        &self,
        workspace_root: &Path,
        changed_files: Option<&[PathBuf]>,
    ) -> Result<AnalysisReport> {
        let started = Instant::now();

        self.emit(
            ProgressEvent::phase(ProgressPhase::CollectFiles)
                .with_message("collecting candidate files"),
        );
        let files = collect_files(workspace_root, &self.config.engine)?;
        if files.is_empty() {
            self.emit(
                ProgressEvent::phase(ProgressPhase::Complete)
                    .with_message("no files found under workspace"),
            );
            return Ok(AnalysisReport {
                duration_ms: started.elapsed().as_millis() as u64,
                ..AnalysisReport::default()
            });
        }

        let (selected, skipped) = self.select_routines(changed_files);
        let total_tasks = files.len() * selected.len();
        self.emit(
            ProgressEvent::phase(ProgressPhase::RunRoutines)
                .with_totals(0, total_tasks)
                .with_routines_skipped(skipped),
        );
        if selected.is_empty() {
            self.emit(
                ProgressEvent::phase(ProgressPhase::Complete)
                    .with_message("no routines selected"),
            );
            return Ok(AnalysisReport {
                files_analyzed: files.len(),
                duration_ms: started.elapsed().as_millis() as u64,
                ..AnalysisReport::default()
            });
        }

        debug!(
            files = files.len(),
            routines = selected.len(),
            tasks = total_tasks,
            "built analysis batch"
        );

        // One task per (file, routine) pair; metadata kept index-aligned so
        // results can be attributed without round-tripping through JSON.
        let mut tasks = Vec::with_capacity(total_tasks);
        let mut meta = Vec::with_capacity(total_tasks);
        for file in &files {
            for routine in &selected {
                let payload = AnalyzePayload {
                    workspace_root: workspace_root.to_path_buf(),
                    file_path: file.clone(),
                    routine: routine.name().to_string(),
                };
                tasks.push(Task::new(
                    format!("{}:{}", routine.name(), Uuid::new_v4()),
                    ANALYZE_TASK_TYPE,
                    serde_json::to_value(&payload).context("serializing task payload")?,
                ));
                meta.push((routine.name().to_string(), file.clone()));
            }
        }

        let run_progress = Arc::new(RunProgress {
            total: total_tasks,
            completed: AtomicUsize::new(0),
            callback: self.progress.clone(),
        });
        let mut handlers = HandlerRegistry::new();
        handlers.register(
            ANALYZE_TASK_TYPE,
            Arc::new(AnalyzeFileHandler {
                routines: selected
                    .iter()
                    .map(|r| (r.name().to_string(), r.clone()))
                    .collect(),
                progress: run_progress,
            }),
        );

        let executor = self.build_executor(Arc::new(handlers), total_tasks)?;
        let results = executor.executor().process(tasks);
        executor.shutdown();

        let mut findings = Vec::new();
        let mut tasks_failed = 0;
        for (index, result) in results.into_iter().enumerate() {
            let (routine_name, file) = &meta[index];
            if !result.success {
                tasks_failed += 1;
                warn!(
                    routine = %routine_name,
                    file = %file.display(),
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "analysis task failed; dropping its findings"
                );
                continue;
            }
            let Some(data) = result.data else { continue };
            match serde_json::from_value::<Vec<Finding>>(data) {
                Ok(batch) => findings.extend(batch.into_iter().map(|mut finding| {
                    finding.routine = routine_name.clone();
                    finding
                })),
                Err(e) => {
                    tasks_failed += 1;
                    warn!(routine = %routine_name, "discarding malformed findings: {e}");
                }
            }
        }

        let report = AnalysisReport {
            findings,
            files_analyzed: files.len(),
            routines_run: selected.len(),
            tasks_total: total_tasks,
            tasks_failed,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            findings = report.findings.len(),
            failed = report.tasks_failed,
            duration_ms = report.duration_ms,
            "analysis complete"
        );
        self.emit(
            ProgressEvent::phase(ProgressPhase::Complete)
                .with_totals(total_tasks, total_tasks)
                .with_message(format!("analysis complete: {} findings", report.findings.len())),
        );
        Ok(report)
    }

    /// Instantiate the configured routines, then prune the ones whose
    /// declared extensions match none of the changed files. Pruning is a
    /// cost optimization only.
    fn select_routines(
        &self,
        changed_files: Option<&[PathBuf]>,
    ) -> (Vec<Arc<dyn Routine>>, usize) {
        let mut selected: Vec<Arc<dyn Routine>> = if self.config.engine.routines.is_empty() {
            self.registry.routines()
        } else {
            self.config
                .engine
                .routines
                .iter()
                .filter_map(|name| {
                    let routine = self.registry.resolve(name);
                    if routine.is_none() {
                        warn!(routine = %name, "configured routine is not registered");
                    }
                    routine
                })
                .collect()
        };

        let Some(changed) = changed_files else {
            return (selected, 0);
        };
        let changed_extensions: HashSet<String> = changed
            .iter()
            .filter_map(|path| path.extension().and_then(|ext| ext.to_str()))
            .map(str::to_lowercase)
            .collect();

        let before = selected.len();
        selected.retain(|routine| match routine.extensions() {
            None => true,
            Some(extensions) => extensions
                .iter()
                .any(|ext| changed_extensions.contains(*ext)),
        });
        let skipped = before - selected.len();
        if skipped > 0 {
            debug!(skipped, "pruned routines irrelevant to changed files");
        }
        (selected, skipped)
    }

    fn build_executor(
        &self,
        handlers: Arc<HandlerRegistry>,
        task_count: usize,
    ) -> Result<ActiveExecutor> {
        let pooled = match self.config.engine.mode {
            ExecutionMode::Pooled => true,
            ExecutionMode::Inline => false,
            ExecutionMode::Auto => task_count >= self.config.engine.min_tasks_for_pool,
        };
        if pooled {
            let mut pool = WorkerPool::new(self.config.pool.clone(), handlers)?;
            pool.initialize();
            Ok(ActiveExecutor::Pooled(pool))
        } else {
            Ok(ActiveExecutor::Inline(InlineConcurrentExecutor::new(
                handlers,
            )))
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(&event);
        }
    }
}

/// The strategy selected for one run. Both variants expose the same
/// [`TaskExecutor`] contract; the batch logic depends only on the trait.
enum ActiveExecutor {
    Pooled(WorkerPool),
    Inline(InlineConcurrentExecutor),
}

impl ActiveExecutor {
    fn executor(&self) -> &dyn TaskExecutor {
        match self {
            ActiveExecutor::Pooled(pool) => pool,
            ActiveExecutor::Inline(inline) => inline,
        }
    }

    fn shutdown(self) {
        if let ActiveExecutor::Pooled(pool) = self {
            pool.shutdown();
        }
    }
}

/// Per-run completion counter shared by every worker.
struct RunProgress {
    total: usize,
    completed: AtomicUsize,
    callback: Option<ProgressCallback>,
}

impl RunProgress {
    fn tick(&self) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(callback) = &self.callback {
            callback(&ProgressEvent::phase(ProgressPhase::RunRoutines).with_totals(done, self.total));
        }
    }
}

/// Executor-side handler: resolve the routine by name, run it over the
/// file, serialize its findings. Any error here becomes a failed task
/// result at the worker boundary.
struct AnalyzeFileHandler {
    routines: HashMap<String, Arc<dyn Routine>>,
    progress: Arc<RunProgress>,
}

impl TaskHandler for AnalyzeFileHandler {
    fn handle(&self, data: &Value) -> Result<Value> {
        let outcome = (|| {
            let payload: AnalyzePayload =
                serde_json::from_value(data.clone()).context("invalid analysis task payload")?;
            let routine = self
                .routines
                .get(&payload.routine)
                .ok_or_else(|| anyhow!("unknown routine '{}'", payload.routine))?;
            let findings = routine.run(&payload.file_path).with_context(|| {
                format!(
                    "routine '{}' failed on {}",
                    payload.routine,
                    payload.file_path.display()
                )
            })?;
            serde_json::to_value(findings).context("serializing findings")
        })();
        // Completion is reported for failures too; only a panic skips it.
        self.progress.tick();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, PoolConfig};
    use crate::routines::Severity;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct CountOne;
    impl Routine for CountOne {
        fn name(&self) -> &'static str {
            "count-one"
        }
        fn description(&self) -> &'static str {
            "emits exactly one finding per file"
        }
        fn run(&self, path: &Path) -> Result<Vec<Finding>> {
            Ok(vec![Finding::new(path, 1, "counted", Severity::Info)])
        }
    }

    struct FailsOnBad;
    impl Routine for FailsOnBad {
        fn name(&self) -> &'static str {
            "fails-on-bad"
        }
        fn description(&self) -> &'static str {
            "errors on files named bad.*"
        }
        fn run(&self, path: &Path) -> Result<Vec<Finding>> {
            if path.file_stem().is_some_and(|stem| stem == "bad") {
                anyhow::bail!("refusing {}", path.display());
            }
            Ok(Vec::new())
        }
    }

    struct PythonOnly;
    impl Routine for PythonOnly {
        fn name(&self) -> &'static str {
            "python-only"
        }
        fn description(&self) -> &'static str {
            "applies to python sources only"
        }
        fn extensions(&self) -> Option<&'static [&'static str]> {
            Some(&["py"])
        }
        fn run(&self, path: &Path) -> Result<Vec<Finding>> {
            Ok(vec![Finding::new(path, 1, "python", Severity::Info)])
        }
    }

    fn test_registry() -> Arc<RoutineRegistry> {
        let mut registry = RoutineRegistry::new();
        registry.register(|| Arc::new(CountOne));
        registry.register(|| Arc::new(FailsOnBad));
        Arc::new(registry)
    }

    fn test_config(mode: ExecutionMode) -> ScrutinyConfig {
        ScrutinyConfig {
            engine: EngineConfig {
                extensions: vec!["rs".into()],
                mode,
                ..EngineConfig::default()
            },
            pool: PoolConfig {
                max_workers: 2,
                ..PoolConfig::default()
            },
        }
    }

    fn workspace(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    type Events = Arc<Mutex<Vec<ProgressEvent>>>;

    fn capture_events() -> (Events, ProgressCallback) {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: ProgressCallback =
            Arc::new(move |event: &ProgressEvent| sink.lock().unwrap().push(event.clone()));
        (events, callback)
    }

    #[test]
    fn builds_the_full_cartesian_batch() {
        let dir = workspace(&[("a.rs", "x"), ("b.rs", "y"), ("c.rs", "z")]);
        let (events, callback) = capture_events();
        let engine = AnalysisEngine::new(test_config(ExecutionMode::Inline), test_registry())
            .with_progress(callback);

        let report = engine.run(dir.path(), None).unwrap();
        // 3 files x 2 routines
        assert_eq!(report.tasks_total, 6);
        assert_eq!(report.files_analyzed, 3);
        assert_eq!(report.routines_run, 2);
        assert_eq!(report.tasks_failed, 0);
        // count-one contributes one finding per file, fails-on-bad none
        assert_eq!(report.findings.len(), 3);
        assert!(report.findings.iter().all(|f| f.routine == "count-one"));

        let events = events.lock().unwrap();
        let batch_start = events
            .iter()
            .find(|e| e.phase == ProgressPhase::RunRoutines)
            .unwrap();
        assert_eq!(batch_start.total, Some(6));
        let per_task = events
            .iter()
            .filter(|e| e.phase == ProgressPhase::RunRoutines && e.completed.unwrap_or(0) > 0)
            .count();
        assert_eq!(per_task, 6);
    }

    #[test]
    fn failing_pair_never_aborts_the_batch() {
        let dir = workspace(&[("good.rs", "x"), ("bad.rs", "y")]);
        let engine = AnalysisEngine::new(test_config(ExecutionMode::Inline), test_registry());

        let report = engine.run(dir.path(), None).unwrap();
        assert_eq!(report.tasks_total, 4);
        assert_eq!(report.tasks_failed, 1);
        // Aggregate counts only findings from successful tasks
        assert_eq!(report.findings.len(), 2);
    }

    #[test]
    fn empty_workspace_short_circuits() {
        let dir = workspace(&[("notes.md", "not a source file")]);
        let (events, callback) = capture_events();
        let engine = AnalysisEngine::new(test_config(ExecutionMode::Inline), test_registry())
            .with_progress(callback);

        let report = engine.run(dir.path(), None).unwrap();
        assert!(report.findings.is_empty());
        assert_eq!(report.tasks_total, 0);

        let events = events.lock().unwrap();
        let complete = events
            .iter()
            .find(|e| e.phase == ProgressPhase::Complete)
            .unwrap();
        assert!(complete.message.as_deref().unwrap().contains("no files"));
    }

    #[test]
    fn changed_hint_prunes_irrelevant_routines() {
        let dir = workspace(&[("a.rs", "x")]);
        let mut registry = RoutineRegistry::new();
        registry.register(|| Arc::new(CountOne));
        registry.register(|| Arc::new(PythonOnly));
        let (events, callback) = capture_events();
        let engine = AnalysisEngine::new(test_config(ExecutionMode::Inline), Arc::new(registry))
            .with_progress(callback);

        let changed = vec![PathBuf::from("src/lib.rs")];
        let report = engine.run(dir.path(), Some(&changed)).unwrap();
        // python-only was pruned; only count-one ran
        assert_eq!(report.tasks_total, 1);
        assert_eq!(report.routines_run, 1);

        let events = events.lock().unwrap();
        let batch_start = events
            .iter()
            .find(|e| e.phase == ProgressPhase::RunRoutines)
            .unwrap();
        assert_eq!(batch_start.routines_skipped, Some(1));
    }

    #[test]
    fn pooled_and_inline_runs_agree() {
        let dir = workspace(&[("a.rs", "x"), ("b.rs", "y")]);

        let inline = AnalysisEngine::new(test_config(ExecutionMode::Inline), test_registry())
            .run(dir.path(), None)
            .unwrap();
        let pooled = AnalysisEngine::new(test_config(ExecutionMode::Pooled), test_registry())
            .run(dir.path(), None)
            .unwrap();

        assert_eq!(inline.tasks_total, pooled.tasks_total);
        assert_eq!(inline.tasks_failed, pooled.tasks_failed);
        let key = |findings: &[Finding]| {
            let mut keys: Vec<(String, String)> = findings
                .iter()
                .map(|f| (f.routine.clone(), f.file_path.clone()))
                .collect();
            keys.sort();
            keys
        };
        assert_eq!(key(&inline.findings), key(&pooled.findings));
    }

    #[test]
    fn invalid_pool_size_is_fatal() {
        let dir = workspace(&[("a.rs", "x")]);
        let mut config = test_config(ExecutionMode::Pooled);
        config.pool.max_workers = 0;
        let engine = AnalysisEngine::new(config, test_registry());

        let err = engine.run(dir.path(), None).unwrap_err();
        assert!(err.to_string().contains("configuration"));
    }
}
