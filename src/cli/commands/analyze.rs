//! Analyze command: run the engine over one or more workspaces

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::output::Output;
use crate::config::{ExecutionMode, ScrutinyConfig};
use crate::engine::{AnalysisEngine, AnalysisReport, ProgressCallback, ProgressPhase};
use crate::routines::{RoutineRegistry, Severity};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Workspace roots to analyze
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Execution strategy (pooled, inline, auto)
    #[arg(long, value_enum)]
    pub mode: Option<ExecutionMode>,

    /// Number of pool workers (defaults to logical core count)
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Per-task timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Changed files hint; routines irrelevant to these are skipped
    #[arg(long, value_delimiter = ',')]
    pub changed_files: Vec<PathBuf>,

    /// Run only these routines
    #[arg(long, value_delimiter = ',')]
    pub routines: Vec<String>,

    /// Show a progress bar
    #[arg(long)]
    pub progress: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "summary")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// Findings list with a one-line summary
    Summary,
    /// JSON for machine processing
    Json,
}

pub fn execute(args: AnalyzeArgs, verbose: u8, quiet: bool, config_path: Option<&str>) -> Result<()> {
    let mut config = ScrutinyConfig::load(config_path.map(Path::new))?;
    if let Some(mode) = args.mode {
        config.engine.mode = mode;
    }
    if let Some(max_workers) = args.max_workers {
        config.pool.max_workers = max_workers;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.pool.task_timeout_ms = timeout_ms;
    }
    if !args.routines.is_empty() {
        config.engine.routines = args.routines.clone();
    }
    if verbose > 0 {
        config.pool.verbose = true;
    }

    let output = Output::new(verbose > 0, quiet);
    let registry = Arc::new(RoutineRegistry::builtin());
    let paths = if args.paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        args.paths.clone()
    };
    let changed = (!args.changed_files.is_empty()).then_some(args.changed_files.as_slice());

    let mut reports = Vec::new();
    for path in &paths {
        if !path.exists() {
            output.warning(&format!("path not found: {}", path.display()));
            continue;
        }
        let mut engine = AnalysisEngine::new(config.clone(), registry.clone());
        if args.progress && !quiet {
            engine = engine.with_progress(progress_bar_callback());
        }
        reports.push(engine.run(path, changed)?);
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Summary => print_summary(&output, &reports),
    }

    let errors = reports
        .iter()
        .flat_map(|r| &r.findings)
        .filter(|f| f.severity == Severity::Error)
        .count();
    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Adapt engine progress events onto an indicatif bar. The bar appears when
/// the batch size is known and disappears on completion.
fn progress_bar_callback() -> ProgressCallback {
    let bar: Mutex<Option<ProgressBar>> = Mutex::new(None);
    Arc::new(move |event| {
        let mut bar = bar.lock().unwrap();
        match event.phase {
            ProgressPhase::CollectFiles => {}
            ProgressPhase::RunRoutines => {
                if bar.is_none() {
                    if let Some(total) = event.total {
                        let style = ProgressStyle::with_template(
                            "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>6}/{len:6} tasks",
                        )
                        .expect("static progress template compiles");
                        let progress = ProgressBar::new(total as u64);
                        progress.set_style(style);
                        *bar = Some(progress);
                    }
                }
                if let (Some(progress), Some(completed)) = (bar.as_ref(), event.completed) {
                    progress.set_position(completed as u64);
                }
            }
            ProgressPhase::Complete => {
                if let Some(progress) = bar.take() {
                    progress.finish_and_clear();
                }
            }
        }
    })
}

const MAX_LISTED_FINDINGS: usize = 25;

fn print_summary(output: &Output, reports: &[AnalysisReport]) {
    let findings: Vec<_> = reports.iter().flat_map(|r| &r.findings).collect();

    for finding in findings.iter().take(MAX_LISTED_FINDINGS) {
        let line = finding
            .line
            .map(|l| format!(":{l}"))
            .unwrap_or_default();
        output.plain(&format!(
            "{}{} [{}] {}",
            finding.file_path, line, finding.routine, finding.message
        ));
    }
    if findings.len() > MAX_LISTED_FINDINGS {
        output.plain(&format!(
            "... and {} more",
            findings.len() - MAX_LISTED_FINDINGS
        ));
    }

    let files: usize = reports.iter().map(|r| r.files_analyzed).sum();
    let failed: usize = reports.iter().map(|r| r.tasks_failed).sum();
    let duration: u64 = reports.iter().map(|r| r.duration_ms).sum();
    let errors = findings
        .iter()
        .filter(|f| f.severity == Severity::Error)
        .count();

    if findings.is_empty() {
        output.success(&format!("analyzed {files} files: no findings ({duration} ms)"));
    } else {
        output.info(&format!(
            "analyzed {files} files: {} findings ({errors} errors), {failed} failed tasks, {duration} ms",
            findings.len()
        ));
    }
}
