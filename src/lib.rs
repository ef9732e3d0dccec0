//! # Scrutiny: crash-tolerant parallel code analysis
//!
//! Scrutiny runs a set of pluggable analysis routines over a workspace file
//! tree as a flat batch of independent tasks, executed concurrently on a
//! crash-tolerant worker pool:
//!
//! - **Isolated workers**: every task runs on a persistent worker thread
//!   that shares no mutable state with its peers
//! - **Self-healing pool**: timed-out and crashed workers are replaced
//!   without shrinking the pool or losing batch progress
//! - **Priority dispatch**: higher-priority tasks always run first; equal
//!   priorities keep submission order
//! - **Graceful degradation**: if the pool cannot be established, the same
//!   batch runs on an inline concurrent executor with an identical contract
//! - **Pluggable routines**: analysis checks are resolved from a registry
//!   by name and return plain findings lists
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use scrutiny::config::ScrutinyConfig;
//! use scrutiny::engine::AnalysisEngine;
//! use scrutiny::routines::RoutineRegistry;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let config = ScrutinyConfig::default();
//! let registry = Arc::new(RoutineRegistry::builtin());
//! let engine = AnalysisEngine::new(config, registry);
//!
//! let report = engine.run(Path::new("src/"), None)?;
//! for finding in &report.findings {
//!     println!(
//!         "{}:{} [{}] {}",
//!         finding.file_path,
//!         finding.line.unwrap_or(0),
//!         finding.routine,
//!         finding.message
//!     );
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Analyze the current directory
//! scrutiny analyze
//!
//! # Analyze with four workers and JSON output
//! scrutiny analyze --max-workers 4 --format json src/
//!
//! # List registered routines
//! scrutiny routines
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod routines;
pub mod task;
