//! Configuration loading and defaults
//!
//! Layered configuration in the usual order: built-in defaults, then an
//! optional `scrutiny.{toml,yaml,yml,json}` file, then `SCRUTINY_*`
//! environment overrides. Nested keys use `__` in the environment, e.g.
//! `SCRUTINY_POOL__MAX_WORKERS=4`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Data, Env, Format, Json, Toml, Yaml};
use serde::{Deserialize, Serialize};

/// File names probed in the working directory when no explicit path is given.
const CONFIG_CANDIDATES: &[&str] = &[
    "scrutiny.toml",
    "scrutiny.yaml",
    "scrutiny.yml",
    "scrutiny.json",
];

/// Execution strategy selection for an analysis run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Always run on the worker pool
    Pooled,
    /// Always run inline in the caller's context
    Inline,
    /// Pooled when the batch is big enough to justify it (smart default)
    #[default]
    Auto,
}

/// Worker pool construction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of workers; defaults to the host's logical core count
    pub max_workers: usize,
    /// Soft resident-memory watermark in MB; 0 disables the check
    pub memory_limit_mb: u64,
    /// Per-task timeout
    pub task_timeout_ms: u64,
    /// How long shutdown waits for in-flight work before force-terminating
    pub shutdown_grace_ms: u64,
    pub verbose: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get(),
            memory_limit_mb: 0,
            task_timeout_ms: 30_000,
            shutdown_grace_ms: 30_000,
            verbose: false,
        }
    }
}

/// Analysis engine options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// File extensions considered for analysis; empty means every file
    pub extensions: Vec<String>,
    pub follow_symlinks: bool,
    /// Routine names to run; empty means every registered routine
    pub routines: Vec<String>,
    pub mode: ExecutionMode,
    /// Minimum batch size before Auto mode reaches for the pool
    pub min_tasks_for_pool: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extensions: [
                "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "kt", "rb", "php", "c",
                "h", "cpp", "hpp", "cs",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            follow_symlinks: false,
            routines: Vec::new(),
            mode: ExecutionMode::Auto,
            min_tasks_for_pool: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrutinyConfig {
    pub engine: EngineConfig,
    pub pool: PoolConfig,
}

impl ScrutinyConfig {
    /// Load configuration from an explicit file, or probe the working
    /// directory for the default candidates. No file at all means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => CONFIG_CANDIDATES
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.is_file()),
        };

        let mut figment = Figment::new();
        if let Some(file) = &file {
            figment = figment.merge(provider_for(file)?);
        }
        figment = figment.merge(Env::prefixed("SCRUTINY_").split("__"));

        figment.extract().with_context(|| match &file {
            Some(file) => format!("invalid configuration in {}", file.display()),
            None => "invalid configuration from environment".to_string(),
        })
    }
}

/// Format-dispatching provider, chosen by file extension; TOML when in doubt.
enum FileProvider {
    Toml(Data<Toml>),
    Yaml(Data<Yaml>),
    Json(Data<Json>),
}

impl figment::Provider for FileProvider {
    fn metadata(&self) -> figment::Metadata {
        match self {
            FileProvider::Toml(p) => p.metadata(),
            FileProvider::Yaml(p) => p.metadata(),
            FileProvider::Json(p) => p.metadata(),
        }
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error>
    {
        match self {
            FileProvider::Toml(p) => p.data(),
            FileProvider::Yaml(p) => p.data(),
            FileProvider::Json(p) => p.data(),
        }
    }
}

fn provider_for(path: &Path) -> Result<FileProvider> {
    anyhow::ensure!(path.is_file(), "config file not found: {}", path.display());
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();
    Ok(match extension.as_str() {
        "yaml" | "yml" => FileProvider::Yaml(Yaml::file(path)),
        "json" => FileProvider::Json(Json::file(path)),
        _ => FileProvider::Toml(Toml::file(path)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_sensible() {
        let config = ScrutinyConfig::default();
        assert!(config.pool.max_workers >= 1);
        assert_eq!(config.pool.task_timeout_ms, 30_000);
        assert_eq!(config.engine.mode, ExecutionMode::Auto);
        assert!(config.engine.extensions.iter().any(|e| e == "rs"));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scrutiny.toml");
        fs::write(
            &file,
            "[pool]\nmax_workers = 3\ntask_timeout_ms = 500\n\n[engine]\nmode = \"inline\"\n",
        )
        .unwrap();

        let config = ScrutinyConfig::load(Some(&file)).unwrap();
        assert_eq!(config.pool.max_workers, 3);
        assert_eq!(config.pool.task_timeout_ms, 500);
        assert_eq!(config.engine.mode, ExecutionMode::Inline);
        // Untouched sections keep their defaults
        assert_eq!(config.pool.shutdown_grace_ms, 30_000);
    }

    #[test]
    fn yaml_file_is_accepted_by_extension() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scrutiny.yaml");
        fs::write(&file, "engine:\n  routines:\n    - todo-markers\n").unwrap();

        let config = ScrutinyConfig::load(Some(&file)).unwrap();
        assert_eq!(config.engine.routines, ["todo-markers"]);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let missing = Path::new("/no/such/scrutiny.toml");
        assert!(ScrutinyConfig::load(Some(missing)).is_err());
    }
}
