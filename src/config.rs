//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.yojudge.toml` files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".yojudge.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Worker dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Scanner settings.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Dimension weights; defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<BTreeMap<String, i64>>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Rendered summary output path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Persisted comparison record path, relative to the working directory.
    #[serde(default = "default_report_path")]
    pub report_path: String,

    /// Base branch candidates are compared against.
    #[serde(default = "default_base")]
    pub base: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            report_path: default_report_path(),
            base: default_base(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "comparison_report.md".to_string()
}

fn default_report_path() -> String {
    ".yojudge/comparison.json".to_string()
}

fn default_base() -> String {
    "main".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP request timeout in seconds. Task deadlines live in `[dispatch]`.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_model() -> String {
    "qwen2.5-coder:32b".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.0
}

fn default_request_timeout() -> u64 {
    900
}

/// Deadlines, retries and parallelism of worker tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Deadline of one Phase 1 analysis attempt.
    #[serde(default = "default_task_timeout")]
    pub analysis_timeout_seconds: u64,

    /// Deadline of one Phase 2 scoring attempt.
    #[serde(default = "default_task_timeout")]
    pub scoring_timeout_seconds: u64,

    /// Extra attempts after a failed task. Zero by default.
    #[serde(default)]
    pub retries: u32,

    /// Maximum number of worker tasks in flight.
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            analysis_timeout_seconds: default_task_timeout(),
            scoring_timeout_seconds: default_task_timeout(),
            retries: 0,
            max_concurrency: default_concurrency(),
        }
    }
}

impl DispatchConfig {
    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_seconds)
    }

    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_secs(self.scoring_timeout_seconds)
    }

    /// Reject settings under which no task could ever finish.
    pub fn validate(&self) -> Result<()> {
        if self.analysis_timeout_seconds == 0 || self.scoring_timeout_seconds == 0 {
            bail!("Dispatch timeouts must be at least 1 second");
        }
        if self.max_concurrency == 0 {
            bail!("Dispatch concurrency must be at least 1");
        }
        Ok(())
    }
}

fn default_task_timeout() -> u64 {
    600 // 10 min per task
}

fn default_concurrency() -> usize {
    4
}

/// File scanner settings for the analysis worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Maximum files embedded per candidate.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// File extensions to include.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Names to exclude.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,

    /// Maximum file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            extensions: default_extensions(),
            excludes: default_excludes(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_files() -> usize {
    100
}

fn default_extensions() -> Vec<String> {
    vec![
        "rs", "py", "js", "ts", "jsx", "tsx", "go", "java", "c", "cpp", "h", "hpp", "cs", "rb",
        "php", "swift", "kt", "scala", "toml", "json", "yaml", "yml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_excludes() -> Vec<String> {
    vec![
        "target",
        "node_modules",
        "vendor",
        "dist",
        "build",
        "__pycache__",
        "venv",
        "package-lock.json",
        "Cargo.lock",
        "yarn.lock",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_file_size() -> u64 {
    100 * 1024 // 100KB
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Load `.yojudge.toml` from a directory, if present.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE_NAME);

        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Check the merged settings before anything is dispatched.
    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate()
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings. Only values
    /// the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }

        if let Some(secs) = args.analysis_timeout {
            self.dispatch.analysis_timeout_seconds = secs;
        }
        if let Some(secs) = args.scoring_timeout {
            self.dispatch.scoring_timeout_seconds = secs;
        }
        if let Some(retries) = args.retries {
            self.dispatch.retries = retries;
        }
        if let Some(concurrency) = args.concurrency {
            self.dispatch.max_concurrency = concurrency;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(ref report_path) = args.report_path {
            self.general.report_path = report_path.display().to_string();
        }
        if let Some(ref base) = args.base {
            self.general.base = base.clone();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
