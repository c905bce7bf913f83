//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// yojudge - compare candidate implementations of a spec
///
/// Runs one analysis worker per candidate, then one scoring worker per
/// dimension, and combines the scores into a reproducible weighted ranking.
///
/// Examples:
///   yojudge SPEC.md ../impl-a ../impl-b
///   yojudge SPEC.md ./a ./b ./c --labels alpha,beta,gamma
///   yojudge SPEC.md ./a ./b --weights functionality:50,security:30,tests:20
///   yojudge SPEC.md ./a ./b --branch feature/limiter --base main
///   yojudge --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the specification document
    #[arg(value_name = "SPEC", required_unless_present = "init_config")]
    pub spec_path: Option<PathBuf>,

    /// Candidate repositories to compare (at least two)
    #[arg(value_name = "REPO", required_unless_present = "init_config")]
    pub repo_paths: Vec<PathBuf>,

    /// Candidate labels, one per repository (comma-separated)
    ///
    /// Defaults to each repository's directory name.
    #[arg(long, value_name = "LABELS", value_delimiter = ',')]
    pub labels: Option<Vec<String>>,

    /// Dimension weights, summing to 100
    ///
    /// Example: --weights functionality:30,security:25,tests:20,overengineering:15,dead_code:10
    #[arg(long, value_name = "WEIGHTS")]
    pub weights: Option<String>,

    /// Branch to evaluate in every candidate repository
    ///
    /// If not specified, each repository's checked-out HEAD is used
    #[arg(short, long, value_name = "BRANCH")]
    pub branch: Option<String>,

    /// Base branch for change summaries
    #[arg(long, value_name = "BRANCH")]
    pub base: Option<String>,

    /// Output file for the rendered summary
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Where to persist the structured comparison record
    #[arg(long, value_name = "FILE")]
    pub report_path: Option<PathBuf>,

    /// Output format of the rendered summary (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .yojudge.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ollama model used by the workers
    #[arg(short, long, env = "YOJUDGE_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Deadline in seconds for each candidate analysis
    #[arg(long, value_name = "SECS")]
    pub analysis_timeout: Option<u64>,

    /// Deadline in seconds for each dimension scoring
    #[arg(long, value_name = "SECS")]
    pub scoring_timeout: Option<u64>,

    /// Extra attempts for a failed worker task
    #[arg(long, value_name = "NUM")]
    pub retries: Option<u32>,

    /// Maximum number of worker tasks running at once
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Validate the request and print the plan without calling any worker
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .yojudge.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the rendered summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate options that do not depend on the filesystem.
    ///
    /// Candidate and weight checks belong to the request loader.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.analysis_timeout == Some(0) || self.scoring_timeout == Some(0) {
            return Err("Timeouts must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("yojudge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_positional_arguments() {
        let args = parse(&["SPEC.md", "a", "b", "c", "--labels", "x,y,z"]);
        assert_eq!(args.spec_path, Some(PathBuf::from("SPEC.md")));
        assert_eq!(args.repo_paths.len(), 3);
        assert_eq!(
            args.labels,
            Some(vec!["x".to_string(), "y".to_string(), "z".to_string()])
        );
        assert_eq!(args.format, OutputFormat::Markdown);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_spec_required_without_init_config() {
        let result = Args::try_parse_from(["yojudge"]);
        assert!(result.is_err());

        let args = parse(&["--init-config"]);
        assert!(args.init_config);
        assert!(args.spec_path.is_none());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let args = parse(&["SPEC.md", "a", "b", "--verbose", "--quiet"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let args = parse(&["SPEC.md", "a", "b", "--concurrency", "0"]);
        assert!(args.validate().is_err());

        let args = parse(&["SPEC.md", "a", "b", "--analysis-timeout", "0"]);
        assert!(args.validate().is_err());

        let args = parse(&["SPEC.md", "a", "b", "--ollama-url", "localhost:11434"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["SPEC.md", "a", "b"]);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
