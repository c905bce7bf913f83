//! YoJudge - compare candidate implementations of a specification
//!
//! Runs one analysis worker per candidate and one scoring worker per
//! dimension against a local Ollama model, then combines the scores into a
//! reproducible weighted ranking.
//!
//! Exit codes:
//!   0 - Comparison produced (possibly with degraded candidates or dimensions)
//!   1 - Invalid request, configuration error or fatal engine error
//!   130 - Interrupted

mod analysis;
mod cli;
mod config;
mod dispatch;
mod error;
mod models;
mod pipeline;
mod repo;
mod report;
mod request;
mod scanner;
mod schema;
mod worker;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use dispatch::{DispatchPolicy, Dispatcher};
use error::JudgeError;
use models::{ComparisonReport, ComparisonRequest};
use pipeline::Pipeline;
use repo::GitResolver;
use request::LoadArgs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use worker::{OllamaWorker, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);
    if let Err(e) = config.validate() {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }

    init_logging(&args, &config);

    info!("YoJudge v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Dropping the comparison future on interrupt aborts every running worker task.
    let exit_code = tokio::select! {
        result = run_comparison(&args, &config) => match result {
            Ok(()) => 0,
            Err(e) => {
                if e.downcast_ref::<JudgeError>().is_some_and(JudgeError::is_fatal) {
                    error!("Comparison aborted: {:#}", e);
                } else {
                    error!("Comparison failed: {:#}", e);
                }
                eprintln!("\n❌ Error: {:#}", e);
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n⛔ Interrupted. Outstanding worker tasks were cancelled.");
            130
        }
    };

    std::process::exit(exit_code);
}

/// Handle --init-config: generate a default .yojudge.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the model, deadlines, weights and scanner.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` overrides the verbosity flags.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location; a malformed file is an error
    Ok(Config::load_default()?.unwrap_or_default())
}

/// Run the complete comparison workflow.
async fn run_comparison(args: &Args, config: &Config) -> Result<()> {
    let start_time = Instant::now();

    // Step 1: Load and validate the request
    let load_args = LoadArgs {
        spec_path: args
            .spec_path
            .clone()
            .context("A spec path is required")?,
        repo_paths: args.repo_paths.clone(),
        labels: args.labels.clone(),
        weights: args.weights.clone(),
        config_weights: config.weights.clone(),
        branch: args.branch.clone(),
        base: config.general.base.clone(),
    };

    println!("📋 Loading spec: {}", load_args.spec_path.display());
    let request = request::load(&load_args, &GitResolver)?;
    print_plan(&request, config);

    if args.dry_run {
        return handle_dry_run(&request, config);
    }

    // Step 2: Initialize the worker
    println!("\n🤖 Initializing judge worker...");
    println!("   Model: {}", config.model.name);
    println!("   Ollama: {}", config.model.ollama_url);

    let worker = OllamaWorker::new(WorkerConfig::from(config))?;

    let mut policy = DispatchPolicy::from(&config.dispatch);
    policy.show_progress = !args.quiet;
    let pipeline = Pipeline::new(Dispatcher::new(Arc::new(worker), policy));

    // Step 3: Run both phases and aggregate
    println!("\n🔬 Running comparison...");
    println!("   ⏳ This may take several minutes per candidate.\n");
    let report = pipeline.run(Arc::new(request)).await?;

    // Step 4: Persist and render
    println!("\n📝 Writing reports...");
    let artifact = report::emit(&report, Path::new(&config.general.report_path))?;
    let payload = report::RenderPayload::from_report(&report);
    let output = Path::new(&config.general.output);
    report::write_summary(report::renderer_for(args.format).as_ref(), &payload, output)?;

    print_summary(&report, start_time.elapsed().as_secs_f64());
    println!(
        "\n✅ Comparison complete! Record: {} ({} bytes), summary: {}",
        artifact.path.display(),
        artifact.bytes,
        output.display()
    );

    Ok(())
}

fn print_plan(request: &ComparisonRequest, config: &Config) {
    println!("\n🧾 Candidates:");
    for candidate in &request.candidates {
        match candidate.source.branch {
            Some(ref branch) => println!(
                "   - {} ({} @ {})",
                candidate.label,
                candidate.source.path.display(),
                branch
            ),
            None => println!(
                "   - {} ({})",
                candidate.label,
                candidate.source.path.display()
            ),
        }
    }

    let weights: Vec<String> = request
        .weights
        .iter()
        .map(|(d, w)| format!("{} {}", d, w))
        .collect();
    println!("   Weights: {}", weights.join(", "));
    println!(
        "   Deadlines: analysis {}s, scoring {}s, retries {}, concurrency {}",
        config.dispatch.analysis_timeout_seconds,
        config.dispatch.scoring_timeout_seconds,
        config.dispatch.retries,
        config.dispatch.max_concurrency
    );
}

/// Handle --dry-run: show what each worker would receive, call nothing.
fn handle_dry_run(request: &ComparisonRequest, config: &Config) -> Result<()> {
    println!("\n🔍 Dry run: scanning candidates (no LLM call)...\n");

    let scan_config = scanner::ScanConfig::from(&config.scanner);
    for candidate in &request.candidates {
        let files = scanner::FileScanner::new(candidate.source.path.clone(), scan_config.clone())
            .scan()?;
        let bytes: u64 = files.iter().map(|f| f.size).sum();
        println!(
            "   📄 {}: {} files ({} bytes)",
            candidate.label,
            files.len(),
            bytes
        );

        match repo::change_summary(&candidate.source, &request.base) {
            Ok(change) => println!(
                "      {} vs {}: {} files changed, +{} -{}",
                change.branch, change.base, change.files_changed, change.additions, change.deletions
            ),
            Err(e) => warn!("{}: no change summary: {:#}", candidate.label, e),
        }
    }

    println!("\n✅ Dry run complete. No LLM calls were made.");
    Ok(())
}

fn print_summary(report: &ComparisonReport, duration: f64) {
    println!("\n📊 Ranking:");
    for (i, label) in report.ranking.iter().enumerate() {
        let total = report
            .aggregated
            .iter()
            .find(|r| &r.candidate_label == label)
            .map(|r| r.weighted_total)
            .unwrap_or(0.0);
        println!("   {}. {} ({:.2})", i + 1, label, total);
    }

    println!("\n🏆 {}", report.verdict);

    if !report.degraded.is_empty() {
        println!("\n⚠️  Degraded:");
        for item in &report.degraded {
            println!("   - {}", item);
        }
    }

    println!("\n   Duration: {:.1}s", duration);
}
