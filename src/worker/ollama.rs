//! Worker backed by a local Ollama model.
//!
//! Analysis embeds the candidate's source files and measured git statistics
//! in a single prompt. Scoring sends every candidate's facts for one
//! dimension in a single prompt so the model calibrates comparatively.

use super::Worker;
use crate::config::Config;
use crate::models::{CandidateRef, ChangeSummary, Dimension, FactRecord};
use crate::repo::change_summary;
use crate::scanner::{FileScanner, ScanConfig};
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Settings of the Ollama worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    /// HTTP timeout of a single request.
    pub timeout_seconds: u64,
    /// Base branch for change statistics.
    pub base: String,
    pub scan: ScanConfig,
}

impl From<&Config> for WorkerConfig {
    fn from(config: &Config) -> Self {
        Self {
            ollama_url: config.model.ollama_url.trim_end_matches('/').to_string(),
            model_name: config.model.name.clone(),
            temperature: config.model.temperature,
            timeout_seconds: config.model.request_timeout_seconds,
            base: config.general.base.clone(),
            scan: ScanConfig::from(&config.scanner),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Judge worker talking to Ollama's `/api/chat`.
pub struct OllamaWorker {
    config: WorkerConfig,
    http_client: reqwest::Client,
}

impl OllamaWorker {
    pub fn new(config: WorkerConfig) -> Result<Self> {
        info!(
            "Initializing worker with model {} at {}",
            config.model_name, config.ollama_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn analyze(&self, spec_text: &str, candidate: &CandidateRef) -> Result<Value> {
        let source = candidate.source.clone();
        let scan = self.config.scan.clone();
        let base = self.config.base.clone();

        let (files, change) = tokio::task::spawn_blocking(move || -> Result<_> {
            let files = FileScanner::new(source.path.clone(), scan).collect_files()?;
            let change = change_summary(&source, &base)?;
            Ok((files, change))
        })
        .await
        .context("Source collection task failed")??;

        if files.is_empty() {
            warn!("{}: no source files matched the scanner settings", candidate.label);
        }
        info!("{}: sending {} files for analysis", candidate.label, files.len());

        let prompt = analysis_prompt(spec_text, &candidate.label, &change, &files);
        let reply = self.send_prompt(ANALYSIS_SYSTEM_PROMPT, &prompt).await?;
        let mut facts = extract_json(&reply)?;

        // Measured statistics replace whatever the model echoed.
        facts["git_info"] = serde_json::to_value(&change)?;
        Ok(facts)
    }

    async fn score(
        &self,
        spec_text: &str,
        dimension: Dimension,
        facts: &[FactRecord],
    ) -> Result<Value> {
        let prompt = scoring_prompt(spec_text, dimension, facts)?;
        info!("Scoring {} over {} candidates", dimension, facts.len());

        let reply = self.send_prompt(SCORING_SYSTEM_PROMPT, &prompt).await?;
        extract_json(&reply)
    }

    /// Send one system + user exchange and return the reply text.
    async fn send_prompt(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.config.ollama_url);

        let request = OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        debug!("POST {} ({} prompt bytes)", url, prompt.len());

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to Ollama at {}", self.config.ollama_url)
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body);
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(chat_response.message.content)
    }
}

impl Worker for OllamaWorker {
    fn analyze_candidate<'a>(
        &'a self,
        spec_text: &'a str,
        candidate: &'a CandidateRef,
    ) -> BoxFuture<'a, Result<Value>> {
        self.analyze(spec_text, candidate).boxed()
    }

    fn score_dimension<'a>(
        &'a self,
        spec_text: &'a str,
        dimension: Dimension,
        facts: &'a [FactRecord],
    ) -> BoxFuture<'a, Result<Value>> {
        self.score(spec_text, dimension, facts).boxed()
    }
}

/// Pull the JSON object out of a model reply.
///
/// Tolerates code fences and prose around the object. Parsing starts at the
/// first `{` and stops at the end of the first complete value.
pub fn extract_json(reply: &str) -> Result<Value> {
    let start = match reply.find('{') {
        Some(start) => start,
        None => bail!("Reply contains no JSON object"),
    };

    let mut values = serde_json::Deserializer::from_str(&reply[start..]).into_iter::<Value>();
    let value = match values.next() {
        Some(value) => value.context("Reply contains malformed JSON")?,
        None => bail!("Reply contains no JSON object"),
    };
    if !value.is_object() {
        bail!("Reply is not a JSON object");
    }
    Ok(value)
}

fn analysis_prompt(
    spec_text: &str,
    label: &str,
    change: &ChangeSummary,
    files: &BTreeMap<String, String>,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("=== SPECIFICATION ===\n\n");
    prompt.push_str(spec_text);
    prompt.push_str("\n\n=== CANDIDATE ===\n\n");
    prompt.push_str(&format!("Label: {}\n", label));
    prompt.push_str(&format!(
        "Branch {} against {}: {} files changed, +{} -{}\n\n",
        change.branch, change.base, change.files_changed, change.additions, change.deletions
    ));

    prompt.push_str("=== FILES ===\n\n");
    for (path, content) in files {
        prompt.push_str(&format!("### FILE: {}\n```\n{}\n```\n\n", path, content));
    }
    prompt.push_str("=== END OF FILES ===\n\n");

    prompt.push_str("Report facts in exactly this JSON layout. Every key is required; use empty arrays and 0 when nothing applies.\n");
    prompt.push_str(&fact_template(label, change));
    prompt.push_str("\n\nseverity is one of low, medium, high, critical. ");
    prompt.push_str("implemented and missing list requirements from spec_requirements. ");
    prompt.push_str("If tests were not run, set ran to false and all counts to 0.\n");

    prompt
}

fn fact_template(label: &str, change: &ChangeSummary) -> String {
    let template = json!({
        "repo_label": label,
        "git_info": change,
        "functionality": {
            "spec_requirements": ["requirement text"],
            "implemented": ["requirement text"],
            "missing": [],
            "test_results": {"ran": true, "passed": 0, "failed": 0, "skipped": 0}
        },
        "security": {
            "findings": [{"file": "src/x.rs", "line": 1, "severity": "low", "description": "what"}],
            "patterns_observed": []
        },
        "tests": {"test_count": 0, "coverage_estimate": "unknown", "dry_violations": []},
        "overengineering": {"abstractions": [], "defensive_code": [], "config_complexity": "low"},
        "dead_code": {
            "unused_imports": [],
            "unused_functions": [],
            "todo_comments": 0,
            "commented_code_blocks": 0
        }
    });
    serde_json::to_string_pretty(&template).unwrap_or_default()
}

fn scoring_prompt(spec_text: &str, dimension: Dimension, facts: &[FactRecord]) -> Result<String> {
    let labels: Vec<&str> = facts.iter().map(|f| f.candidate_label.as_str()).collect();
    let mut prompt = String::new();

    prompt.push_str("=== SPECIFICATION ===\n\n");
    prompt.push_str(spec_text);
    prompt.push_str("\n\n=== FACTS ===\n\n");
    prompt.push_str(
        &serde_json::to_string_pretty(facts).context("Failed to serialize candidate facts")?,
    );

    prompt.push_str(&format!(
        "\n\n=== TASK ===\n\nScore every candidate ({}) on the {} dimension, comparing them against each other.\n\n",
        labels.join(", "),
        dimension
    ));
    prompt.push_str(&rubric(dimension));

    prompt.push_str("\nReply with exactly this JSON layout:\n");
    let mut scores = serde_json::Map::new();
    scores.insert(
        labels.first().copied().unwrap_or("label").to_string(),
        json!({
            "score": 3,
            "justification": "why, citing the facts",
            "evidence": [format!("{}.<field>", dimension.as_str())]
        }),
    );
    let example = json!({
        "dimension": dimension.as_str(),
        "scores": scores,
        "ranking": labels,
    });
    prompt.push_str(&serde_json::to_string_pretty(&example)?);
    prompt.push_str(
        "\n\nInclude an entry for every candidate. score is an integer from 1 to 5. \
         evidence lists the fact field paths the justification relies on.\n",
    );

    Ok(prompt)
}

fn rubric(dimension: Dimension) -> String {
    let focus = match dimension {
        Dimension::Functionality => {
            "functionality.implemented, functionality.missing and functionality.test_results"
        }
        Dimension::Security => "security.findings (weigh severity) and security.patterns_observed",
        Dimension::Tests => "tests.test_count, tests.coverage_estimate and tests.dry_violations",
        Dimension::Overengineering => {
            "overengineering.abstractions, overengineering.defensive_code and overengineering.config_complexity"
        }
        Dimension::DeadCode => {
            "dead_code.unused_imports, dead_code.unused_functions, dead_code.todo_comments and dead_code.commented_code_blocks"
        }
    };

    let mut rubric = format!("Base the score on {}.\n\n", focus);
    if dimension.is_inverted() {
        rubric.push_str(
            "This scale is INVERTED: fewer findings score higher.\n\
             5 = none found\n\
             4 = isolated instances\n\
             3 = noticeable in several places\n\
             2 = widespread\n\
             1 = pervasive\n",
        );
    } else {
        rubric.push_str(
            "5 = excellent, no gaps\n\
             4 = minor gaps\n\
             3 = moderate gaps\n\
             2 = significant gaps\n\
             1 = basic requirements unmet\n",
        );
    }
    rubric
}

const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a meticulous code auditor extracting FACTS about one implementation of a specification.

Record what is there, not how good it is. Do not score, rank or recommend.
Cite files and line numbers for security findings.
Reply with a single JSON object and nothing else.
"#;

const SCORING_SYSTEM_PROMPT: &str = r#"You are an impartial judge comparing several implementations of the same specification on one dimension.

Use only the supplied facts. Calibrate scores across candidates: equal evidence earns equal scores.
Every justification must cite the fact fields it relies on.
Reply with a single JSON object and nothing else.
"#;
