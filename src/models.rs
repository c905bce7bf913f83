//! Data models for a comparison run.
//!
//! This module contains the request, the per-candidate facts, the
//! per-dimension scores and the final report structures.

use crate::error::RequestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Version of the persisted report layout.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Severity level of a security finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a wire severity. Only the four lowercase names are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// One evaluation axis. Declaration order is the canonical iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Functionality,
    Security,
    Tests,
    Overengineering,
    DeadCode,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Functionality,
        Dimension::Security,
        Dimension::Tests,
        Dimension::Overengineering,
        Dimension::DeadCode,
    ];

    /// Wire name of the dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Functionality => "functionality",
            Dimension::Security => "security",
            Dimension::Tests => "tests",
            Dimension::Overengineering => "overengineering",
            Dimension::DeadCode => "dead_code",
        }
    }

    /// Whether fewer findings mean a better score on this axis.
    pub fn is_inverted(&self) -> bool {
        matches!(self, Dimension::Overengineering | Dimension::DeadCode)
    }

    /// Default weight when the request does not supply any.
    pub fn default_weight(&self) -> u32 {
        match self {
            Dimension::Functionality => 30,
            Dimension::Security => 25,
            Dimension::Tests => 20,
            Dimension::Overengineering => 15,
            Dimension::DeadCode => 10,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "functionality" => Ok(Dimension::Functionality),
            "security" => Ok(Dimension::Security),
            "tests" => Ok(Dimension::Tests),
            "overengineering" => Ok(Dimension::Overengineering),
            "dead_code" | "deadcode" => Ok(Dimension::DeadCode),
            other => Err(format!("unknown dimension '{}'", other)),
        }
    }
}

/// Dimension weights. Integers, each >= 0, summing to exactly 100.
///
/// The dimensions of a run are exactly the keys of its weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Weights(BTreeMap<Dimension, u32>);

impl Default for Weights {
    fn default() -> Self {
        Self(
            Dimension::ALL
                .iter()
                .map(|d| (*d, d.default_weight()))
                .collect(),
        )
    }
}

impl Weights {
    /// Build weights from `(name, value)` pairs, rejecting anything that is
    /// not a known dimension with a non-negative integer weight.
    pub fn from_pairs<I, K>(pairs: I) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        let mut map = BTreeMap::new();

        for (name, value) in pairs {
            let dimension: Dimension = name
                .as_ref()
                .parse()
                .map_err(RequestError::InvalidWeights)?;

            if value < 0 {
                return Err(RequestError::InvalidWeights(format!(
                    "weight for {} must be non-negative, got {}",
                    dimension, value
                )));
            }
            let value = u32::try_from(value).map_err(|_| {
                RequestError::InvalidWeights(format!("weight for {} is too large", dimension))
            })?;

            if map.insert(dimension, value).is_some() {
                return Err(RequestError::InvalidWeights(format!(
                    "dimension {} is weighted more than once",
                    dimension
                )));
            }
        }

        if map.is_empty() {
            return Err(RequestError::InvalidWeights(
                "no dimensions were weighted".to_string(),
            ));
        }

        let total: u64 = map.values().map(|w| u64::from(*w)).sum();
        if total != 100 {
            return Err(RequestError::InvalidWeights(format!(
                "weights must sum to 100, got {}",
                total
            )));
        }

        Ok(Self(map))
    }

    /// Parse the CLI form: `functionality:40,security:30,tests:30`.
    /// `=` is accepted as a separator too.
    pub fn parse(spec: &str) -> Result<Self, RequestError> {
        let mut pairs = Vec::new();

        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once([':', '=']).ok_or_else(|| {
                RequestError::InvalidWeights(format!("expected name:weight, got '{}'", part))
            })?;
            let value: i64 = value.trim().parse().map_err(|_| {
                RequestError::InvalidWeights(format!(
                    "weight for '{}' must be an integer, got '{}'",
                    name.trim(),
                    value.trim()
                ))
            })?;
            pairs.push((name.trim().to_string(), value));
        }

        Self::from_pairs(pairs)
    }

    /// Weight of a dimension, 0 when it is not part of the run.
    pub fn get(&self, dimension: Dimension) -> u32 {
        self.0.get(&dimension).copied().unwrap_or(0)
    }

    /// Dimensions of the run, in canonical order.
    pub fn dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.0.keys().copied()
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, u32)> + '_ {
        self.0.iter().map(|(d, w)| (*d, *w))
    }
}

/// Opaque handle to a candidate's sources, passed through to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSource {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// One implementation being compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRef {
    pub label: String,
    pub source: CandidateSource,
}

/// Immutable input of a run.
#[derive(Debug, Clone)]
pub struct ComparisonRequest {
    pub spec_path: PathBuf,
    pub spec_text: String,
    pub candidates: Vec<CandidateRef>,
    pub weights: Weights,
    /// Base branch used for change summaries.
    pub base: String,
}

impl ComparisonRequest {
    /// Dimensions scored in this run, in canonical order.
    pub fn dimensions(&self) -> Vec<Dimension> {
        self.weights.dimensions().collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.label.clone()).collect()
    }
}

/// Size of a candidate's change against its base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub branch: String,
    pub base: String,
    pub files_changed: u64,
    pub additions: u64,
    pub deletions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResults {
    pub ran: bool,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl TestResults {
    pub fn total(&self) -> u64 {
        self.passed + self.failed + self.skipped
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionalityFacts {
    pub spec_requirements: Vec<String>,
    pub implemented: BTreeSet<String>,
    pub missing: Vec<String>,
    pub test_results: TestResults,
}

/// A located security observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub file: String,
    pub line: u64,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityFacts {
    pub findings: Vec<Finding>,
    pub patterns_observed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestFacts {
    pub test_count: u64,
    pub coverage_estimate: String,
    pub dry_violations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverengineeringFacts {
    pub abstractions: Vec<String>,
    pub defensive_code: Vec<String>,
    pub config_complexity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadCodeFacts {
    pub unused_imports: Vec<String>,
    pub unused_functions: Vec<String>,
    pub todo_comments: u64,
    pub commented_code_blocks: u64,
}

/// Judgment-free evidence about one candidate (Phase 1 output).
///
/// Serializes back to the wire layout so it can be handed to scoring
/// workers and embedded in the report unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactRecord {
    #[serde(rename = "repo_label")]
    pub candidate_label: String,
    #[serde(rename = "git_info")]
    pub change_summary: ChangeSummary,
    pub functionality: FunctionalityFacts,
    pub security: SecurityFacts,
    pub tests: TestFacts,
    pub overengineering: OverengineeringFacts,
    pub dead_code: DeadCodeFacts,
}

/// Phase 1 result for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FactOutcome {
    Available { record: FactRecord },
    Unavailable { reason: String },
}

impl FactOutcome {
    pub fn record(&self) -> Option<&FactRecord> {
        match self {
            FactOutcome::Available { record } => Some(record),
            FactOutcome::Unavailable { .. } => None,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            FactOutcome::Available { .. } => None,
            FactOutcome::Unavailable { reason } => Some(reason),
        }
    }
}

/// Phase 1 result keyed by candidate, in request order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateFacts {
    pub label: String,
    #[serde(flatten)]
    pub outcome: FactOutcome,
}

/// Score of one candidate on one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionScore {
    pub dimension: Dimension,
    pub candidate_label: String,
    pub score: u8,
    pub justification: String,
    pub evidence: Vec<String>,
    /// 1-based position in the judge's advisory ranking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_hint: Option<usize>,
}

/// A validated score sheet for one dimension, as returned by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSheet {
    pub dimension: Dimension,
    pub scores: BTreeMap<String, DimensionScore>,
    /// Advisory only; the aggregator recomputes the ranking.
    pub ranking: Vec<String>,
}

/// Phase 2 result for one dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DimensionOutcome {
    Scored {
        scores: BTreeMap<String, DimensionScore>,
        advisory_ranking: Vec<String>,
    },
    Unavailable {
        reason: String,
    },
}

/// Phase 2 result keyed by dimension.
pub type DimensionScores = BTreeMap<Dimension, DimensionOutcome>;

/// Aggregated standing of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
    pub candidate_label: String,
    pub weighted_total: f64,
    pub per_dimension: BTreeMap<Dimension, DimensionScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_unavailable: Option<String>,
}

/// Deterministic explanation of the ranking's top pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub winner: String,
    pub runner_up: String,
    pub winner_total: f64,
    pub runner_up_total: f64,
    pub margin: f64,
    /// `(score_winner - score_runner_up) * weight` per available dimension.
    pub contributions: BTreeMap<Dimension, f64>,
    /// Dimension(s) with the largest positive contribution.
    pub drivers: Vec<Dimension>,
    pub tied: bool,
    pub summary: String,
}

/// What a degradation applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum DegradedSubject {
    Candidate(String),
    Dimension(Dimension),
}

/// A candidate or dimension that was not fully scored, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Degradation {
    pub subject: DegradedSubject,
    pub reason: String,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            DegradedSubject::Candidate(label) => write!(f, "candidate {}: {}", label, self.reason),
            DegradedSubject::Dimension(d) => write!(f, "dimension {}: {}", d, self.reason),
        }
    }
}

/// A candidate as recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoEntry {
    pub label: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl From<&CandidateRef> for RepoEntry {
    fn from(candidate: &CandidateRef) -> Self {
        Self {
            label: candidate.label.clone(),
            path: candidate.source.path.clone(),
            branch: candidate.source.branch.clone(),
        }
    }
}

/// The terminal artifact of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub spec_path: PathBuf,
    pub repos: Vec<RepoEntry>,
    pub weights: Weights,
    pub facts: Vec<CandidateFacts>,
    pub scores: DimensionScores,
    pub aggregated: Vec<AggregatedResult>,
    pub ranking: Vec<String>,
    pub verdict: String,
    pub verdict_detail: Verdict,
    pub degraded: Vec<Degradation>,
}
