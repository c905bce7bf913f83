//! Error taxonomy for a comparison run.
//!
//! `InvalidRequest`, `AggregationInvariantViolation` and `NoUsableFacts`
//! abort the run. Everything else degrades a single candidate or dimension.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the comparison engine.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The request itself is unusable; nothing was dispatched.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// A worker's output did not match the wire schema.
    #[error("schema validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A worker task exceeded its deadline.
    #[error("worker timed out after {}s", .0.as_secs_f64())]
    WorkerTimeout(Duration),

    /// A worker returned an explicit error (or panicked).
    #[error("worker failed: {0}")]
    WorkerFailure(String),

    /// The engine produced inconsistent aggregation input. Always a bug.
    #[error("aggregation invariant violated: {0}")]
    AggregationInvariantViolation(String),

    /// Every candidate failed Phase 1.
    #[error("no candidate produced usable facts")]
    NoUsableFacts,
}

impl JudgeError {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            JudgeError::InvalidRequest(_)
                | JudgeError::AggregationInvariantViolation(_)
                | JudgeError::NoUsableFacts
        )
    }
}

/// Reasons a comparison request is rejected by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("cannot read spec file {}: {reason}", path.display())]
    SpecUnreadable { path: PathBuf, reason: String },

    #[error("spec document is empty")]
    EmptySpec,

    #[error("at least 2 candidates are required, got {0}")]
    TooFewCandidates(usize),

    #[error("got {labels} labels for {repos} repositories")]
    LabelCountMismatch { labels: usize, repos: usize },

    #[error("duplicate candidate label '{0}' (use --labels to disambiguate)")]
    DuplicateLabel(String),

    #[error("candidate '{label}' is not usable: {reason}")]
    InvalidCandidate { label: String, reason: String },

    #[error("invalid weights: {0}")]
    InvalidWeights(String),
}

/// A schema violation, located by its field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `security.findings[1].severity`.
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}
