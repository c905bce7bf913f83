//! Worker capability consumed by the dispatchers.
//!
//! A worker turns a candidate into raw facts and a dimension into raw
//! scores. How it reaches its judgment is opaque to the engine; its output
//! is untrusted until the schema validator accepts it.

pub mod ollama;
#[cfg(test)]
pub mod stub;

pub use ollama::{OllamaWorker, WorkerConfig};

use crate::models::{CandidateRef, Dimension, FactRecord};
use futures::future::BoxFuture;
use serde_json::Value;

/// External judgment capability.
///
/// Calls may take arbitrarily long and may be retried by the dispatcher, so
/// implementations must be safe to call again with the same input.
pub trait Worker: Send + Sync {
    /// Extract judgment-free facts about one candidate.
    fn analyze_candidate<'a>(
        &'a self,
        spec_text: &'a str,
        candidate: &'a CandidateRef,
    ) -> BoxFuture<'a, anyhow::Result<Value>>;

    /// Score every candidate in `facts` on one dimension, comparatively.
    fn score_dimension<'a>(
        &'a self,
        spec_text: &'a str,
        dimension: Dimension,
        facts: &'a [FactRecord],
    ) -> BoxFuture<'a, anyhow::Result<Value>>;
}
