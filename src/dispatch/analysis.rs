//! Phase 1: one analysis task per candidate.

use super::{run_attempts, Dispatcher, TaskPolicy};
use crate::error::ValidationError;
use crate::models::{CandidateFacts, CandidateRef, ComparisonRequest, FactOutcome, FactRecord};
use crate::schema;
use crate::worker::Worker;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

impl Dispatcher {
    /// Analyze every candidate concurrently and wait for all of them.
    ///
    /// The result holds one entry per candidate, in request order. A failed
    /// candidate is recorded as unavailable and never affects its siblings.
    pub async fn analyze_all(&self, request: &Arc<ComparisonRequest>) -> Vec<CandidateFacts> {
        let total = request.candidates.len();
        let pb = self.progress(total, "Analyzing candidates");

        let mut tasks = JoinSet::new();
        for index in 0..total {
            let worker = Arc::clone(&self.worker);
            let request = Arc::clone(request);
            let limiter = Arc::clone(&self.limiter);
            let policy = self.policy.analysis;

            tasks.spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();
                let candidate = &request.candidates[index];
                let outcome =
                    analyze_one(worker.as_ref(), &request.spec_text, candidate, policy).await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<FactOutcome>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!("Analysis task did not complete: {}", e),
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        request
            .candidates
            .iter()
            .zip(slots)
            .map(|(candidate, slot)| CandidateFacts {
                label: candidate.label.clone(),
                outcome: slot.unwrap_or_else(|| FactOutcome::Unavailable {
                    reason: "analysis task was cancelled".to_string(),
                }),
            })
            .collect()
    }
}

async fn analyze_one(
    worker: &dyn Worker,
    spec_text: &str,
    candidate: &CandidateRef,
    policy: TaskPolicy,
) -> FactOutcome {
    let task = format!("analysis of {}", candidate.label);
    let result = run_attempts(
        policy,
        &task,
        move || worker.analyze_candidate(spec_text, candidate),
        |raw| check_facts(&raw, &candidate.label),
    )
    .await;

    match result {
        Ok(record) => {
            info!("Facts collected for {}", candidate.label);
            FactOutcome::Available { record }
        }
        Err(e) => {
            warn!("Facts unavailable for {}: {}", candidate.label, e);
            FactOutcome::Unavailable {
                reason: e.to_string(),
            }
        }
    }
}

/// Validate a raw record and make sure it describes `label`.
fn check_facts(raw: &Value, label: &str) -> Result<FactRecord, ValidationError> {
    let record = schema::validate(raw)?;
    if record.candidate_label != label {
        return Err(ValidationError::new(
            "repo_label",
            format!(
                "expected '{}', got '{}'",
                label, record.candidate_label
            ),
        ));
    }
    Ok(record)
}
