//! Phase 2: one comparative scoring task per dimension.

use super::{run_attempts, Dispatcher, TaskPolicy};
use crate::models::{
    CandidateFacts, ComparisonRequest, Dimension, DimensionOutcome, DimensionScore,
    DimensionScores, FactRecord,
};
use crate::schema;
use crate::worker::Worker;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Score given to a candidate whose facts are unavailable. No judge is asked.
pub fn floor_score(dimension: Dimension, label: &str, reason: &str) -> DimensionScore {
    DimensionScore {
        dimension,
        candidate_label: label.to_string(),
        score: 1,
        justification: format!("analysis unavailable: {}", reason),
        evidence: Vec::new(),
        rank_hint: None,
    }
}

impl Dispatcher {
    /// Score every dimension of the request and wait for all of them.
    ///
    /// Each task sees the facts of every available candidate. Candidates
    /// without facts receive [`floor_score`] on every scored dimension.
    pub async fn score_all(
        &self,
        request: &Arc<ComparisonRequest>,
        facts: &[CandidateFacts],
    ) -> DimensionScores {
        let records: Arc<Vec<FactRecord>> = Arc::new(
            facts
                .iter()
                .filter_map(|f| f.outcome.record().cloned())
                .collect(),
        );
        let expected: Arc<Vec<String>> = Arc::new(
            records
                .iter()
                .map(|r| r.candidate_label.clone())
                .collect(),
        );

        let dimensions = request.dimensions();
        let pb = self.progress(dimensions.len(), "Scoring dimensions");

        let mut tasks = JoinSet::new();
        for (index, dimension) in dimensions.iter().copied().enumerate() {
            let worker = Arc::clone(&self.worker);
            let request = Arc::clone(request);
            let records = Arc::clone(&records);
            let expected = Arc::clone(&expected);
            let limiter = Arc::clone(&self.limiter);
            let policy = self.policy.scoring;

            tasks.spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();
                let outcome = score_one(
                    worker.as_ref(),
                    &request.spec_text,
                    dimension,
                    &records,
                    &expected,
                    policy,
                )
                .await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<DimensionOutcome>> = vec![None; dimensions.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!("Scoring task did not complete: {}", e),
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        dimensions
            .into_iter()
            .zip(slots)
            .map(|(dimension, slot)| {
                let mut outcome = slot.unwrap_or_else(|| DimensionOutcome::Unavailable {
                    reason: "scoring task was cancelled".to_string(),
                });
                if let DimensionOutcome::Scored { ref mut scores, .. } = outcome {
                    for candidate in facts {
                        if let Some(reason) = candidate.outcome.unavailable_reason() {
                            scores.insert(
                                candidate.label.clone(),
                                floor_score(dimension, &candidate.label, reason),
                            );
                        }
                    }
                }
                (dimension, outcome)
            })
            .collect()
    }
}

async fn score_one(
    worker: &dyn Worker,
    spec_text: &str,
    dimension: Dimension,
    records: &[FactRecord],
    expected: &[String],
    policy: TaskPolicy,
) -> DimensionOutcome {
    if records.is_empty() {
        return DimensionOutcome::Unavailable {
            reason: "no candidate facts to score".to_string(),
        };
    }

    let task = format!("scoring of {}", dimension);
    let result = run_attempts(
        policy,
        &task,
        move || worker.score_dimension(spec_text, dimension, records),
        |raw| schema::validate_scores(&raw, dimension, expected),
    )
    .await;

    match result {
        Ok(sheet) => {
            info!("Scored {} for {} candidates", dimension, sheet.scores.len());
            DimensionOutcome::Scored {
                scores: sheet.scores,
                advisory_ranking: sheet.ranking,
            }
        }
        Err(e) => {
            warn!("Dimension {} unavailable: {}", dimension, e);
            DimensionOutcome::Unavailable {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::quiet_dispatcher;
    use crate::models::{FactOutcome, Weights};
    use crate::schema;
    use crate::worker::stub::{facts_for, request, sheet, Behavior, StubWorker};
    use std::time::Duration;

    fn available(label: &str) -> CandidateFacts {
        CandidateFacts {
            label: label.to_string(),
            outcome: FactOutcome::Available {
                record: schema::validate(&facts_for(label)).unwrap(),
            },
        }
    }

    fn unavailable(label: &str, reason: &str) -> CandidateFacts {
        CandidateFacts {
            label: label.to_string(),
            outcome: FactOutcome::Unavailable {
                reason: reason.to_string(),
            },
        }
    }

    fn scores_of(outcome: &DimensionOutcome) -> &std::collections::BTreeMap<String, DimensionScore> {
        match outcome {
            DimensionOutcome::Scored { scores, .. } => scores,
            other => panic!("dimension not scored: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_each_dimension_sees_all_facts() {
        let weights = Weights::parse("functionality:60,tests:40").unwrap();
        let stub = Arc::new(
            StubWorker::new()
                .on_score(
                    Dimension::Functionality,
                    Behavior::reply(sheet(Dimension::Functionality, &[("a", 5), ("b", 3)])),
                )
                .on_score(
                    Dimension::Tests,
                    Behavior::reply(sheet(Dimension::Tests, &[("a", 2), ("b", 4)])),
                ),
        );
        let dispatcher = quiet_dispatcher(stub.clone(), Duration::from_secs(5), 0);

        let scores = dispatcher
            .score_all(&request(&["a", "b"], weights), &[available("a"), available("b")])
            .await;

        assert_eq!(scores.len(), 2);
        assert_eq!(scores_of(&scores[&Dimension::Tests])["b"].score, 4);

        let mut calls = stub.scored();
        calls.sort();
        assert_eq!(
            calls,
            vec![
                (Dimension::Functionality, vec!["a".to_string(), "b".to_string()]),
                (Dimension::Tests, vec!["a".to_string(), "b".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_unavailable_candidate_gets_floor_without_judge_call() {
        let weights = Weights::parse("security:100").unwrap();
        let stub = Arc::new(StubWorker::new().on_score(
            Dimension::Security,
            Behavior::reply(sheet(Dimension::Security, &[("a", 4)])),
        ));
        let dispatcher = quiet_dispatcher(stub.clone(), Duration::from_secs(5), 0);

        let facts = [available("a"), unavailable("b", "worker timed out after 600s")];
        let scores = dispatcher.score_all(&request(&["a", "b"], weights), &facts).await;

        let security = scores_of(&scores[&Dimension::Security]);
        assert_eq!(security["a"].score, 4);
        assert_eq!(security["b"].score, 1);
        assert_eq!(
            security["b"].justification,
            "analysis unavailable: worker timed out after 600s"
        );
        assert_eq!(stub.scored(), vec![(Dimension::Security, vec!["a".to_string()])]);
    }

    #[tokio::test]
    async fn test_failed_dimension_is_unavailable_for_everyone() {
        let weights = Weights::parse("functionality:50,security:50").unwrap();
        let stub = Arc::new(
            StubWorker::new()
                .on_score(
                    Dimension::Functionality,
                    Behavior::reply(sheet(Dimension::Functionality, &[("a", 5), ("b", 3)])),
                )
                .on_score(Dimension::Security, Behavior::Hang),
        );
        let dispatcher = quiet_dispatcher(stub, Duration::from_millis(50), 0);

        let scores = dispatcher
            .score_all(&request(&["a", "b"], weights), &[available("a"), available("b")])
            .await;

        assert!(matches!(scores[&Dimension::Functionality], DimensionOutcome::Scored { .. }));
        match &scores[&Dimension::Security] {
            DimensionOutcome::Unavailable { reason } => assert!(reason.contains("timed out")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_incomplete_sheet_is_rejected() {
        let weights = Weights::parse("tests:100").unwrap();
        let stub = Arc::new(StubWorker::new().on_score(
            Dimension::Tests,
            Behavior::reply(sheet(Dimension::Tests, &[("a", 5)])),
        ));
        let dispatcher = quiet_dispatcher(stub, Duration::from_secs(5), 0);

        let scores = dispatcher
            .score_all(&request(&["a", "b"], weights), &[available("a"), available("b")])
            .await;

        match &scores[&Dimension::Tests] {
            DimensionOutcome::Unavailable { reason } => {
                assert!(reason.contains("scores.b"), "{}", reason)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_advisory_ranking_is_kept() {
        let weights = Weights::parse("functionality:100").unwrap();
        let mut raw = sheet(Dimension::Functionality, &[("a", 3), ("b", 4)]);
        raw["ranking"] = serde_json::json!(["a", "b"]);
        let stub = Arc::new(StubWorker::new().on_score(Dimension::Functionality, Behavior::reply(raw)));
        let dispatcher = quiet_dispatcher(stub, Duration::from_secs(5), 0);

        let scores = dispatcher
            .score_all(&request(&["a", "b"], weights), &[available("a"), available("b")])
            .await;

        match &scores[&Dimension::Functionality] {
            DimensionOutcome::Scored {
                scores,
                advisory_ranking,
            } => {
                assert_eq!(advisory_ranking, &vec!["a".to_string(), "b".to_string()]);
                assert_eq!(scores["b"].rank_hint, Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
