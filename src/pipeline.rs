//! End-to-end comparison run.
//!
//! Phase 1 analyzes every candidate, Phase 2 scores every dimension over the
//! collected facts, then the aggregator ranks. Each phase is a full barrier.

use crate::analysis::aggregate;
use crate::dispatch::Dispatcher;
use crate::error::JudgeError;
use crate::models::{
    CandidateFacts, ComparisonReport, ComparisonRequest, Degradation, DegradedSubject,
    DimensionOutcome, DimensionScores, RepoEntry, REPORT_SCHEMA_VERSION,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Drives one comparison from request to report.
pub struct Pipeline {
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Run both phases and aggregate.
    ///
    /// Fails only when no candidate produced facts or when aggregation finds
    /// inconsistent input. Every other failure is listed in `degraded`.
    pub async fn run(&self, request: Arc<ComparisonRequest>) -> Result<ComparisonReport, JudgeError> {
        info!("Phase 1: analyzing {}", request.labels().join(", "));
        let facts = self.dispatcher.analyze_all(&request).await;

        let usable = facts.iter().filter(|f| f.outcome.record().is_some()).count();
        if usable == 0 {
            return Err(JudgeError::NoUsableFacts);
        }
        info!("Phase 1 complete: {}/{} candidates usable", usable, facts.len());

        info!("Phase 2: scoring {} dimensions", request.weights.dimensions().count());
        let scores = self.dispatcher.score_all(&request, &facts).await;

        let aggregation = aggregate(&request, &facts, &scores)?;
        let degraded = degradations(&facts, &scores);
        for item in &degraded {
            warn!("Degraded {}", item);
        }

        Ok(ComparisonReport {
            version: REPORT_SCHEMA_VERSION,
            created_at: Utc::now(),
            spec_path: request.spec_path.clone(),
            repos: request.candidates.iter().map(RepoEntry::from).collect(),
            weights: request.weights.clone(),
            facts,
            scores,
            aggregated: aggregation.results,
            ranking: aggregation.ranking,
            verdict: aggregation.verdict.summary.clone(),
            verdict_detail: aggregation.verdict,
            degraded,
        })
    }
}

/// Unavailable candidates first, in request order, then unavailable dimensions.
fn degradations(facts: &[CandidateFacts], scores: &DimensionScores) -> Vec<Degradation> {
    let candidates = facts.iter().filter_map(|f| {
        f.outcome.unavailable_reason().map(|reason| Degradation {
            subject: DegradedSubject::Candidate(f.label.clone()),
            reason: reason.to_string(),
        })
    });

    let dimensions = scores.iter().filter_map(|(dimension, outcome)| match outcome {
        DimensionOutcome::Unavailable { reason } => Some(Degradation {
            subject: DegradedSubject::Dimension(*dimension),
            reason: reason.clone(),
        }),
        DimensionOutcome::Scored { .. } => None,
    });

    candidates.chain(dimensions).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::quiet_dispatcher;
    use crate::models::{Dimension, Weights};
    use crate::worker::stub::{facts_for, request, sheet, Behavior, StubWorker};
    use std::time::Duration;

    fn scored_everywhere(mut stub: StubWorker, scores: &[(&str, u8)]) -> StubWorker {
        for dimension in Dimension::ALL {
            stub = stub.on_score(dimension, Behavior::reply(sheet(dimension, scores)));
        }
        stub
    }

    #[tokio::test]
    async fn test_timed_out_candidate_ranks_last_with_floor_scores() {
        let stub = StubWorker::new()
            .on_analyze("a", Behavior::reply(facts_for("a")))
            .on_analyze("b", Behavior::Hang)
            .on_analyze("c", Behavior::reply(facts_for("c")));
        let stub = Arc::new(scored_everywhere(stub, &[("a", 3), ("c", 4)]));
        let pipeline = Pipeline::new(quiet_dispatcher(stub.clone(), Duration::from_millis(50), 0));

        let report = pipeline
            .run(request(&["a", "b", "c"], Weights::default()))
            .await
            .unwrap();

        assert_eq!(report.ranking, vec!["c", "a", "b"]);

        let b = &report.aggregated[1];
        assert_eq!(b.candidate_label, "b");
        assert!((b.weighted_total - 1.0).abs() < 1e-9);
        assert_eq!(b.per_dimension.len(), 5);
        assert!(b.per_dimension.values().all(|s| s.score == 1));
        assert!(b.analysis_unavailable.as_deref().unwrap().contains("timed out"));

        assert_eq!(report.degraded.len(), 1);
        assert_eq!(
            report.degraded[0].subject,
            DegradedSubject::Candidate("b".to_string())
        );

        // The judge never saw b's facts.
        assert!(stub.scored().iter().all(|(_, labels)| labels == &["a", "c"]));
        assert_eq!(report.version, REPORT_SCHEMA_VERSION);
        assert_eq!(report.verdict, report.verdict_detail.summary);
    }

    #[tokio::test]
    async fn test_completion_order_does_not_change_the_result() {
        async fn run_with_delays(delays: [u64; 3]) -> ComparisonReport {
            let labels = ["x", "y", "z"];
            let mut stub = StubWorker::new();
            for (label, delay) in labels.iter().zip(delays) {
                stub = stub.on_analyze(label, Behavior::delayed(facts_for(label), delay));
            }
            for (i, dimension) in Dimension::ALL.iter().enumerate() {
                let scores = [("x", 2 + (i % 3) as u8), ("y", 4), ("z", 3)];
                let delay = delays[i % 3] / 2;
                stub = stub.on_score(*dimension, Behavior::delayed(sheet(*dimension, &scores), delay));
            }
            let pipeline = Pipeline::new(quiet_dispatcher(Arc::new(stub), Duration::from_secs(5), 0));
            pipeline
                .run(request(&labels, Weights::default()))
                .await
                .unwrap()
        }

        let forward = run_with_delays([0, 30, 60]).await;
        let backward = run_with_delays([60, 30, 0]).await;

        let canonical = |report: &ComparisonReport| {
            serde_json::to_string(&(
                &report.facts,
                &report.scores,
                &report.aggregated,
                &report.ranking,
                &report.verdict_detail,
            ))
            .unwrap()
        };
        assert_eq!(canonical(&forward), canonical(&backward));
        assert_eq!(forward.ranking[0], "y");
    }

    #[tokio::test]
    async fn test_failed_dimension_is_listed_as_degraded() {
        let weights = Weights::parse("functionality:50,security:50").unwrap();
        let stub = StubWorker::new()
            .on_analyze("a", Behavior::reply(facts_for("a")))
            .on_analyze("b", Behavior::reply(facts_for("b")))
            .on_score(
                Dimension::Functionality,
                Behavior::reply(sheet(Dimension::Functionality, &[("a", 2), ("b", 5)])),
            )
            .on_score(Dimension::Security, Behavior::Fail("judge refused".to_string()));
        let pipeline = Pipeline::new(quiet_dispatcher(Arc::new(stub), Duration::from_secs(5), 0));

        let report = pipeline.run(request(&["a", "b"], weights)).await.unwrap();

        assert_eq!(report.ranking, vec!["b", "a"]);
        assert!((report.aggregated[1].weighted_total - 5.0).abs() < 1e-9);
        assert_eq!(
            report.degraded[0].subject,
            DegradedSubject::Dimension(Dimension::Security)
        );
        assert!(report.degraded[0].reason.contains("judge refused"));
    }

    #[tokio::test]
    async fn test_no_usable_facts_aborts_before_scoring() {
        let stub = Arc::new(
            StubWorker::new()
                .on_analyze("a", Behavior::Fail("down".to_string()))
                .on_analyze("b", Behavior::Panic),
        );
        let pipeline = Pipeline::new(quiet_dispatcher(stub.clone(), Duration::from_secs(5), 0));

        let result = pipeline.run(request(&["a", "b"], Weights::default())).await;

        assert!(matches!(result, Err(JudgeError::NoUsableFacts)));
        assert!(stub.scored().is_empty());
    }
}
