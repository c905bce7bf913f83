//! Weighted totals, ranking and verdict.
//!
//! Everything here is a pure function of already validated scores. The
//! judge's advisory ranking is never consulted.

use crate::error::JudgeError;
use crate::models::{
    AggregatedResult, CandidateFacts, ComparisonRequest, Dimension, DimensionOutcome,
    DimensionScore, DimensionScores, Verdict,
};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Totals closer than this are a tie.
pub const TIE_TOLERANCE: f64 = 1e-6;

/// Output of [`aggregate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// One result per candidate, in request order.
    pub results: Vec<AggregatedResult>,
    /// Candidate labels, best first.
    pub ranking: Vec<String>,
    pub verdict: Verdict,
    /// Dimensions left out of every total, with the reason.
    pub excluded: Vec<(Dimension, String)>,
}

/// Combine per-dimension scores into totals, a ranking and a verdict.
pub fn aggregate(
    request: &ComparisonRequest,
    facts: &[CandidateFacts],
    scores: &DimensionScores,
) -> Result<Aggregation, JudgeError> {
    if request.candidates.len() < 2 {
        return Err(violation(format!(
            "at least 2 candidates are required, got {}",
            request.candidates.len()
        )));
    }
    if request.weights.total() != 100 {
        return Err(violation(format!(
            "request weights sum to {}, not 100",
            request.weights.total()
        )));
    }
    let dimensions = request.dimensions();
    if let Some(extra) = scores.keys().find(|d| !dimensions.contains(d)) {
        return Err(violation(format!(
            "dimension {} is not part of the request",
            extra
        )));
    }

    let mut available: Vec<(Dimension, u32, &BTreeMap<String, DimensionScore>)> = Vec::new();
    let mut excluded = Vec::new();

    for (dimension, weight) in request.weights.iter() {
        match scores.get(&dimension) {
            Some(DimensionOutcome::Scored { scores, .. }) => {
                available.push((dimension, weight, scores))
            }
            Some(DimensionOutcome::Unavailable { reason }) => {
                warn!(
                    "Dimension {} (weight {}) excluded from every total: {}",
                    dimension, weight, reason
                );
                excluded.push((dimension, reason.clone()));
            }
            None => {
                return Err(violation(format!("dimension {} has no outcome", dimension)));
            }
        }
    }

    let available_weight: u32 = available.iter().map(|(_, w, _)| *w).sum();
    if available_weight == 0 {
        warn!("No weighted dimension was scored; every total is 0");
    }

    let mut results = Vec::with_capacity(request.candidates.len());
    for candidate in &request.candidates {
        let label = &candidate.label;
        let mut per_dimension = BTreeMap::new();
        let mut weighted_sum = 0.0;

        for (dimension, weight, dimension_scores) in &available {
            let score = dimension_scores.get(label).ok_or_else(|| {
                violation(format!("{} has no score on {}", label, dimension))
            })?;
            if !(1..=5).contains(&score.score) {
                return Err(violation(format!(
                    "{} scored {} on {}, outside 1..=5",
                    label, score.score, dimension
                )));
            }
            weighted_sum += f64::from(score.score) * f64::from(*weight);
            per_dimension.insert(*dimension, score.clone());
        }

        let weighted_total = if available_weight > 0 {
            weighted_sum / f64::from(available_weight)
        } else {
            0.0
        };
        debug!("{}: weighted total {:.4}", label, weighted_total);

        results.push(AggregatedResult {
            candidate_label: label.clone(),
            weighted_total,
            per_dimension,
            analysis_unavailable: facts
                .iter()
                .find(|f| &f.label == label)
                .and_then(|f| f.outcome.unavailable_reason())
                .map(str::to_string),
        });
    }

    // Stable sort: equal keys keep request order.
    let mut order: Vec<usize> = (0..results.len()).collect();
    order.sort_by_key(|&i| Reverse(quantize(results[i].weighted_total)));
    let ranking: Vec<String> = order
        .iter()
        .map(|&i| results[i].candidate_label.clone())
        .collect();

    let verdict = verdict(
        &results[order[0]],
        &results[order[1]],
        &available,
        &excluded,
        available_weight == 0,
    );

    Ok(Aggregation {
        results,
        ranking,
        verdict,
        excluded,
    })
}

fn violation(message: String) -> JudgeError {
    JudgeError::AggregationInvariantViolation(message)
}

/// Integer ranking key: the total rounded to a multiple of [`TIE_TOLERANCE`].
///
/// Totals that round to the same multiple tie. Two totals closer than the
/// tolerance can still straddle a rounding boundary; totals built from
/// integer scores and weights never get that close without being equal.
fn quantize(total: f64) -> i64 {
    (total / TIE_TOLERANCE).round() as i64
}

fn verdict(
    winner: &AggregatedResult,
    runner_up: &AggregatedResult,
    available: &[(Dimension, u32, &BTreeMap<String, DimensionScore>)],
    excluded: &[(Dimension, String)],
    undetermined: bool,
) -> Verdict {
    let contributions: BTreeMap<Dimension, f64> = available
        .iter()
        .map(|(dimension, weight, _)| {
            let gap = score_on(winner, *dimension) - score_on(runner_up, *dimension);
            (*dimension, gap * f64::from(*weight))
        })
        .collect();

    let tied = quantize(winner.weighted_total) == quantize(runner_up.weighted_total);
    let best = contributions.values().copied().fold(0.0_f64, f64::max);
    let drivers: Vec<Dimension> = if tied || best <= 0.0 {
        Vec::new()
    } else {
        contributions
            .iter()
            .filter(|(_, c)| **c == best)
            .map(|(d, _)| *d)
            .collect()
    };

    let mut summary = if undetermined {
        "No weighted dimension could be scored; the ranking is undetermined and follows input order."
            .to_string()
    } else if tied {
        format!(
            "{} and {} are tied at {:.2}; input order places {} first.",
            winner.candidate_label,
            runner_up.candidate_label,
            winner.weighted_total,
            winner.candidate_label
        )
    } else {
        format!(
            "{} wins with {:.2} against {} at {:.2} (margin {:.2}), driven by {}.",
            winner.candidate_label,
            winner.weighted_total,
            runner_up.candidate_label,
            runner_up.weighted_total,
            winner.weighted_total - runner_up.weighted_total,
            join(&drivers)
        )
    };

    if !excluded.is_empty() {
        let names: Vec<Dimension> = excluded.iter().map(|(d, _)| *d).collect();
        summary.push_str(&format!(" Excluded dimensions: {}.", join(&names)));
    }

    Verdict {
        winner: winner.candidate_label.clone(),
        runner_up: runner_up.candidate_label.clone(),
        winner_total: winner.weighted_total,
        runner_up_total: runner_up.weighted_total,
        margin: winner.weighted_total - runner_up.weighted_total,
        contributions,
        drivers,
        tied,
        summary,
    }
}

fn score_on(result: &AggregatedResult, dimension: Dimension) -> f64 {
    result
        .per_dimension
        .get(&dimension)
        .map(|s| f64::from(s.score))
        .unwrap_or(0.0)
}

fn join(dimensions: &[Dimension]) -> String {
    if dimensions.is_empty() {
        return "no single dimension".to_string();
    }
    dimensions
        .iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
