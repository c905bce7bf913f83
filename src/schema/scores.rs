//! Validation of Phase 2 score sheets.

use super::facts::is_fact_field;
use super::Node;
use crate::error::ValidationError;
use crate::models::{Dimension, DimensionScore, ScoreSheet};
use serde_json::Value;
use std::collections::BTreeMap;

/// Validate a raw score sheet for `dimension`.
///
/// The sheet must score every label in `expected` and nothing else.
pub fn validate_scores(
    raw: &Value,
    dimension: Dimension,
    expected: &[String],
) -> Result<ScoreSheet, ValidationError> {
    let root = Node::root(raw);

    let dimension_node = root.field("dimension")?;
    let reported = dimension_node.str()?;
    if reported != dimension.as_str() {
        return Err(dimension_node.error(format!(
            "expected '{}', got '{}'",
            dimension, reported
        )));
    }

    let ranking = root.field("ranking")?.strings()?;

    let scores_node = root.field("scores")?;
    let mut scores = BTreeMap::new();
    for (label, entry) in scores_node.entries()? {
        if !expected.iter().any(|e| e == label) {
            return Err(entry.error("score for an unknown candidate"));
        }
        let score = score_entry(&entry, dimension, label, &ranking)?;
        scores.insert(label.to_string(), score);
    }

    if let Some(missing) = expected.iter().find(|label| !scores.contains_key(*label)) {
        return Err(ValidationError::new(
            format!("{}.{}", scores_node.path(), missing),
            "candidate was not scored",
        ));
    }

    Ok(ScoreSheet {
        dimension,
        scores,
        ranking,
    })
}

fn score_entry(
    node: &Node<'_>,
    dimension: Dimension,
    label: &str,
    ranking: &[String],
) -> Result<DimensionScore, ValidationError> {
    let score_node = node.field("score")?;
    let score = score_node.count()?;
    if !(1..=5).contains(&score) {
        return Err(score_node.error(format!("must be between 1 and 5, got {}", score)));
    }

    let justification_node = node.field("justification")?;
    let justification = justification_node.str()?.trim().to_string();
    if justification.is_empty() {
        return Err(justification_node.error("a score needs a justification"));
    }

    let evidence_node = node.field("evidence")?;
    let evidence = evidence_node.strings()?;
    if !evidence.iter().any(|e| is_fact_field(e)) {
        return Err(evidence_node.error("must cite at least one fact field"));
    }

    Ok(DimensionScore {
        dimension,
        candidate_label: label.to_string(),
        score: score as u8,
        justification,
        evidence,
        rank_hint: ranking.iter().position(|r| r == label).map(|p| p + 1),
    })
}
