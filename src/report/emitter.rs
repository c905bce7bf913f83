//! Persisting the comparison record and preparing the render payload.

use crate::models::{
    ComparisonReport, Degradation, Dimension, DimensionOutcome, Weights,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where a report was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub path: PathBuf,
    pub bytes: usize,
}

/// Write the full versioned report as pretty JSON, creating parent directories.
pub fn emit(report: &ComparisonReport, path: &Path) -> Result<ArtifactHandle> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let content =
        serde_json::to_string_pretty(report).context("Failed to serialize comparison report")?;
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;

    info!("Comparison record written to {}", path.display());

    Ok(ArtifactHandle {
        path: path.to_path_buf(),
        bytes: content.len(),
    })
}

/// One candidate's line in the scores table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRow {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub label: String,
    pub weighted_total: f64,
    /// `None` where the dimension was excluded.
    pub scores: BTreeMap<Dimension, Option<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_unavailable: Option<String>,
}

/// Justifications for one dimension, in ranking order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionNotes {
    pub dimension: Dimension,
    pub weight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<String>,
    pub entries: Vec<ScoreNote>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreNote {
    pub label: String,
    pub score: u8,
    pub justification: String,
}

/// The render-ready subset of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPayload {
    pub created_at: DateTime<Utc>,
    pub spec_path: PathBuf,
    pub weights: Weights,
    pub rows: Vec<ScoreRow>,
    pub notes: Vec<DimensionNotes>,
    pub ranking: Vec<String>,
    pub verdict: String,
    pub drivers: Vec<Dimension>,
    pub degraded: Vec<Degradation>,
}

impl RenderPayload {
    pub fn from_report(report: &ComparisonReport) -> Self {
        let dimensions: Vec<Dimension> = report.weights.dimensions().collect();

        let rows = report
            .ranking
            .iter()
            .enumerate()
            .filter_map(|(i, label)| {
                let result = report
                    .aggregated
                    .iter()
                    .find(|r| &r.candidate_label == label)?;
                Some(ScoreRow {
                    rank: i + 1,
                    label: label.clone(),
                    weighted_total: result.weighted_total,
                    scores: dimensions
                        .iter()
                        .map(|d| (*d, result.per_dimension.get(d).map(|s| s.score)))
                        .collect(),
                    analysis_unavailable: result.analysis_unavailable.clone(),
                })
            })
            .collect();

        let notes = dimensions
            .iter()
            .map(|dimension| {
                let weight = report.weights.get(*dimension);
                match report.scores.get(dimension) {
                    Some(DimensionOutcome::Scored { scores, .. }) => DimensionNotes {
                        dimension: *dimension,
                        weight,
                        unavailable: None,
                        entries: report
                            .ranking
                            .iter()
                            .filter_map(|label| scores.get(label))
                            .map(|s| ScoreNote {
                                label: s.candidate_label.clone(),
                                score: s.score,
                                justification: s.justification.clone(),
                            })
                            .collect(),
                    },
                    Some(DimensionOutcome::Unavailable { reason }) => DimensionNotes {
                        dimension: *dimension,
                        weight,
                        unavailable: Some(reason.clone()),
                        entries: Vec::new(),
                    },
                    None => DimensionNotes {
                        dimension: *dimension,
                        weight,
                        unavailable: Some("not scored".to_string()),
                        entries: Vec::new(),
                    },
                }
            })
            .collect();

        Self {
            created_at: report.created_at,
            spec_path: report.spec_path.clone(),
            weights: report.weights.clone(),
            rows,
            notes,
            ranking: report.ranking.clone(),
            verdict: report.verdict.clone(),
            drivers: report.verdict_detail.drivers.clone(),
            degraded: report.degraded.clone(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample_report;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_emit_writes_versioned_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".yojudge").join("comparison.json");

        let handle = emit(&sample_report(), &path).unwrap();
        assert_eq!(handle.path, path);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["version"], 1);
        assert_eq!(written["created_at"], "2026-03-01T12:00:00Z");
        assert_eq!(written["ranking"], serde_json::json!(["beta", "alpha"]));
        assert_eq!(written["weights"]["functionality"], 60);
        assert_eq!(written["scores"]["security"]["status"], "unavailable");
        assert_eq!(
            written["scores"]["functionality"]["scores"]["beta"]["score"],
            5
        );
        assert_eq!(written["repos"][1]["branch"], "feature/limiter");
        assert_eq!(written["degraded"][0]["subject"]["kind"], "dimension");
        assert_eq!(written["facts"][0]["status"], "available");
        assert_eq!(written["facts"][1]["record"]["repo_label"], "beta");
        assert!(written["verdict"].as_str().unwrap().starts_with("beta wins"));
        assert_eq!(handle.bytes, std::fs::metadata(&path).unwrap().len() as usize);
    }

    #[test]
    fn test_payload_follows_ranking() {
        let payload = RenderPayload::from_report(&sample_report());

        assert_eq!(payload.rows[0].label, "beta");
        assert_eq!(payload.rows[0].rank, 1);
        assert_eq!(payload.rows[0].scores[&Dimension::Functionality], Some(5));
        assert_eq!(payload.rows[1].scores[&Dimension::Security], None);

        assert_eq!(payload.notes.len(), 2);
        assert_eq!(payload.notes[0].entries[0].label, "beta");
        assert_eq!(
            payload.notes[1].unavailable.as_deref(),
            Some("worker timed out after 600s")
        );
        assert_eq!(payload.drivers, vec![Dimension::Functionality]);
    }
}
