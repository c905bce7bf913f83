//! Human-readable summaries.
//!
//! Renderers receive a [`RenderPayload`] and produce text. They never see
//! raw facts and never compute anything beyond formatting.

use super::emitter::{DimensionNotes, RenderPayload, ScoreRow};
use crate::cli::OutputFormat;
use crate::models::{DegradedSubject, Degradation, Dimension};
use anyhow::{Context, Result};
use std::path::Path;

/// Turns a render payload into a document.
pub trait Renderer {
    fn render(&self, payload: &RenderPayload) -> Result<String>;
}

/// Pick the renderer for an output format.
pub fn renderer_for(format: OutputFormat) -> Box<dyn Renderer> {
    match format {
        OutputFormat::Markdown => Box::new(MarkdownRenderer),
        OutputFormat::Json => Box::new(JsonRenderer),
    }
}

/// Render and write a summary to `path`.
pub fn write_summary(renderer: &dyn Renderer, payload: &RenderPayload, path: &Path) -> Result<()> {
    let content = renderer.render(payload)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write summary: {}", path.display()))
}

/// Markdown comparison summary.
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, payload: &RenderPayload) -> Result<String> {
        let mut output = String::new();

        output.push_str("# YoJudge Comparison\n\n");
        output.push_str(&generate_metadata_section(payload));
        output.push_str(&generate_verdict_section(payload));
        output.push_str(&generate_scores_section(payload));
        output.push_str(&generate_notes_section(&payload.notes));
        output.push_str(&generate_degraded_section(&payload.degraded));
        output.push_str(&generate_footer());

        Ok(output)
    }
}

/// Pretty JSON of the payload itself.
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, payload: &RenderPayload) -> Result<String> {
        serde_json::to_string_pretty(payload).map_err(Into::into)
    }
}

fn generate_metadata_section(payload: &RenderPayload) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Spec:** `{}`\n", payload.spec_path.display()));
    section.push_str(&format!(
        "- **Date:** {}\n",
        payload.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Candidates:** {}\n", payload.ranking.len()));
    let weights: Vec<String> = payload
        .weights
        .iter()
        .map(|(d, w)| format!("{} {}", d, w))
        .collect();
    section.push_str(&format!("- **Weights:** {}\n\n", weights.join(", ")));

    section
}

fn generate_verdict_section(payload: &RenderPayload) -> String {
    let mut section = String::new();

    section.push_str("## Verdict\n\n");
    if let Some(winner) = payload.ranking.first() {
        section.push_str(&format!("🏆 **{}**\n\n", winner));
    }
    section.push_str(&format!("{}\n\n", payload.verdict));

    section
}

fn generate_scores_section(payload: &RenderPayload) -> String {
    let dimensions: Vec<Dimension> = payload.weights.dimensions().collect();
    let mut section = String::new();

    section.push_str("## Scores\n\n");

    section.push_str("| Rank | Candidate |");
    for dimension in &dimensions {
        section.push_str(&format!(" {} |", dimension));
    }
    section.push_str(" **Total** |\n");

    section.push_str("|:---:|:---|");
    for _ in &dimensions {
        section.push_str(":---:|");
    }
    section.push_str(":---:|\n");

    for row in &payload.rows {
        section.push_str(&generate_score_row(row, &dimensions));
    }
    section.push('\n');

    section
}

fn generate_score_row(row: &ScoreRow, dimensions: &[Dimension]) -> String {
    let flag = if row.analysis_unavailable.is_some() { " ⚠️" } else { "" };
    let mut line = format!("| {} | {}{} |", row.rank, row.label, flag);

    for dimension in dimensions {
        match row.scores.get(dimension).copied().flatten() {
            Some(score) => line.push_str(&format!(" {} |", score)),
            None => line.push_str(" – |"),
        }
    }
    line.push_str(&format!(" **{:.2}** |\n", row.weighted_total));

    line
}

fn generate_notes_section(notes: &[DimensionNotes]) -> String {
    let mut section = String::new();

    section.push_str("## Justifications\n\n");
    for note in notes {
        section.push_str(&format!("### {} (weight {})\n\n", note.dimension, note.weight));
        if note.dimension.is_inverted() {
            section.push_str("*Fewer findings score higher on this dimension.*\n\n");
        }

        if let Some(ref reason) = note.unavailable {
            section.push_str(&format!("Not scored: {}\n\n", reason));
            continue;
        }

        for entry in &note.entries {
            section.push_str(&format!(
                "- **{}** ({}/5): {}\n",
                entry.label, entry.score, entry.justification
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_degraded_section(degraded: &[Degradation]) -> String {
    if degraded.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Degraded Results\n\n");
    section.push_str("| Kind | Name | Reason |\n");
    section.push_str("|:---|:---|:---|\n");
    for item in degraded {
        let (kind, name) = match &item.subject {
            DegradedSubject::Candidate(label) => ("candidate", label.clone()),
            DegradedSubject::Dimension(d) => ("dimension", d.to_string()),
        };
        section.push_str(&format!("| {} | {} | {} |\n", kind, name, item.reason));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Comparison generated by YoJudge*\n");

    footer
}
