//! Validation of Phase 1 fact records.

use super::Node;
use crate::error::ValidationError;
use crate::models::{
    ChangeSummary, DeadCodeFacts, FactRecord, Finding, FunctionalityFacts, OverengineeringFacts,
    SecurityFacts, Severity, TestFacts, TestResults,
};
use serde_json::Value;
use std::collections::BTreeSet;

/// Every field path of the fact wire format. Score evidence must cite at
/// least one of these.
pub const FACT_FIELD_PATHS: &[&str] = &[
    "repo_label",
    "git_info",
    "git_info.branch",
    "git_info.base",
    "git_info.files_changed",
    "git_info.additions",
    "git_info.deletions",
    "functionality",
    "functionality.spec_requirements",
    "functionality.implemented",
    "functionality.missing",
    "functionality.test_results",
    "functionality.test_results.ran",
    "functionality.test_results.passed",
    "functionality.test_results.failed",
    "functionality.test_results.skipped",
    "security",
    "security.findings",
    "security.patterns_observed",
    "tests",
    "tests.test_count",
    "tests.coverage_estimate",
    "tests.dry_violations",
    "overengineering",
    "overengineering.abstractions",
    "overengineering.defensive_code",
    "overengineering.config_complexity",
    "dead_code",
    "dead_code.unused_imports",
    "dead_code.unused_functions",
    "dead_code.todo_comments",
    "dead_code.commented_code_blocks",
];

/// Whether `citation` names a fact field, ignoring array indices and any
/// trailing sub-field of a list element (`security.findings[0].file`).
pub fn is_fact_field(citation: &str) -> bool {
    let mut normalized = String::with_capacity(citation.len());
    let mut depth = 0usize;
    for c in citation.trim().chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => normalized.push(c),
            _ => {}
        }
    }

    let mut candidate = normalized.as_str();
    loop {
        if FACT_FIELD_PATHS.contains(&candidate) {
            return true;
        }
        match candidate.rsplit_once('.') {
            Some((parent, _)) => candidate = parent,
            None => return false,
        }
    }
}

/// Validate a raw fact record.
pub fn validate(raw: &Value) -> Result<FactRecord, ValidationError> {
    let root = Node::root(raw);
    root.object()?;

    let label_node = root.field("repo_label")?;
    let candidate_label = label_node.str()?.to_string();
    if candidate_label.trim().is_empty() {
        return Err(label_node.error("must not be empty"));
    }

    Ok(FactRecord {
        candidate_label,
        change_summary: change_summary(&root.field("git_info")?)?,
        functionality: functionality(&root.field("functionality")?)?,
        security: security(&root.field("security")?)?,
        tests: tests(&root.field("tests")?)?,
        overengineering: overengineering(&root.field("overengineering")?)?,
        dead_code: dead_code(&root.field("dead_code")?)?,
    })
}

fn change_summary(node: &Node<'_>) -> Result<ChangeSummary, ValidationError> {
    Ok(ChangeSummary {
        branch: node.field("branch")?.str()?.to_string(),
        base: node.field("base")?.str()?.to_string(),
        files_changed: node.field("files_changed")?.count()?,
        additions: node.field("additions")?.count()?,
        deletions: node.field("deletions")?.count()?,
    })
}

fn functionality(node: &Node<'_>) -> Result<FunctionalityFacts, ValidationError> {
    let implemented_node = node.field("implemented")?;
    let mut implemented = BTreeSet::new();
    for item in implemented_node.array()? {
        let requirement = item.str()?;
        if !implemented.insert(requirement.to_string()) {
            return Err(item.error(format!("duplicate requirement '{}'", requirement)));
        }
    }

    Ok(FunctionalityFacts {
        spec_requirements: node.field("spec_requirements")?.strings()?,
        implemented,
        missing: node.field("missing")?.strings()?,
        test_results: test_results(&node.field("test_results")?)?,
    })
}

fn test_results(node: &Node<'_>) -> Result<TestResults, ValidationError> {
    let results = TestResults {
        ran: node.field("ran")?.bool()?,
        passed: node.field("passed")?.count()?,
        failed: node.field("failed")?.count()?,
        skipped: node.field("skipped")?.count()?,
    };

    if !results.ran && results.total() != 0 {
        return Err(node.error(format!(
            "tests reported as not run but counts sum to {}",
            results.total()
        )));
    }

    Ok(results)
}

fn security(node: &Node<'_>) -> Result<SecurityFacts, ValidationError> {
    let findings = node
        .field("findings")?
        .array()?
        .iter()
        .map(finding)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SecurityFacts {
        findings,
        patterns_observed: node.field("patterns_observed")?.strings()?,
    })
}

fn finding(node: &Node<'_>) -> Result<Finding, ValidationError> {
    let severity_node = node.field("severity")?;
    let raw_severity = severity_node.str()?;
    let severity = Severity::parse(raw_severity).ok_or_else(|| {
        severity_node.error(format!(
            "unknown severity '{}' (expected low, medium, high or critical)",
            raw_severity
        ))
    })?;

    Ok(Finding {
        file: node.field("file")?.str()?.to_string(),
        line: node.field("line")?.count()?,
        severity,
        description: node.field("description")?.str()?.to_string(),
    })
}

fn tests(node: &Node<'_>) -> Result<TestFacts, ValidationError> {
    Ok(TestFacts {
        test_count: node.field("test_count")?.count()?,
        coverage_estimate: node.field("coverage_estimate")?.str()?.to_string(),
        dry_violations: node.field("dry_violations")?.strings()?,
    })
}

fn overengineering(node: &Node<'_>) -> Result<OverengineeringFacts, ValidationError> {
    Ok(OverengineeringFacts {
        abstractions: node.field("abstractions")?.strings()?,
        defensive_code: node.field("defensive_code")?.strings()?,
        config_complexity: node.field("config_complexity")?.str()?.to_string(),
    })
}

fn dead_code(node: &Node<'_>) -> Result<DeadCodeFacts, ValidationError> {
    Ok(DeadCodeFacts {
        unused_imports: node.field("unused_imports")?.strings()?,
        unused_functions: node.field("unused_functions")?.strings()?,
        todo_comments: node.field("todo_comments")?.count()?,
        commented_code_blocks: node.field("commented_code_blocks")?.count()?,
    })
}
