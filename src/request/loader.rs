//! Spec loader.
//!
//! Turns raw arguments into an immutable [`ComparisonRequest`]. Every failure
//! here is terminal and happens before any worker is dispatched.

use crate::error::{JudgeError, RequestError};
use crate::models::{CandidateRef, CandidateSource, ComparisonRequest, Weights};
use crate::repo::CandidateResolver;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Raw inputs of a comparison, as gathered from the CLI and config file.
#[derive(Debug, Clone, Default)]
pub struct LoadArgs {
    pub spec_path: PathBuf,
    pub repo_paths: Vec<PathBuf>,
    pub labels: Option<Vec<String>>,
    /// `--weights` value; takes precedence over `config_weights`.
    pub weights: Option<String>,
    /// `[weights]` table from the config file.
    pub config_weights: Option<BTreeMap<String, i64>>,
    pub branch: Option<String>,
    pub base: String,
}

/// Load and validate a comparison request.
pub fn load(
    args: &LoadArgs,
    resolver: &dyn CandidateResolver,
) -> Result<ComparisonRequest, JudgeError> {
    let spec_text = read_spec(&args.spec_path)?;

    if args.repo_paths.len() < 2 {
        return Err(RequestError::TooFewCandidates(args.repo_paths.len()).into());
    }

    let labels = candidate_labels(args)?;
    let weights = resolve_weights(args)?;

    let candidates: Vec<CandidateRef> = labels
        .into_iter()
        .zip(&args.repo_paths)
        .map(|(label, path)| CandidateRef {
            label,
            source: CandidateSource {
                path: path.clone(),
                branch: args.branch.clone(),
            },
        })
        .collect();

    for candidate in &candidates {
        resolver
            .resolve(&candidate.source)
            .map_err(|e| RequestError::InvalidCandidate {
                label: candidate.label.clone(),
                reason: format!("{:#}", e),
            })?;
        debug!(
            "Candidate {} -> {}",
            candidate.label,
            candidate.source.path.display()
        );
    }

    info!(
        "Loaded request: {} candidates, dimensions [{}]",
        candidates.len(),
        weights
            .dimensions()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(ComparisonRequest {
        spec_path: args.spec_path.clone(),
        spec_text,
        candidates,
        weights,
        base: args.base.clone(),
    })
}

fn read_spec(path: &Path) -> Result<String, RequestError> {
    let text = std::fs::read_to_string(path).map_err(|e| RequestError::SpecUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if text.trim().is_empty() {
        return Err(RequestError::EmptySpec);
    }

    Ok(text)
}

fn candidate_labels(args: &LoadArgs) -> Result<Vec<String>, RequestError> {
    let labels: Vec<String> = match args.labels {
        Some(ref labels) => {
            if labels.len() != args.repo_paths.len() {
                return Err(RequestError::LabelCountMismatch {
                    labels: labels.len(),
                    repos: args.repo_paths.len(),
                });
            }
            labels.iter().map(|l| l.trim().to_string()).collect()
        }
        None => args
            .repo_paths
            .iter()
            .enumerate()
            .map(|(i, path)| default_label(path, i))
            .collect(),
    };

    let mut seen = HashSet::new();
    for label in &labels {
        if label.is_empty() {
            return Err(RequestError::InvalidCandidate {
                label: label.clone(),
                reason: "label must not be empty".to_string(),
            });
        }
        if !seen.insert(label.as_str()) {
            return Err(RequestError::DuplicateLabel(label.clone()));
        }
    }

    Ok(labels)
}

/// Directory name of the repository, falling back to its position.
fn default_label(path: &Path, index: usize) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("candidate-{}", index + 1))
}

fn resolve_weights(args: &LoadArgs) -> Result<Weights, RequestError> {
    if let Some(ref spec) = args.weights {
        return Weights::parse(spec);
    }
    if let Some(ref table) = args.config_weights {
        return Weights::from_pairs(table.iter().map(|(k, v)| (k.as_str(), *v)));
    }
    Ok(Weights::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Dimension;
    use tempfile::TempDir;

    struct AcceptAll;

    impl CandidateResolver for AcceptAll {
        fn resolve(&self, _source: &CandidateSource) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Rejects any candidate whose path ends with `bad`.
    struct RejectBad;

    impl CandidateResolver for RejectBad {
        fn resolve(&self, source: &CandidateSource) -> anyhow::Result<()> {
            if source.path.ends_with("bad") {
                anyhow::bail!("not a git repository");
            }
            Ok(())
        }
    }

    fn spec_file(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("SPEC.md");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn args(dir: &TempDir, repos: &[&str]) -> LoadArgs {
        LoadArgs {
            spec_path: spec_file(dir, "# Rate limiter\nMust return 429."),
            repo_paths: repos.iter().map(PathBuf::from).collect(),
            base: "main".to_string(),
            ..Default::default()
        }
    }

    fn request_error(result: Result<ComparisonRequest, JudgeError>) -> RequestError {
        match result {
            Err(JudgeError::InvalidRequest(e)) => e,
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_load_with_defaults() {
        let dir = TempDir::new().unwrap();
        let request = load(&args(&dir, &["impl/alpha", "impl/beta"]), &AcceptAll).unwrap();

        assert_eq!(request.labels(), vec!["alpha", "beta"]);
        assert_eq!(request.weights, Weights::default());
        assert_eq!(request.dimensions(), Dimension::ALL.to_vec());
        assert!(request.spec_text.contains("429"));
    }

    #[test]
    fn test_empty_spec_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut a = args(&dir, &["a", "b"]);
        a.spec_path = spec_file(&dir, "  \n\t\n");

        assert_eq!(request_error(load(&a, &AcceptAll)), RequestError::EmptySpec);
    }

    #[test]
    fn test_unreadable_spec() {
        let dir = TempDir::new().unwrap();
        let mut a = args(&dir, &["a", "b"]);
        a.spec_path = dir.path().join("missing.md");

        assert!(matches!(
            request_error(load(&a, &AcceptAll)),
            RequestError::SpecUnreadable { .. }
        ));
    }

    #[test]
    fn test_too_few_candidates() {
        let dir = TempDir::new().unwrap();
        let a = args(&dir, &["only"]);

        assert_eq!(
            request_error(load(&a, &AcceptAll)),
            RequestError::TooFewCandidates(1)
        );
    }

    #[test]
    fn test_duplicate_default_labels() {
        let dir = TempDir::new().unwrap();
        let a = args(&dir, &["x/repo", "y/repo"]);

        assert_eq!(
            request_error(load(&a, &AcceptAll)),
            RequestError::DuplicateLabel("repo".to_string())
        );
    }

    #[test]
    fn test_explicit_labels() {
        let dir = TempDir::new().unwrap();
        let mut a = args(&dir, &["x/repo", "y/repo"]);
        a.labels = Some(vec!["first".to_string(), " second ".to_string()]);

        let request = load(&a, &AcceptAll).unwrap();
        assert_eq!(request.labels(), vec!["first", "second"]);

        a.labels = Some(vec!["only-one".to_string()]);
        assert_eq!(
            request_error(load(&a, &AcceptAll)),
            RequestError::LabelCountMismatch { labels: 1, repos: 2 }
        );
    }

    #[test]
    fn test_unresolvable_candidate() {
        let dir = TempDir::new().unwrap();
        let a = args(&dir, &["good", "bad"]);

        match request_error(load(&a, &RejectBad)) {
            RequestError::InvalidCandidate { label, reason } => {
                assert_eq!(label, "bad");
                assert!(reason.contains("not a git repository"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_weights_precedence() {
        let dir = TempDir::new().unwrap();
        let mut a = args(&dir, &["a", "b"]);
        a.config_weights = Some(
            [("functionality".to_string(), 70), ("tests".to_string(), 30)]
                .into_iter()
                .collect(),
        );

        let request = load(&a, &AcceptAll).unwrap();
        assert_eq!(request.weights.get(Dimension::Functionality), 70);
        assert_eq!(request.dimensions().len(), 2);

        a.weights = Some("security:100".to_string());
        let request = load(&a, &AcceptAll).unwrap();
        assert_eq!(request.dimensions(), vec![Dimension::Security]);
    }

    #[test]
    fn test_invalid_weights() {
        let dir = TempDir::new().unwrap();
        let mut a = args(&dir, &["a", "b"]);
        a.weights = Some("functionality:50,security:49".to_string());

        assert!(matches!(
            request_error(load(&a, &AcceptAll)),
            RequestError::InvalidWeights(_)
        ));
    }
}
