//! Git access for candidate repositories.
//!
//! Resolves a candidate's source handle to an existing repository (and
//! branch) and measures its change against a base branch using git2.

use crate::models::{CandidateSource, ChangeSummary};
use anyhow::{bail, Context, Result};
use git2::{DiffOptions, Repository};
use tracing::{debug, info};

/// Existence check for a candidate's source handle.
pub trait CandidateResolver {
    /// Fail when the handle does not point at something a worker can analyze.
    fn resolve(&self, source: &CandidateSource) -> Result<()>;
}

/// Resolves candidates against local git repositories.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitResolver;

impl CandidateResolver for GitResolver {
    fn resolve(&self, source: &CandidateSource) -> Result<()> {
        let path = &source.path;

        if !path.exists() {
            bail!("path does not exist: {}", path.display());
        }
        if !path.is_dir() {
            bail!("path is not a directory: {}", path.display());
        }

        let repo = Repository::open(path)
            .with_context(|| format!("not a git repository: {}", path.display()))?;

        if let Some(ref branch) = source.branch {
            repo.revparse_single(branch)
                .with_context(|| format!("branch '{}' not found", branch))?;
        }

        debug!("Resolved candidate at {}", path.display());
        Ok(())
    }
}

/// Diff statistics of a candidate's branch against `base`.
///
/// Compares from the merge base, like `git diff base...branch`. When the
/// source names no branch, the checked-out HEAD is used.
pub fn change_summary(source: &CandidateSource, base: &str) -> Result<ChangeSummary> {
    let repo = Repository::open(&source.path)
        .with_context(|| format!("Failed to open repository: {}", source.path.display()))?;

    let (head_commit, branch) = match source.branch {
        Some(ref branch) => {
            let commit = repo
                .revparse_single(branch)
                .and_then(|obj| obj.peel_to_commit())
                .with_context(|| format!("Failed to resolve branch '{}'", branch))?;
            (commit, branch.clone())
        }
        None => {
            let head = repo.head().context("Repository has no HEAD")?;
            let name = head.shorthand().unwrap_or("HEAD").to_string();
            (head.peel_to_commit().context("HEAD is not a commit")?, name)
        }
    };

    let base_commit = repo
        .revparse_single(base)
        .and_then(|obj| obj.peel_to_commit())
        .with_context(|| format!("Failed to resolve base '{}'", base))?;

    let merge_base = repo
        .merge_base(base_commit.id(), head_commit.id())
        .context("Branch and base share no history")?;
    let base_tree = repo.find_commit(merge_base)?.tree()?;
    let head_tree = head_commit.tree()?;

    let mut opts = DiffOptions::new();
    let diff = repo
        .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), Some(&mut opts))
        .context("Failed to diff candidate against base")?;
    let stats = diff.stats().context("Failed to compute diff stats")?;

    let summary = ChangeSummary {
        branch,
        base: base.to_string(),
        files_changed: stats.files_changed() as u64,
        additions: stats.insertions() as u64,
        deletions: stats.deletions() as u64,
    };

    info!(
        "{}: {} files changed (+{} -{}) against {}",
        source.path.display(),
        summary.files_changed,
        summary.additions,
        summary.deletions,
        base
    );

    Ok(summary)
}
