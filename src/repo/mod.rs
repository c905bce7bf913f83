//! Candidate repositories on disk.

pub mod git;

pub use git::{change_summary, CandidateResolver, GitResolver};
