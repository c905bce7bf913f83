//! Scripted worker for tests.

use super::Worker;
use crate::models::{
    CandidateRef, CandidateSource, ComparisonRequest, Dimension, FactRecord, Weights,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a scripted call does.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return the value after the delay.
    Reply(Value, Duration),
    /// Return an error.
    Fail(String),
    /// Never return.
    Hang,
    /// Panic inside the worker.
    Panic,
}

impl Behavior {
    pub fn reply(value: Value) -> Self {
        Behavior::Reply(value, Duration::ZERO)
    }

    pub fn delayed(value: Value, millis: u64) -> Self {
        Behavior::Reply(value, Duration::from_millis(millis))
    }
}

/// Worker with per-candidate and per-dimension scripts. Unscripted calls fail.
#[derive(Default)]
pub struct StubWorker {
    analyses: HashMap<String, Vec<Behavior>>,
    scorings: HashMap<Dimension, Vec<Behavior>>,
    analyze_calls: Mutex<Vec<String>>,
    score_calls: Mutex<Vec<(Dimension, Vec<String>)>>,
    attempts: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
}

/// Counts a running call until its future is dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StubWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the analysis of `label`. Repeated calls script successive attempts.
    pub fn on_analyze(mut self, label: &str, behavior: Behavior) -> Self {
        self.analyses
            .entry(label.to_string())
            .or_default()
            .push(behavior);
        self
    }

    pub fn on_score(mut self, dimension: Dimension, behavior: Behavior) -> Self {
        self.scorings.entry(dimension).or_default().push(behavior);
        self
    }

    /// Labels analyzed so far, in call order.
    pub fn analyzed(&self) -> Vec<String> {
        self.analyze_calls.lock().unwrap().clone()
    }

    /// `(dimension, labels in the facts handed over)` per scoring call.
    pub fn scored(&self) -> Vec<(Dimension, Vec<String>)> {
        self.score_calls.lock().unwrap().clone()
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Calls whose futures are currently alive.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn pick(script: Option<&Vec<Behavior>>, attempt: usize) -> Behavior {
        match script {
            Some(steps) if !steps.is_empty() => steps[attempt.min(steps.len() - 1)].clone(),
            _ => Behavior::Fail("no scripted behavior".to_string()),
        }
    }

    fn perform(&self, behavior: Behavior) -> BoxFuture<'static, anyhow::Result<Value>> {
        let counter = Arc::clone(&self.in_flight);
        async move {
            let _guard = InFlight::enter(counter);
            match behavior {
                Behavior::Reply(value, delay) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(value)
                }
                Behavior::Fail(message) => Err(anyhow::anyhow!(message)),
                Behavior::Hang => futures::future::pending().await,
                Behavior::Panic => panic!("scripted worker panic"),
            }
        }
        .boxed()
    }
}

impl Worker for StubWorker {
    fn analyze_candidate<'a>(
        &'a self,
        _spec_text: &'a str,
        candidate: &'a CandidateRef,
    ) -> BoxFuture<'a, anyhow::Result<Value>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut calls = self.analyze_calls.lock().unwrap();
            let previous = calls.iter().filter(|l| **l == candidate.label).count();
            calls.push(candidate.label.clone());
            previous
        };
        self.perform(Self::pick(self.analyses.get(&candidate.label), attempt))
    }

    fn score_dimension<'a>(
        &'a self,
        _spec_text: &'a str,
        dimension: Dimension,
        facts: &'a [FactRecord],
    ) -> BoxFuture<'a, anyhow::Result<Value>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut calls = self.score_calls.lock().unwrap();
            let previous = calls.iter().filter(|(d, _)| *d == dimension).count();
            calls.push((
                dimension,
                facts.iter().map(|f| f.candidate_label.clone()).collect(),
            ));
            previous
        };
        self.perform(Self::pick(self.scorings.get(&dimension), attempt))
    }
}

/// A valid raw fact record for `label`.
pub fn facts_for(label: &str) -> Value {
    let mut raw: Value =
        serde_json::from_str(include_str!("../../fixtures/facts_alpha.json")).unwrap();
    raw["repo_label"] = json!(label);
    raw
}

/// A valid raw score sheet giving each `(label, score)`.
pub fn sheet(dimension: Dimension, scores: &[(&str, u8)]) -> Value {
    let entries: serde_json::Map<String, Value> = scores
        .iter()
        .map(|(label, score)| {
            (
                label.to_string(),
                json!({
                    "score": score,
                    "justification": format!("{} scored {}", label, score),
                    "evidence": [dimension_field(dimension)],
                }),
            )
        })
        .collect();

    json!({
        "dimension": dimension.as_str(),
        "scores": entries,
        "ranking": scores.iter().map(|(l, _)| *l).collect::<Vec<_>>(),
    })
}

fn dimension_field(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Functionality => "functionality.implemented",
        Dimension::Security => "security.findings",
        Dimension::Tests => "tests.test_count",
        Dimension::Overengineering => "overengineering.abstractions",
        Dimension::DeadCode => "dead_code.unused_imports",
    }
}

/// A request over `labels` with the given weights.
pub fn request(labels: &[&str], weights: Weights) -> Arc<ComparisonRequest> {
    Arc::new(ComparisonRequest {
        spec_path: PathBuf::from("SPEC.md"),
        spec_text: "# Spec\nImplement a rate limiter.".to_string(),
        candidates: labels
            .iter()
            .map(|label| CandidateRef {
                label: label.to_string(),
                source: CandidateSource {
                    path: PathBuf::from(format!("/repos/{}", label)),
                    branch: None,
                },
            })
            .collect(),
        weights,
        base: "main".to_string(),
    })
}
