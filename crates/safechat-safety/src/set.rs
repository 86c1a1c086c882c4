//! Ordered set of enabled safety checkers
//!
//! Every checker in the set runs on every text, even after an earlier
//! checker has flagged it, so the caller always gets a complete set of
//! diagnostics. The aggregate verdict is the AND of all verdicts; an empty
//! set is therefore vacuously safe.

use crate::checker::{SafetyChecker, SafetyResult};
use safechat_core::Result;
use std::sync::Arc;
use std::time::Instant;

/// An ordered collection of safety checkers
#[derive(Clone, Default)]
pub struct SafetyCheckerSet {
    checkers: Vec<Arc<dyn SafetyChecker>>,
}

/// Results of running every checker of a set on one text
#[derive(Debug, Clone)]
pub struct SafetyReport {
    /// Per-checker results, in checker order
    pub results: Vec<SafetyResult>,

    /// Total time spent in the set
    pub total_latency_us: u64,
}

impl SafetyReport {
    /// True iff every checker deemed the text safe
    pub fn is_safe(&self) -> bool {
        self.results.iter().all(|r| r.is_safe)
    }

    /// Results of the checkers that flagged the text, in checker order
    pub fn failures(&self) -> impl Iterator<Item = &SafetyResult> {
        self.results.iter().filter(|r| !r.is_safe)
    }
}

impl SafetyCheckerSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a checker
    pub fn with_checker(mut self, checker: Arc<dyn SafetyChecker>) -> Self {
        self.checkers.push(checker);
        self
    }

    /// Append a checker in place
    pub fn push(&mut self, checker: Arc<dyn SafetyChecker>) {
        self.checkers.push(checker);
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Checker identifiers in order
    pub fn names(&self) -> Vec<&str> {
        self.checkers.iter().map(|c| c.name()).collect()
    }

    /// Run every checker on `text`, in order
    pub async fn check(&self, text: &str) -> Result<SafetyReport> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(self.checkers.len());

        for checker in &self.checkers {
            let checker_start = Instant::now();
            let mut result = checker.evaluate(text).await?;
            if result.latency_us == 0 {
                result.latency_us = checker_start.elapsed().as_micros() as u64;
            }

            let verdict = if result.is_safe { "safe" } else { "unsafe" };
            metrics::counter!(
                "safechat_safety_checks_total",
                "checker" => checker.name().to_string(),
                "verdict" => verdict
            )
            .increment(1);
            tracing::debug!(
                checker = checker.name(),
                verdict,
                latency_us = result.latency_us,
                "Safety check finished"
            );

            results.push(result);
        }

        let total_latency_us = start.elapsed().as_micros() as u64;
        metrics::histogram!("safechat_safety_latency_us").record(total_latency_us as f64);

        Ok(SafetyReport {
            results,
            total_latency_us,
        })
    }
}

impl std::fmt::Debug for SafetyCheckerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyCheckerSet")
            .field("checkers", &self.names())
            .finish()
    }
}
