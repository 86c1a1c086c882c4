//! Mock checkers for testing
//!
//! Configurable implementations of the SafetyChecker trait for exercising
//! checker-set ordering, aggregation and error propagation.

use async_trait::async_trait;
use proptest::prelude::*;
use safechat_core::{Error, Result};
use safechat_safety::{SafetyChecker, SafetyCheckerSet, SafetyResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A checker returning a fixed verdict, or flagging texts containing a keyword
pub struct MockChecker {
    name: String,
    is_safe: bool,
    flag_keyword: Option<String>,
    simulated_latency: Option<Duration>,
    call_count: AtomicU32,
}

impl MockChecker {
    /// A checker that deems everything safe
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_safe: true,
            flag_keyword: None,
            simulated_latency: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Deem everything unsafe
    pub fn unsafe_always(mut self) -> Self {
        self.is_safe = false;
        self
    }

    /// Deem texts containing `keyword` unsafe
    pub fn flagging(mut self, keyword: &str) -> Self {
        self.flag_keyword = Some(keyword.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SafetyChecker for MockChecker {
    async fn evaluate(&self, text: &str) -> Result<SafetyResult> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.simulated_latency {
            tokio::time::sleep(latency).await;
        }

        let flagged = match &self.flag_keyword {
            Some(keyword) => text.contains(keyword.as_str()),
            None => !self.is_safe,
        };

        if flagged {
            Ok(SafetyResult::unsafe_with(&self.name, format!("{} flagged", self.name)))
        } else {
            Ok(SafetyResult::safe(&self.name))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A checker that always errors
pub struct FailingChecker {
    name: String,
    message: String,
}

impl FailingChecker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            message: "checker unavailable".to_string(),
        }
    }
}

#[async_trait]
impl SafetyChecker for FailingChecker {
    async fn evaluate(&self, _text: &str) -> Result<SafetyResult> {
        Err(Error::checker(self.message.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[tokio::test]
async fn test_every_checker_called_once_per_text() {
    let a = Arc::new(MockChecker::new("a").unsafe_always());
    let b = Arc::new(MockChecker::new("b"));
    let set = SafetyCheckerSet::new()
        .with_checker(a.clone())
        .with_checker(b.clone());

    let report = set.check("hello").await.unwrap();
    assert!(!report.is_safe());
    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 1);
}

#[tokio::test]
async fn test_failures_keep_checker_order() {
    let set = SafetyCheckerSet::new()
        .with_checker(Arc::new(MockChecker::new("first").flagging("x")))
        .with_checker(Arc::new(MockChecker::new("middle")))
        .with_checker(Arc::new(MockChecker::new("last").unsafe_always()));

    let report = set.check("x marks the spot").await.unwrap();
    let failing: Vec<(&str, &str)> = report
        .failures()
        .map(|r| (r.checker.as_str(), r.report.as_str()))
        .collect();
    assert_eq!(
        failing,
        vec![("first", "first flagged"), ("last", "last flagged")]
    );
}

#[tokio::test]
async fn test_checker_error_propagates() {
    let set = SafetyCheckerSet::new()
        .with_checker(Arc::new(MockChecker::new("ok")))
        .with_checker(Arc::new(FailingChecker::new("broken")));

    let err = set.check("hello").await.unwrap_err();
    assert!(err.to_string().contains("checker unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_latency_recorded() {
    let set = SafetyCheckerSet::new()
        .with_checker(Arc::new(MockChecker::new("slow").with_latency(Duration::from_millis(5))));

    let report = set.check("hello").await.unwrap();
    assert!(report.is_safe());
    assert_eq!(report.results.len(), 1);
}

fn set_from_verdicts(verdicts: &[bool]) -> SafetyCheckerSet {
    verdicts
        .iter()
        .enumerate()
        .fold(SafetyCheckerSet::new(), |set, (i, &safe)| {
            let checker = MockChecker::new(&format!("c{}", i));
            let checker = if safe { checker } else { checker.unsafe_always() };
            set.with_checker(Arc::new(checker))
        })
}

proptest! {
    #[test]
    fn aggregate_is_and_of_verdicts(verdicts in proptest::collection::vec(any::<bool>(), 0..8)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let report = rt.block_on(set_from_verdicts(&verdicts).check("text")).unwrap();

        prop_assert_eq!(report.results.len(), verdicts.len());
        prop_assert_eq!(report.is_safe(), verdicts.iter().all(|&v| v));
        prop_assert_eq!(report.failures().count(), verdicts.iter().filter(|&&v| !v).count());
    }
}
