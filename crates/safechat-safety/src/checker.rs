//! Safety checker trait and common types

use async_trait::async_trait;
use safechat_core::Result;

/// Trait for all safety checkers
#[async_trait]
pub trait SafetyChecker: Send + Sync {
    /// Score the given text
    async fn evaluate(&self, text: &str) -> Result<SafetyResult>;

    /// Identifier printed next to failing reports
    fn name(&self) -> &str;
}

/// Verdict of one checker on one text
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyResult {
    /// Identifier of the checker that produced this result
    pub checker: String,

    /// Whether the text was deemed safe
    pub is_safe: bool,

    /// Diagnostic report; empty when safe
    pub report: String,

    /// Latency in microseconds
    pub latency_us: u64,
}

impl SafetyResult {
    /// A safe verdict with no report
    pub fn safe(checker: impl Into<String>) -> Self {
        Self {
            checker: checker.into(),
            is_safe: true,
            report: String::new(),
            latency_us: 0,
        }
    }

    /// An unsafe verdict with a diagnostic report
    pub fn unsafe_with(checker: impl Into<String>, report: impl Into<String>) -> Self {
        Self {
            checker: checker.into(),
            is_safe: false,
            report: report.into(),
            latency_us: 0,
        }
    }

    /// Set the measured latency
    pub fn with_latency_us(mut self, latency_us: u64) -> Self {
        self.latency_us = latency_us;
        self
    }
}

/// Render a two-row pipe table with every cell centered to width 10.
///
/// ```
/// let table = safechat_safety::checker::pipe_table(&["hate"], &["High"]);
/// assert_eq!(table, "|   hate   |\n|   High   |\n");
/// ```
pub fn pipe_table<H, V>(headers: &[H], values: &[V]) -> String
where
    H: AsRef<str>,
    V: AsRef<str>,
{
    let row = |cells: Vec<&str>| {
        let cells: Vec<String> = cells.iter().map(|c| format!("{:^10}", c)).collect();
        format!("|{}|\n", cells.join("|"))
    };

    let mut table = row(headers.iter().map(AsRef::as_ref).collect());
    table.push_str(&row(values.iter().map(AsRef::as_ref).collect()));
    table
}
