//! Sensitive-topic detection (lexicon based)
//!
//! Flags text that dwells on topics a general-purpose assistant should
//! handle with care. Each topic has a keyword lexicon; a topic's score grows
//! with the number of whole-word hits and saturates below 1.0.

use crate::checker::{pipe_table, SafetyChecker, SafetyResult};
use aho_corasick::{AhoCorasick, MatchKind};
use safechat_core::{Error, Result};
use std::time::Instant;

/// Class predicted when no topic reaches the threshold
pub const NO_TOPIC: &str = "none";

const TOPICS: &[(&str, &[&str])] = &[
    (
        "politics",
        &[
            "election", "elections", "vote", "voting", "democrat", "republican", "senator",
            "congress", "parliament", "president", "campaign", "ballot", "political",
        ],
    ),
    (
        "religion",
        &[
            "religion", "religious", "god", "church", "mosque", "temple", "bible", "quran",
            "torah", "prayer", "atheist", "blasphemy",
        ],
    ),
    (
        "medical",
        &[
            "diagnosis", "prescription", "dosage", "overdose", "symptoms", "medication",
            "disease", "cancer", "surgery", "treatment", "pills",
        ],
    ),
    (
        "finance",
        &[
            "invest", "investment", "stocks", "crypto", "bitcoin", "loan", "mortgage",
            "portfolio", "trading", "retirement", "tax",
        ],
    ),
    (
        "drugs",
        &[
            "cocaine", "heroin", "meth", "methamphetamine", "fentanyl", "marijuana", "lsd",
            "narcotics", "dealer",
        ],
    ),
    (
        "weapons",
        &[
            "gun", "guns", "rifle", "pistol", "ammunition", "explosive", "explosives", "bomb",
            "grenade", "firearm",
        ],
    ),
    (
        "violence",
        &[
            "kill", "murder", "assault", "attack", "stab", "shoot", "torture", "massacre",
        ],
    ),
    (
        "self_harm",
        &["suicide", "self-harm", "cutting", "overdosing", "hang myself", "end my life"],
    ),
    (
        "sexual",
        &["sex", "sexual", "porn", "pornography", "nude", "explicit"],
    ),
];

/// Lexicon-based sensitive-topic checker
pub struct SensitiveTopicsChecker {
    name: String,
    matcher: AhoCorasick,
    pattern_topics: Vec<usize>,
    threshold: f32,
}

/// Per-topic scores for one text
#[derive(Debug, Clone, PartialEq)]
pub struct TopicScores {
    /// Predicted class, or [`NO_TOPIC`]
    pub pred_class: String,

    /// (class, score) pairs, `none` first
    pub class_scores: Vec<(String, f32)>,
}

impl SensitiveTopicsChecker {
    /// Create a checker flagging topics scoring at least `threshold`
    pub fn new(threshold: f32) -> Result<Self> {
        let mut patterns = Vec::new();
        let mut pattern_topics = Vec::new();
        for (idx, (_, words)) in TOPICS.iter().enumerate() {
            for word in words.iter() {
                patterns.push(*word);
                pattern_topics.push(idx);
            }
        }

        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)
            .map_err(|e| Error::checker(format!("Failed to build topic matcher: {}", e)))?;

        Ok(Self {
            name: "Sensitive Topics".to_string(),
            matcher,
            pattern_topics,
            threshold,
        })
    }

    /// Score every topic for `text`
    pub fn score(&self, text: &str) -> TopicScores {
        let bytes = text.as_bytes();
        let mut hits = vec![0usize; TOPICS.len()];

        for mat in self.matcher.find_iter(text) {
            let before = mat.start().checked_sub(1).map(|i| bytes[i]);
            let after = bytes.get(mat.end()).copied();
            if is_word_byte(before) || is_word_byte(after) {
                continue;
            }
            hits[self.pattern_topics[mat.pattern().as_usize()]] += 1;
        }

        let scores: Vec<f32> = hits
            .iter()
            .map(|&h| (h as f32 * 0.35).clamp(0.0, 0.95))
            .collect();

        let mut pred_class = NO_TOPIC.to_string();
        let mut top = 0.0f32;
        for (idx, &score) in scores.iter().enumerate() {
            if score > top {
                top = score;
                if score >= self.threshold {
                    pred_class = TOPICS[idx].0.to_string();
                }
            }
        }
        if top < self.threshold {
            pred_class = NO_TOPIC.to_string();
        }

        let mut class_scores = vec![(NO_TOPIC.to_string(), 1.0 - top)];
        class_scores.extend(
            TOPICS
                .iter()
                .zip(scores)
                .map(|((topic, _), score)| (topic.to_string(), score)),
        );

        TopicScores {
            pred_class,
            class_scores,
        }
    }
}

fn is_word_byte(byte: Option<u8>) -> bool {
    byte.is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[async_trait::async_trait]
impl SafetyChecker for SensitiveTopicsChecker {
    async fn evaluate(&self, text: &str) -> Result<SafetyResult> {
        let start = Instant::now();
        let scores = self.score(text);

        let result = if scores.pred_class == NO_TOPIC {
            SafetyResult::safe(&self.name)
        } else {
            let headers: Vec<&str> = scores.class_scores.iter().map(|(c, _)| c.as_str()).collect();
            let values: Vec<String> = scores
                .class_scores
                .iter()
                .map(|(_, s)| format!("{:.5}", s))
                .collect();

            let mut report = format!("Predicted class: {}\n", scores.pred_class);
            report.push_str(&pipe_table(&headers, &values));
            SafetyResult::unsafe_with(&self.name, report)
        };

        Ok(result.with_latency_us(start.elapsed().as_micros() as u64))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clean_text_is_safe() {
        let checker = SensitiveTopicsChecker::new(0.5).unwrap();
        let result = checker.evaluate("What a lovely day for a walk in the park.").await.unwrap();
        assert!(result.is_safe);
        assert!(result.report.is_empty());
    }

    #[tokio::test]
    async fn test_topic_heavy_text_is_flagged() {
        let checker = SensitiveTopicsChecker::new(0.5).unwrap();
        let result = checker
            .evaluate("Who should I vote for in the election? Which senator is best?")
            .await
            .unwrap();
        assert!(!result.is_safe);
        assert!(result.report.starts_with("Predicted class: politics\n"));
        assert!(result.report.contains("politics"));
    }

    #[test]
    fn test_single_mention_below_threshold() {
        let checker = SensitiveTopicsChecker::new(0.5).unwrap();
        let scores = checker.score("I read about the election yesterday.");
        assert_eq!(scores.pred_class, NO_TOPIC);
        let politics = scores.class_scores.iter().find(|(c, _)| c == "politics").unwrap();
        assert!((politics.1 - 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let checker = SensitiveTopicsChecker::new(0.3).unwrap();
        assert_eq!(checker.score("Tell me about bitcoin.").pred_class, "finance");
    }

    #[test]
    fn test_whole_words_only() {
        let checker = SensitiveTopicsChecker::new(0.3).unwrap();
        // "gun" inside "begun", "tax" inside "syntax"
        assert_eq!(checker.score("We have begun studying syntax.").pred_class, NO_TOPIC);
    }

    #[test]
    fn test_case_insensitive() {
        let checker = SensitiveTopicsChecker::new(0.5).unwrap();
        assert_eq!(checker.score("COCAINE and HEROIN").pred_class, "drugs");
    }
}
