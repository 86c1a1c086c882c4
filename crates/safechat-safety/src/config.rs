//! Configuration for the safety checker set

use crate::azure::AzureContentSafetyChecker;
use crate::flan_t5::{self, FlanT5SafetyChecker};
use crate::llama_guard::{self, LlamaGuardChecker};
use crate::sensitive_topics::SensitiveTopicsChecker;
use crate::set::SafetyCheckerSet;
use safechat_core::Result;
use safechat_runtime::ModelSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which checkers to enable and how to build them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Azure AI Content Safety (hosted; needs credentials in the environment)
    #[serde(default)]
    pub enable_azure_content_safety: bool,

    /// Lexicon-based sensitive-topic detection
    #[serde(default)]
    pub enable_sensitive_topics: bool,

    /// Salesforce safety Flan-T5
    #[serde(default = "default_true")]
    pub enable_salesforce_content_safety: bool,

    /// Llama Guard
    #[serde(default)]
    pub enable_llamaguard_content_safety: bool,

    /// Minimum topic score flagged by the sensitive-topic checker
    #[serde(default = "default_threshold")]
    pub safety_score_threshold: f32,

    /// Flan-T5 checker model (Hub id or local directory)
    #[serde(default = "default_salesforce_model")]
    pub salesforce_model: String,

    /// Llama Guard model (Hub id or local directory)
    #[serde(default = "default_llamaguard_model")]
    pub llamaguard_model: String,

    /// Run local checker models on CPU
    #[serde(default)]
    pub cpu: bool,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f32 {
    0.5
}

fn default_salesforce_model() -> String {
    flan_t5::DEFAULT_MODEL.to_string()
}

fn default_llamaguard_model() -> String {
    llama_guard::DEFAULT_MODEL.to_string()
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enable_azure_content_safety: false,
            enable_sensitive_topics: false,
            enable_salesforce_content_safety: default_true(),
            enable_llamaguard_content_safety: false,
            safety_score_threshold: default_threshold(),
            salesforce_model: default_salesforce_model(),
            llamaguard_model: default_llamaguard_model(),
            cpu: false,
        }
    }
}

impl SafetyConfig {
    /// A config with every checker disabled
    pub fn disabled() -> Self {
        Self {
            enable_salesforce_content_safety: false,
            ..Default::default()
        }
    }

    /// Number of enabled checkers
    pub fn enabled_count(&self) -> usize {
        [
            self.enable_azure_content_safety,
            self.enable_sensitive_topics,
            self.enable_salesforce_content_safety,
            self.enable_llamaguard_content_safety,
        ]
        .iter()
        .filter(|&&enabled| enabled)
        .count()
    }
}

impl SafetyCheckerSet {
    /// Build the enabled checkers in fixed order: Azure, sensitive topics,
    /// Salesforce Flan-T5, Llama Guard
    pub fn from_config(config: &SafetyConfig) -> Result<Self> {
        let mut set = SafetyCheckerSet::new();

        if config.enable_azure_content_safety {
            set.push(Arc::new(AzureContentSafetyChecker::from_env()?));
        }
        if config.enable_sensitive_topics {
            set.push(Arc::new(SensitiveTopicsChecker::new(
                config.safety_score_threshold,
            )?));
        }
        if config.enable_salesforce_content_safety {
            let device = ModelSettings {
                cpu: config.cpu,
                ..Default::default()
            }
            .device()?;
            set.push(Arc::new(FlanT5SafetyChecker::load(
                &config.salesforce_model,
                device,
            )?));
        }
        if config.enable_llamaguard_content_safety {
            set.push(Arc::new(LlamaGuardChecker::load(
                &config.llamaguard_model,
                config.cpu,
            )?));
        }

        tracing::info!(checkers = ?set.names(), "Safety checkers ready");
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SafetyConfig::default();
        assert!(!config.enable_azure_content_safety);
        assert!(!config.enable_sensitive_topics);
        assert!(config.enable_salesforce_content_safety);
        assert!(!config.enable_llamaguard_content_safety);
        assert_eq!(config.safety_score_threshold, 0.5);
        assert_eq!(config.llamaguard_model, "meta-llama/Llama-Guard-3-1B");
        assert_eq!(config.enabled_count(), 1);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: SafetyConfig =
            serde_yaml::from_str("enable_sensitive_topics: true\nsafety_score_threshold: 0.3\n")
                .unwrap();
        assert!(config.enable_sensitive_topics);
        assert!(config.enable_salesforce_content_safety);
        assert_eq!(config.safety_score_threshold, 0.3);
    }

    #[test]
    fn test_disabled_builds_empty_set() {
        let set = SafetyCheckerSet::from_config(&SafetyConfig::disabled()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_sensitive_topics_only() {
        let config = SafetyConfig {
            enable_sensitive_topics: true,
            ..SafetyConfig::disabled()
        };
        let set = SafetyCheckerSet::from_config(&config).unwrap();
        assert_eq!(set.names(), vec!["Sensitive Topics"]);
    }
}
