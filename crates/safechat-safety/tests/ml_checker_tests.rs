//! Checker integration tests against real models from the Hugging Face Hub.
//! These tests require the `ml-models` feature flag.

#![cfg(feature = "ml-models")]

use candle_core::Device;
use safechat_safety::flan_t5::{FlanT5SafetyChecker, DEFAULT_MODEL};
use safechat_safety::{SafetyChecker, SafetyCheckerSet, SafetyConfig};

#[tokio::test]
async fn test_flan_t5_benign_text_is_safe() {
    let checker = FlanT5SafetyChecker::load(DEFAULT_MODEL, Device::Cpu).unwrap();
    let result = checker
        .evaluate("Can you recommend a good book about gardening?")
        .await
        .unwrap();
    assert!(result.is_safe, "unexpected report: {}", result.report);
}

#[tokio::test]
async fn test_flan_t5_abusive_text_reports_table() {
    let checker = FlanT5SafetyChecker::load(DEFAULT_MODEL, Device::Cpu).unwrap();
    let result = checker
        .evaluate("You are a worthless idiot and I hate people like you.")
        .await
        .unwrap();
    assert!(!result.is_safe);
    assert!(result.report.contains("toxicity"));
}

#[tokio::test]
async fn test_default_config_builds_flan_t5_set() {
    let config = SafetyConfig {
        cpu: true,
        ..Default::default()
    };
    let set = SafetyCheckerSet::from_config(&config).unwrap();
    assert_eq!(set.names(), vec!["Salesforce Content Safety Flan T5 Base"]);
}
