//! SafeChat Safety
//!
//! Content-safety checkers used to screen user prompts before generation
//! and model output after it.
//!
//! Available checkers:
//! - Azure AI Content Safety (hosted API)
//! - Sensitive topics (lexicon based, no model download)
//! - Salesforce safety Flan-T5 (local Candle model)
//! - Llama Guard 3 (local Candle model through the runtime)
//!
//! Checkers are combined into a [`SafetyCheckerSet`]; a text is safe only
//! when every checker in the set agrees.

pub mod azure;
pub mod checker;
pub mod config;
pub mod flan_t5;
pub mod llama_guard;
pub mod sensitive_topics;
pub mod set;

pub use azure::AzureContentSafetyChecker;
pub use checker::{pipe_table, SafetyChecker, SafetyResult};
pub use config::SafetyConfig;
pub use flan_t5::FlanT5SafetyChecker;
pub use llama_guard::LlamaGuardChecker;
pub use sensitive_topics::SensitiveTopicsChecker;
pub use set::{SafetyCheckerSet, SafetyReport};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::checker::{SafetyChecker, SafetyResult};
    pub use crate::config::SafetyConfig;
    pub use crate::set::{SafetyCheckerSet, SafetyReport};
}
