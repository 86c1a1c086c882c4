//! SafeChat Runtime
//!
//! Rust-native causal language model runtime built on Candle.
//!
//! This crate provides:
//! - Model file resolution from local directories or the Hugging Face Hub
//! - Full-precision (safetensors) and quantized (GGUF) Llama loading
//! - LoRA adapter merging
//! - Chat templates and seeded autoregressive sampling

pub mod chat_template;
pub mod lora;
pub mod runtime;
pub mod sampling;
pub mod settings;
pub mod source;

pub use chat_template::ChatFormat;
pub use lora::{AdapterConfig, LoraAdapter};
pub use runtime::{CausalLmRuntime, ChatModel, GenerationRequest};
pub use sampling::{GenerationContext, SamplingParams};
pub use settings::{ModelSettings, Quantization};
pub use source::ModelRepo;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::runtime::{CausalLmRuntime, ChatModel, GenerationRequest};
    pub use crate::sampling::{GenerationContext, SamplingParams};
    pub use crate::settings::{ModelSettings, Quantization};
}
