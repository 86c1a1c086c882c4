//! Command-line arguments
//!
//! Every tuning flag is optional so that values from `--config` survive
//! unless a flag is given explicitly. Boolean flags accept an optional
//! value: `--do-sample` means true, `--do-sample false` turns it off.

use clap::builder::BoolishValueParser;
use clap::Parser;
use safechat_runtime::Quantization;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "chat-completion")]
#[command(
    about = "Run chat completions with safety checks on the user prompt and the model output",
    long_about = None
)]
pub struct Cli {
    /// Model to run (Hugging Face repo id or local directory)
    pub model_name: Option<String>,

    /// LoRA adapter merged into the model weights
    #[arg(long, alias = "peft_model")]
    pub peft_model: Option<String>,

    /// Load a quantized GGUF checkpoint (4bit or 8bit)
    #[arg(long)]
    pub quantization: Option<Quantization>,

    /// Maximum number of tokens to generate
    #[arg(long, alias = "max_new_tokens")]
    pub max_new_tokens: Option<usize>,

    /// Minimum number of tokens to generate
    #[arg(long, alias = "min_new_tokens")]
    pub min_new_tokens: Option<usize>,

    /// JSON file with the dialogs; read from stdin when omitted
    #[arg(long, alias = "prompt_file")]
    pub prompt_file: Option<PathBuf>,

    /// Seed for reproducible sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Minimum topic score flagged by the sensitive-topic checker
    #[arg(long, alias = "safety_score_threshold")]
    pub safety_score_threshold: Option<f32>,

    /// Sample from the distribution; greedy decoding otherwise
    #[arg(long, alias = "do_sample", num_args = 0..=1, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    pub do_sample: Option<bool>,

    /// Reuse past key/values between decoding steps
    #[arg(long, alias = "use_cache", num_args = 0..=1, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    pub use_cache: Option<bool>,

    /// Nucleus sampling cutoff
    #[arg(long, alias = "top_p")]
    pub top_p: Option<f64>,

    /// Softmax temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Keep only the k most probable tokens
    #[arg(long, alias = "top_k")]
    pub top_k: Option<usize>,

    /// Repetition penalty; 1.0 means no penalty
    #[arg(long, alias = "repetition_penalty")]
    pub repetition_penalty: Option<f32>,

    /// Length penalty (beam search only; accepted and ignored)
    #[arg(long, alias = "length_penalty", allow_negative_numbers = true)]
    pub length_penalty: Option<i32>,

    /// Check with the Azure AI Content Safety API
    #[arg(long, alias = "enable_azure_content_safety", num_args = 0..=1, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    pub enable_azure_content_safety: Option<bool>,

    /// Check for sensitive topics
    #[arg(long, alias = "enable_sensitive_topics", num_args = 0..=1, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    pub enable_sensitive_topics: Option<bool>,

    /// Check with the Salesforce safety Flan-T5 model
    #[arg(
        long,
        aliases = ["enable_salesforce_content_safety", "enable-saleforce-content-safety", "enable_saleforce_content_safety"],
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub enable_salesforce_content_safety: Option<bool>,

    /// Check with Llama Guard
    #[arg(long, alias = "enable_llamaguard_content_safety", num_args = 0..=1, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    pub enable_llamaguard_content_safety: Option<bool>,

    /// Use flash attention (requires the flash-attn feature)
    #[arg(long, alias = "use_fast_kernels", num_args = 0..=1, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    pub use_fast_kernels: Option<bool>,

    /// Llama Guard model (Hub id or local directory)
    #[arg(long, alias = "llamaguard_model")]
    pub llamaguard_model: Option<String>,

    /// Run every model on CPU
    #[arg(long)]
    pub cpu: bool,

    /// Hub revision of the model
    #[arg(long)]
    pub revision: Option<String>,

    /// YAML configuration file; explicit flags take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_model_and_defaults() {
        let cli = Cli::parse_from(["chat-completion", "meta-llama/Llama-3.2-1B-Instruct"]);
        assert_eq!(cli.model_name.as_deref(), Some("meta-llama/Llama-3.2-1B-Instruct"));
        assert!(cli.do_sample.is_none());
        assert!(cli.prompt_file.is_none());
        assert!(!cli.cpu);
    }

    #[test]
    fn test_bool_flags_take_optional_value() {
        let cli = Cli::parse_from([
            "chat-completion",
            "m",
            "--do-sample",
            "false",
            "--enable-sensitive-topics",
            "--use-cache=False",
        ]);
        assert_eq!(cli.do_sample, Some(false));
        assert_eq!(cli.enable_sensitive_topics, Some(true));
        assert_eq!(cli.use_cache, Some(false));
    }

    #[test]
    fn test_underscore_aliases() {
        let cli = Cli::parse_from([
            "chat-completion",
            "m",
            "--prompt_file",
            "dialogs.json",
            "--max_new_tokens",
            "64",
            "--enable_saleforce_content_safety",
            "false",
        ]);
        assert_eq!(cli.prompt_file, Some(PathBuf::from("dialogs.json")));
        assert_eq!(cli.max_new_tokens, Some(64));
        assert_eq!(cli.enable_salesforce_content_safety, Some(false));
    }

    #[test]
    fn test_quantization_parsing() {
        let cli = Cli::parse_from(["chat-completion", "m", "--quantization", "8bit"]);
        assert_eq!(cli.quantization, Some(Quantization::EightBit));
        assert!(Cli::try_parse_from(["chat-completion", "m", "--quantization", "3bit"]).is_err());
    }
}
