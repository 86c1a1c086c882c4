//! Run configuration

use crate::cli::Cli;
use safechat_runtime::{ModelSettings, SamplingParams};
use safechat_safety::SafetyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything one `chat-completion` run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Model to load
    #[serde(default)]
    pub model: ModelSettings,

    /// Sampling hyperparameters
    #[serde(default)]
    pub generation: SamplingParams,

    /// Seed for the single sampling stream of the run
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Safety checkers applied to prompts and outputs
    #[serde(default)]
    pub safety: SafetyConfig,

    /// JSON file with the dialogs; stdin when unset
    #[serde(default)]
    pub prompt_file: Option<PathBuf>,
}

fn default_seed() -> u64 {
    42
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            generation: SamplingParams::default(),
            seed: default_seed(),
            safety: SafetyConfig::default(),
            prompt_file: None,
        }
    }
}

impl RunConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        Ok(config)
    }

    /// Read a YAML configuration file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Apply CLI overrides
    pub fn apply_cli(&mut self, cli: &Cli) {
        let model = &mut self.model;
        if let Some(name) = &cli.model_name {
            model.model_id = name.clone();
        }
        if let Some(revision) = &cli.revision {
            model.revision = revision.clone();
        }
        if cli.quantization.is_some() {
            model.quantization = cli.quantization;
        }
        if let Some(peft) = &cli.peft_model {
            model.peft_model = Some(peft.clone());
        }
        if let Some(fast) = cli.use_fast_kernels {
            model.use_fast_kernels = fast;
        }

        let generation = &mut self.generation;
        override_with(&mut generation.max_new_tokens, cli.max_new_tokens);
        override_with(&mut generation.min_new_tokens, cli.min_new_tokens);
        override_with(&mut generation.do_sample, cli.do_sample);
        override_with(&mut generation.use_cache, cli.use_cache);
        override_with(&mut generation.top_p, cli.top_p);
        override_with(&mut generation.temperature, cli.temperature);
        override_with(&mut generation.top_k, cli.top_k);
        override_with(&mut generation.repetition_penalty, cli.repetition_penalty);
        override_with(&mut generation.length_penalty, cli.length_penalty);

        let safety = &mut self.safety;
        override_with(&mut safety.enable_azure_content_safety, cli.enable_azure_content_safety);
        override_with(&mut safety.enable_sensitive_topics, cli.enable_sensitive_topics);
        override_with(
            &mut safety.enable_salesforce_content_safety,
            cli.enable_salesforce_content_safety,
        );
        override_with(
            &mut safety.enable_llamaguard_content_safety,
            cli.enable_llamaguard_content_safety,
        );
        override_with(&mut safety.safety_score_threshold, cli.safety_score_threshold);
        if let Some(guard) = &cli.llamaguard_model {
            safety.llamaguard_model = guard.clone();
        }

        if cli.cpu {
            self.model.cpu = true;
            self.safety.cpu = true;
        }

        override_with(&mut self.seed, cli.seed);
        if let Some(path) = &cli.prompt_file {
            self.prompt_file = Some(path.clone());
        }
    }
}

fn override_with<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_defaults_without_config() {
        let cli = Cli::parse_from(["chat-completion", "my-model"]);
        let config = RunConfig::load(&cli).unwrap();

        assert_eq!(config.model.model_id, "my-model");
        assert_eq!(config.seed, 42);
        assert_eq!(config.generation, SamplingParams::default());
        assert!(config.safety.enable_salesforce_content_safety);
        assert!(config.prompt_file.is_none());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "model:\n  model_id: from-file\n  revision: dev\ngeneration:\n  max_new_tokens: 32\n  top_k: 5\nseed: 7\nsafety:\n  enable_sensitive_topics: true\n"
        )
        .unwrap();

        let cli = Cli::parse_from([
            "chat-completion".to_string(),
            "from-cli".to_string(),
            "--config".to_string(),
            file.path().display().to_string(),
            "--top-k".to_string(),
            "10".to_string(),
            "--cpu".to_string(),
        ]);
        let config = RunConfig::load(&cli).unwrap();

        assert_eq!(config.model.model_id, "from-cli");
        assert_eq!(config.model.revision, "dev");
        assert_eq!(config.generation.max_new_tokens, 32);
        assert_eq!(config.generation.top_k, 10);
        assert_eq!(config.seed, 7);
        assert!(config.safety.enable_sensitive_topics);
        assert!(config.model.cpu && config.safety.cpu);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli::parse_from(["chat-completion", "m", "--config", "/nonexistent/run.yaml"]);
        assert!(RunConfig::load(&cli).is_err());
    }
}
