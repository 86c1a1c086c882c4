//! Causal language model runtime
//!
//! Owns a loaded Llama-family model and its tokenizer. Full-precision
//! checkpoints come from safetensors (optionally with a merged LoRA
//! adapter); quantized checkpoints come from GGUF files.

use crate::chat_template::ChatFormat;
use crate::lora::LoraAdapter;
use crate::sampling::GenerationContext;
use crate::settings::ModelSettings;
use crate::source::ModelRepo;
use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{self, Llama, LlamaConfig, LlamaEosToks};
use candle_transformers::models::quantized_llama;
use safechat_core::{Dialog, Error, Result};
use std::collections::HashMap;
use std::time::Instant;
use tokenizers::Tokenizer;

/// Token ids plus attention mask for a single sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl GenerationRequest {
    /// Request attending to every input token
    pub fn new(input_ids: Vec<u32>) -> Self {
        let attention_mask = vec![1; input_ids.len()];
        Self {
            input_ids,
            attention_mask,
        }
    }

    /// Input ids with masked-out positions dropped
    pub fn attended_ids(&self) -> Result<Vec<u32>> {
        if self.attention_mask.len() != self.input_ids.len() {
            return Err(Error::model(format!(
                "attention mask length {} does not match input length {}",
                self.attention_mask.len(),
                self.input_ids.len()
            )));
        }
        Ok(self
            .input_ids
            .iter()
            .zip(&self.attention_mask)
            .filter(|(_, mask)| **mask != 0)
            .map(|(id, _)| *id)
            .collect())
    }
}

/// The model capability the generation driver depends on
pub trait ChatModel {
    /// Map a dialog to prompt token ids
    fn apply_chat_template(&self, dialog: &Dialog) -> Result<Vec<u32>>;

    /// Generate a continuation; returns prompt ids followed by new ids
    fn generate(&mut self, request: &GenerationRequest, ctx: &mut GenerationContext) -> Result<Vec<u32>>;

    /// Decode ids to text, skipping special tokens
    fn decode(&self, ids: &[u32]) -> Result<String>;
}

enum Backend {
    Full {
        model: Llama,
        config: llama::Config,
        dtype: DType,
    },
    Quantized {
        model: quantized_llama::ModelWeights,
    },
}

/// A loaded Llama-family model with its tokenizer
pub struct CausalLmRuntime {
    name: String,
    backend: Backend,
    tokenizer: Tokenizer,
    format: ChatFormat,
    eos_ids: Vec<u32>,
    device: Device,
}

impl CausalLmRuntime {
    /// Load model and tokenizer as described by `settings`
    pub fn load(settings: &ModelSettings) -> Result<Self> {
        settings.validate()?;
        let start = Instant::now();

        let device = settings.device()?;
        let repo = ModelRepo::open(&settings.model_id, &settings.revision)?;

        let tokenizer = Tokenizer::from_file(repo.get("tokenizer.json")?)
            .map_err(|e| Error::model(format!("Failed to load tokenizer: {}", e)))?;
        let format = ChatFormat::detect(&tokenizer);

        let (backend, mut eos_ids) = match settings.quantization {
            Some(quantization) => {
                let path = repo.gguf(quantization.gguf_marker())?;
                let mut file = std::fs::File::open(&path)?;
                let content = gguf_file::Content::read(&mut file)
                    .map_err(|e| Error::model(format!("Failed to read GGUF {}: {}", path.display(), e)))?;
                let model = quantized_llama::ModelWeights::from_gguf(content, &mut file, &device)
                    .map_err(|e| Error::model(format!("Failed to load quantized model: {}", e)))?;
                (Backend::Quantized { model }, Vec::new())
            }
            None => Self::load_full(settings, &repo, &device)?,
        };

        for token in format.stop_tokens() {
            if let Some(id) = tokenizer.token_to_id(token) {
                if !eos_ids.contains(&id) {
                    eos_ids.push(id);
                }
            }
        }

        let runtime = Self {
            name: repo.id(),
            backend,
            tokenizer,
            format,
            eos_ids,
            device,
        };

        metrics::histogram!("safechat_model_load_ms").record(start.elapsed().as_millis() as f64);
        tracing::info!(
            "Loaded model {} ({:?} chat format, quantization: {}) in {:.1}s",
            runtime.name,
            runtime.format,
            settings
                .quantization
                .map(|q| q.to_string())
                .unwrap_or_else(|| "none".to_string()),
            start.elapsed().as_secs_f64()
        );
        Ok(runtime)
    }

    fn load_full(
        settings: &ModelSettings,
        repo: &ModelRepo,
        device: &Device,
    ) -> Result<(Backend, Vec<u32>)> {
        let dtype = settings.dtype_for(device)?;

        let config: LlamaConfig = serde_json::from_slice(&std::fs::read(repo.get("config.json")?)?)?;
        let use_flash_attn = settings.use_fast_kernels && cfg!(feature = "flash-attn");
        if settings.use_fast_kernels && !use_flash_attn {
            tracing::warn!("Fast kernels requested but the 'flash-attn' feature is not compiled in");
        }
        let config = config.into_config(use_flash_attn);

        let eos_ids = match &config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => vec![*id],
            Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
            None => Vec::new(),
        };

        let weight_files = repo.safetensors()?;
        let vb = match &settings.peft_model {
            Some(adapter_id) => {
                let mut weights = HashMap::new();
                for file in &weight_files {
                    let tensors = candle_core::safetensors::load(file, device)
                        .map_err(|e| Error::model(format!("Failed to load weights: {}", e)))?;
                    weights.extend(tensors);
                }

                let adapter_repo = ModelRepo::open(adapter_id, "main")?;
                let adapter = LoraAdapter::load(&adapter_repo, device)?;
                adapter.merge_into(&mut weights)?;
                VarBuilder::from_tensors(weights, dtype, device)
            }
            None => unsafe {
                VarBuilder::from_mmaped_safetensors(&weight_files, dtype, device)
                    .map_err(|e| Error::model(format!("Failed to load weights: {}", e)))?
            },
        };

        let model = Llama::load(vb, &config)
            .map_err(|e| Error::model(format!("Failed to load Llama model: {}", e)))?;

        Ok((
            Backend::Full {
                model,
                config,
                dtype,
            },
            eos_ids,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chat_format(&self) -> ChatFormat {
        self.format
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Tokenize raw prompt text; special tokens written in the text are kept
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| Error::model(format!("Tokenization failed: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn forward(
        &mut self,
        cache: &mut Option<llama::Cache>,
        input: &Tensor,
        index_pos: usize,
    ) -> candle_core::Result<Tensor> {
        match &mut self.backend {
            Backend::Full { model, .. } => {
                let cache = cache.as_mut().ok_or_else(|| {
                    candle_core::Error::Msg("llama cache not initialized".to_string())
                })?;
                model.forward(input, index_pos, cache)
            }
            Backend::Quantized { model } => model.forward(input, index_pos),
        }
    }

    fn new_cache(&self, use_cache: bool) -> Result<Option<llama::Cache>> {
        match &self.backend {
            Backend::Full { config, dtype, .. } => llama::Cache::new(use_cache, *dtype, config, &self.device)
                .map(Some)
                .map_err(|e| Error::model(format!("Failed to create KV cache: {}", e))),
            Backend::Quantized { .. } => Ok(None),
        }
    }

    fn next_token(
        &mut self,
        tokens: &[u32],
        generated: usize,
        cache: &mut Option<llama::Cache>,
        index_pos: &mut usize,
        ctx: &mut GenerationContext,
    ) -> candle_core::Result<u32> {
        let params = ctx.params().clone();

        let (context_size, context_index) = if params.use_cache && generated > 0 {
            (1, *index_pos)
        } else {
            (tokens.len(), 0)
        };
        let ctxt = &tokens[tokens.len().saturating_sub(context_size)..];
        let input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;

        let logits = self
            .forward(cache, &input, context_index)?
            .squeeze(0)?
            .to_dtype(DType::F32)?;
        *index_pos = context_index + ctxt.len();

        let logits = if params.repetition_penalty == 1.0 {
            logits
        } else {
            candle_transformers::utils::apply_repeat_penalty(
                &logits,
                params.repetition_penalty,
                tokens,
            )?
        };

        let logits = if generated < params.min_new_tokens && !self.eos_ids.is_empty() {
            suppress_tokens(&logits, &self.eos_ids)?
        } else {
            logits
        };

        ctx.sample(&logits)
    }
}

impl ChatModel for CausalLmRuntime {
    fn apply_chat_template(&self, dialog: &Dialog) -> Result<Vec<u32>> {
        let prompt = self.format.render(dialog, false);
        self.encode(&prompt)
    }

    fn generate(&mut self, request: &GenerationRequest, ctx: &mut GenerationContext) -> Result<Vec<u32>> {
        let mut tokens = request.attended_ids()?;
        if tokens.is_empty() {
            return Err(Error::model("cannot generate from an empty prompt"));
        }

        let params = ctx.params().clone();
        if params.length_penalty != 1 {
            tracing::debug!(
                length_penalty = params.length_penalty,
                "length penalty only applies to beam search; ignored"
            );
        }

        let start = Instant::now();
        let prompt_len = tokens.len();
        let mut cache = self.new_cache(params.use_cache)?;
        let mut index_pos = 0;

        for generated in 0..params.max_new_tokens {
            let next = self
                .next_token(&tokens, generated, &mut cache, &mut index_pos, ctx)
                .map_err(|e| Error::model(format!("Generation failed: {}", e)))?;
            tokens.push(next);

            if self.eos_ids.contains(&next) {
                break;
            }
        }

        ctx.record_generation();
        let new_tokens = tokens.len() - prompt_len;
        metrics::counter!("safechat_generated_tokens_total").increment(new_tokens as u64);
        tracing::debug!(
            prompt_tokens = prompt_len,
            new_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Generation finished"
        );
        Ok(tokens)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| Error::model(format!("Decoding failed: {}", e)))
    }
}

/// Set the logits of `ids` to negative infinity
pub fn suppress_tokens(logits: &Tensor, ids: &[u32]) -> candle_core::Result<Tensor> {
    let mut values = logits.to_vec1::<f32>()?;
    for &id in ids {
        if let Some(v) = values.get_mut(id as usize) {
            *v = f32::NEG_INFINITY;
        }
    }
    Tensor::new(values, logits.device())
}
