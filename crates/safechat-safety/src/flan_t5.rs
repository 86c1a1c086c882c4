//! Salesforce safety Flan-T5 checker
//!
//! A Flan-T5 model fine-tuned to answer "safe"/"unsafe" followed by one
//! `<category> true|false` pair per harm category. The per-category
//! probabilities are read from the decoder logits at the steps where the
//! `true`/`false` answers are produced.

use crate::checker::{pipe_table, SafetyChecker, SafetyResult};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::t5::{Config as T5Config, T5ForConditionalGeneration};
use safechat_core::{Error, Result};
use safechat_runtime::ModelRepo;
use std::sync::Mutex;
use std::time::Instant;
use tokenizers::Tokenizer;

/// Default checker model on the Hub
pub const DEFAULT_MODEL: &str = "Salesforce/safety-flan-t5-base";

/// Repo providing `tokenizer.json` when the checker repo ships none
const FALLBACK_TOKENIZER: &str = "google/flan-t5-base";

const PROMPT_PREFIX: &str = "Is the <Text> field safe or unsafe?";
const MAX_INPUT_TOKENS: usize = 512;
const MAX_NEW_TOKENS: usize = 20;

/// Harm categories, in the order the model emits them
const CATEGORY_KEYS: &[&str] = &[
    "toxicity", "hate", "identity", "violence", "physical", "sexual", "profanity", "biased",
];

/// Decode step of the first category answer; answers follow every 2 steps
const FIRST_ANSWER_STEP: usize = 3;

struct T5State {
    model: T5ForConditionalGeneration,
    config: T5Config,
}

/// Safety checker running the Salesforce safety Flan-T5 model locally
pub struct FlanT5SafetyChecker {
    name: String,
    state: Mutex<T5State>,
    tokenizer: Tokenizer,
    true_false_ids: (u32, u32),
    device: Device,
}

impl FlanT5SafetyChecker {
    /// Load the checker model from a Hub repo id or local directory
    pub fn load(model_id: &str, device: Device) -> Result<Self> {
        let start = Instant::now();
        let repo = ModelRepo::open(model_id, "main")?;
        let files = repo.list()?;

        let config: T5Config =
            serde_json::from_slice(&std::fs::read(repo.get("config.json")?)?)?;

        let vb = if files.iter().any(|f| f == "model.safetensors") {
            let weights = repo.get("model.safetensors")?;
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device) }
        } else {
            let weights = repo.get("pytorch_model.bin")?;
            VarBuilder::from_pth(weights, DType::F32, &device)
        }
        .map_err(|e| Error::checker(format!("Failed to load Flan-T5 weights: {}", e)))?;

        let model = T5ForConditionalGeneration::load(vb, &config)
            .map_err(|e| Error::checker(format!("Failed to load Flan-T5 model: {}", e)))?;

        let tokenizer_path = if files.iter().any(|f| f == "tokenizer.json") {
            repo.get("tokenizer.json")?
        } else {
            tracing::debug!("{} has no tokenizer.json, using {}", model_id, FALLBACK_TOKENIZER);
            ModelRepo::open(FALLBACK_TOKENIZER, "main")?.get("tokenizer.json")?
        };
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| Error::checker(format!("Failed to load tokenizer: {}", e)))?;

        let true_false_ids = true_false_ids(&tokenizer)?;

        tracing::info!(
            "Loaded Flan-T5 safety checker {} in {:.1}s",
            model_id,
            start.elapsed().as_secs_f64()
        );

        Ok(Self {
            name: "Salesforce Content Safety Flan T5 Base".to_string(),
            state: Mutex::new(T5State { model, config }),
            tokenizer,
            true_false_ids,
            device,
        })
    }

    /// Greedy decode; returns generated ids and per-step (true, false) logits
    fn generate(&self, text: &str) -> Result<(Vec<u32>, Vec<(f32, f32)>)> {
        let prompt = format!("{} <Text> {} <Context> ", PROMPT_PREFIX, text);
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| Error::checker(format!("Tokenization failed: {}", e)))?;

        let mut input_ids = encoding.get_ids().to_vec();
        if input_ids.len() > MAX_INPUT_TOKENS {
            tracing::warn!(
                "Input length is > {} token. Safety check result could be incorrect.",
                MAX_INPUT_TOKENS
            );
            input_ids.truncate(MAX_INPUT_TOKENS);
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::internal("Flan-T5 model lock poisoned"))?;
        let T5State { model, config } = &mut *state;

        self.decode_loop(model, config, &input_ids)
            .map_err(|e| Error::checker(format!("Flan-T5 generation failed: {}", e)))
    }

    fn decode_loop(
        &self,
        model: &mut T5ForConditionalGeneration,
        config: &T5Config,
        input_ids: &[u32],
    ) -> candle_core::Result<(Vec<u32>, Vec<(f32, f32)>)> {
        model.clear_kv_cache();

        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let encoder_output = model.encode(&input)?;

        let start_id = config
            .decoder_start_token_id
            .unwrap_or(config.pad_token_id) as u32;
        let mut decoder_ids = vec![start_id];
        let mut step_scores = Vec::with_capacity(MAX_NEW_TOKENS);
        let (true_id, false_id) = self.true_false_ids;

        for step in 0..MAX_NEW_TOKENS {
            let decoder_input = if step == 0 || !config.use_cache {
                Tensor::new(decoder_ids.as_slice(), &self.device)?.unsqueeze(0)?
            } else {
                let last = decoder_ids[decoder_ids.len() - 1];
                Tensor::new(&[last], &self.device)?.unsqueeze(0)?
            };

            let logits = model
                .decode(&decoder_input, &encoder_output)?
                .squeeze(0)?
                .to_dtype(DType::F32)?
                .to_vec1::<f32>()?;

            step_scores.push((logits[true_id as usize], logits[false_id as usize]));

            let next = argmax(&logits);
            if next as usize == config.eos_token_id {
                break;
            }
            decoder_ids.push(next);
        }

        Ok((decoder_ids.split_off(1), step_scores))
    }
}

/// Token ids of `true` and `false` in the T5 vocabulary
fn true_false_ids(tokenizer: &Tokenizer) -> Result<(u32, u32)> {
    let encoding = tokenizer
        .encode("true false", false)
        .map_err(|e| Error::checker(format!("Tokenization failed: {}", e)))?;
    match encoding.get_ids() {
        [t, f, ..] => Ok((*t, *f)),
        _ => Err(Error::checker("tokenizer does not split 'true false' into two tokens")),
    }
}

fn argmax(values: &[f32]) -> u32 {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best, best_v)
            }
        })
        .0 as u32
}

/// Probability of `true` over {true, false}, rounded to 5 decimals
fn true_probability((true_logit, false_logit): (f32, f32)) -> f64 {
    let p = 1.0 / (1.0 + ((false_logit - true_logit) as f64).exp());
    (p * 1e5).round() / 1e5
}

/// Render a probability the way the report has always shown it: whole
/// values keep one decimal and tiny values use a two-digit exponent.
fn format_probability(p: f64) -> String {
    if p == p.trunc() {
        return format!("{:.1}", p);
    }
    if p.abs() < 1e-4 {
        let sci = format!("{:e}", p);
        if let Some((mantissa, exp)) = sci.split_once('e') {
            if let Ok(exp) = exp.parse::<i32>() {
                let sign = if exp < 0 { '-' } else { '+' };
                return format!("{}e{}{:02}", mantissa, sign, exp.abs());
            }
        }
        return sci;
    }
    p.to_string()
}

/// Build the verdict from the decoded answer and the per-step logits
fn verdict(name: &str, answer: &str, step_scores: &[(f32, f32)]) -> SafetyResult {
    if answer.split(' ').next() == Some("safe") {
        return SafetyResult::safe(name);
    }

    let values: Vec<String> = CATEGORY_KEYS
        .iter()
        .enumerate()
        .map(|(i, _)| {
            step_scores
                .get(FIRST_ANSWER_STEP + 2 * i)
                .map(|&s| format_probability(true_probability(s)))
                .unwrap_or_else(|| "-".to_string())
        })
        .collect();

    SafetyResult::unsafe_with(name, pipe_table(CATEGORY_KEYS, &values))
}

#[async_trait::async_trait]
impl SafetyChecker for FlanT5SafetyChecker {
    async fn evaluate(&self, text: &str) -> Result<SafetyResult> {
        let start = Instant::now();

        let (generated, step_scores) = self.generate(text)?;
        let answer = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| Error::checker(format!("Decoding failed: {}", e)))?;
        tracing::debug!(answer = %answer, "Flan-T5 safety answer");

        Ok(verdict(&self.name, &answer, &step_scores)
            .with_latency_us(start.elapsed().as_micros() as u64))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
