//! Sampling parameters and the seeded generation context

use candle_core::Tensor;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use serde::{Deserialize, Serialize};

/// Generation-time hyperparameters.
///
/// Defaults follow the usual Hugging Face `generate` defaults for chat
/// inference: sampling on, no temperature scaling, top-k 50.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Maximum number of tokens to generate
    pub max_new_tokens: usize,

    /// Minimum number of tokens to generate before EOS is allowed
    pub min_new_tokens: usize,

    /// Sample from the distribution; greedy decoding otherwise
    pub do_sample: bool,

    /// Nucleus sampling cutoff; values >= 1.0 disable it
    pub top_p: f64,

    /// Softmax temperature
    pub temperature: f64,

    /// Keep only the k most probable tokens; 0 disables it
    pub top_k: usize,

    /// Repetition penalty; 1.0 means no penalty
    pub repetition_penalty: f32,

    /// Exponential length penalty, only meaningful for beam search
    pub length_penalty: i32,

    /// Reuse past key/values between decoding steps
    pub use_cache: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            min_new_tokens: 0,
            do_sample: true,
            top_p: 1.0,
            temperature: 1.0,
            top_k: 50,
            repetition_penalty: 1.0,
            length_penalty: 1,
            use_cache: true,
        }
    }
}

impl SamplingParams {
    /// Greedy decoding with the given budget
    pub fn greedy(max_new_tokens: usize) -> Self {
        Self {
            max_new_tokens,
            do_sample: false,
            ..Default::default()
        }
    }

    /// Map these parameters onto a candle sampling strategy
    pub fn sampling(&self) -> Sampling {
        if !self.do_sample || self.temperature <= 0.0 {
            return Sampling::ArgMax;
        }

        let temperature = self.temperature;
        let top_k = (self.top_k > 0).then_some(self.top_k);
        let top_p = (self.top_p < 1.0).then_some(self.top_p);

        match (top_k, top_p) {
            (None, None) => Sampling::All { temperature },
            (Some(k), None) => Sampling::TopK { k, temperature },
            (None, Some(p)) => Sampling::TopP { p, temperature },
            (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
        }
    }
}

/// Seeded state threaded through every generation call of a run.
///
/// The random stream is created once from the seed; successive generations
/// keep drawing from the same stream instead of being reseeded.
pub struct GenerationContext {
    seed: u64,
    params: SamplingParams,
    processor: LogitsProcessor,
    generations: usize,
}

impl GenerationContext {
    /// Create a context for the given seed and sampling parameters
    pub fn new(seed: u64, params: SamplingParams) -> Self {
        tracing::debug!(seed, ?params, "Seeding generation context");
        let processor = LogitsProcessor::from_sampling(seed, params.sampling());
        Self {
            seed,
            params,
            processor,
            generations: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    /// Number of generations run with this context so far
    pub fn generations(&self) -> usize {
        self.generations
    }

    /// Draw the next token from the run's random stream
    pub fn sample(&mut self, logits: &Tensor) -> candle_core::Result<u32> {
        self.processor.sample(logits)
    }

    /// Mark one generation as finished
    pub fn record_generation(&mut self) {
        self.generations += 1;
    }
}

impl std::fmt::Debug for GenerationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationContext")
            .field("seed", &self.seed)
            .field("params", &self.params)
            .field("generations", &self.generations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = SamplingParams::default();
        assert_eq!(params.max_new_tokens, 256);
        assert_eq!(params.min_new_tokens, 0);
        assert!(params.do_sample);
        assert_eq!(params.top_k, 50);
        assert!(params.use_cache);
    }

    #[test]
    fn test_sampling_strategy() {
        let params = SamplingParams::default();
        assert!(matches!(params.sampling(), Sampling::TopK { k: 50, .. }));

        let params = SamplingParams {
            top_p: 0.9,
            ..Default::default()
        };
        assert!(matches!(params.sampling(), Sampling::TopKThenTopP { k: 50, .. }));

        let params = SamplingParams {
            top_k: 0,
            top_p: 0.9,
            ..Default::default()
        };
        assert!(matches!(params.sampling(), Sampling::TopP { .. }));

        assert!(matches!(SamplingParams::greedy(10).sampling(), Sampling::ArgMax));

        let params = SamplingParams {
            temperature: 0.0,
            ..Default::default()
        };
        assert!(matches!(params.sampling(), Sampling::ArgMax));
    }

    fn draw(ctx: &mut GenerationContext, logits: &Tensor, n: usize) -> Vec<u32> {
        (0..n).map(|_| ctx.sample(logits).unwrap()).collect()
    }

    fn sampling_params() -> SamplingParams {
        SamplingParams {
            top_k: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let logits = Tensor::new(&[0f32; 16], &candle_core::Device::Cpu).unwrap();
        let mut a = GenerationContext::new(42, sampling_params());
        let mut b = GenerationContext::new(42, sampling_params());

        let first = draw(&mut a, &logits, 8);
        assert_eq!(first, draw(&mut b, &logits, 8));
        assert!(first.iter().any(|&t| t != first[0]));
    }

    #[test]
    fn test_stream_continues_across_generations() {
        let logits = Tensor::new(&[0f32; 16], &candle_core::Device::Cpu).unwrap();
        let mut ctx = GenerationContext::new(42, sampling_params());

        let first = draw(&mut ctx, &logits, 8);
        ctx.record_generation();
        let second = draw(&mut ctx, &logits, 8);
        assert_eq!(ctx.generations(), 1);
        assert_ne!(first, second);

        // A fresh context replays the whole stream, so no reseed happened in between
        let mut replay = GenerationContext::new(42, sampling_params());
        assert_eq!(draw(&mut replay, &logits, 16), [first, second].concat());
    }

    #[test]
    fn test_greedy_ignores_seed() {
        let logits = Tensor::new(&[0.1f32, 2.0, 0.3], &candle_core::Device::Cpu).unwrap();
        let mut a = GenerationContext::new(1, SamplingParams::greedy(4));
        let mut b = GenerationContext::new(2, SamplingParams::greedy(4));
        assert_eq!(a.sample(&logits).unwrap(), 1);
        assert_eq!(b.sample(&logits).unwrap(), 1);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let params: SamplingParams = serde_yaml::from_str("max_new_tokens: 32\ntop_p: 0.5").unwrap();
        assert_eq!(params.max_new_tokens, 32);
        assert_eq!(params.top_p, 0.5);
        assert_eq!(params.top_k, 50);
    }
}
