//! LoRA adapter merging
//!
//! PEFT adapters store low-rank factors `A` (r x in) and `B` (out x r) per
//! target module. Merging folds `scale * B·A` into the base weight so the
//! adapted model runs at the base model's cost.

use crate::source::ModelRepo;
use candle_core::{DType, Device, Tensor};
use safechat_core::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Subset of PEFT's `adapter_config.json` needed for merging
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Rank of the update
    pub r: usize,

    /// Scaling numerator
    pub lora_alpha: f64,

    #[serde(default)]
    pub target_modules: Vec<String>,

    #[serde(default)]
    pub base_model_name_or_path: Option<String>,
}

impl AdapterConfig {
    pub fn scale(&self) -> f64 {
        self.lora_alpha / self.r as f64
    }
}

/// A loaded adapter: config plus its low-rank factors by base module name
pub struct LoraAdapter {
    pub config: AdapterConfig,
    factors: HashMap<String, (Tensor, Tensor)>,
}

impl LoraAdapter {
    /// Load `adapter_config.json` and `adapter_model.safetensors` from a repo
    pub fn load(repo: &ModelRepo, device: &Device) -> Result<Self> {
        let config_path = repo.get("adapter_config.json")?;
        let config: AdapterConfig = serde_json::from_str(&std::fs::read_to_string(config_path)?)?;

        let weights_path = repo.get("adapter_model.safetensors")?;
        let tensors = candle_core::safetensors::load(&weights_path, device)
            .map_err(|e| Error::model(format!("Failed to load adapter weights: {}", e)))?;

        let adapter = Self::from_tensors(config, tensors)?;
        tracing::info!(
            "Loaded LoRA adapter from {} (r={}, alpha={}, {} modules)",
            repo.id(),
            adapter.config.r,
            adapter.config.lora_alpha,
            adapter.factors.len()
        );
        Ok(adapter)
    }

    /// Pair up `lora_A`/`lora_B` tensors by their base module name
    pub fn from_tensors(config: AdapterConfig, tensors: HashMap<String, Tensor>) -> Result<Self> {
        if config.r == 0 {
            return Err(Error::model("LoRA rank must be positive"));
        }

        let mut a_factors = HashMap::new();
        let mut b_factors = HashMap::new();
        for (name, tensor) in tensors {
            match split_lora_key(&name) {
                Some((module, LoraFactor::A)) => {
                    a_factors.insert(module, tensor);
                }
                Some((module, LoraFactor::B)) => {
                    b_factors.insert(module, tensor);
                }
                None => tracing::debug!("Ignoring adapter tensor {}", name),
            }
        }

        let mut factors = HashMap::new();
        for (module, a) in a_factors {
            let b = b_factors.remove(&module).ok_or_else(|| {
                Error::model(format!("LoRA module {} has lora_A but no lora_B", module))
            })?;
            factors.insert(module, (a, b));
        }
        if let Some(module) = b_factors.keys().next() {
            return Err(Error::model(format!(
                "LoRA module {} has lora_B but no lora_A",
                module
            )));
        }

        Ok(Self { config, factors })
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.factors.keys().map(String::as_str)
    }

    /// Merge every factor pair into the matching `<module>.weight` tensor
    pub fn merge_into(&self, weights: &mut HashMap<String, Tensor>) -> Result<usize> {
        let scale = self.config.scale();
        let mut merged = 0;

        for (module, (a, b)) in &self.factors {
            let key = format!("{}.weight", module);
            let base = weights.get(&key).ok_or_else(|| {
                Error::model(format!("Base model has no weight {} for LoRA module", key))
            })?;

            let updated = merge_weight(base, a, b, scale)
                .map_err(|e| Error::model(format!("Failed to merge {}: {}", key, e)))?;
            weights.insert(key, updated);
            merged += 1;
        }

        tracing::debug!("Merged {} LoRA modules with scale {}", merged, scale);
        Ok(merged)
    }
}

/// `base + scale * (b @ a)`, computed in f32 and cast back to the base dtype
fn merge_weight(base: &Tensor, a: &Tensor, b: &Tensor, scale: f64) -> candle_core::Result<Tensor> {
    let dtype = base.dtype();
    let delta = b
        .to_dtype(DType::F32)?
        .matmul(&a.to_dtype(DType::F32)?)?
        .affine(scale, 0.0)?;
    (base.to_dtype(DType::F32)? + delta)?.to_dtype(dtype)
}

#[derive(Debug, PartialEq, Eq)]
enum LoraFactor {
    A,
    B,
}

/// Map a PEFT tensor name to (base module name, factor).
///
/// `base_model.model.model.layers.0.self_attn.q_proj.lora_A.weight`
/// becomes `model.layers.0.self_attn.q_proj`.
fn split_lora_key(name: &str) -> Option<(String, LoraFactor)> {
    let name = name.strip_prefix("base_model.model.").unwrap_or(name);
    let name = name
        .strip_suffix(".weight")?
        .trim_end_matches(".default");

    if let Some(module) = name.strip_suffix(".lora_A") {
        Some((module.to_string(), LoraFactor::A))
    } else {
        name.strip_suffix(".lora_B")
            .map(|module| (module.to_string(), LoraFactor::B))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(r: usize, alpha: f64) -> AdapterConfig {
        AdapterConfig {
            r,
            lora_alpha: alpha,
            target_modules: vec!["q_proj".into()],
            base_model_name_or_path: None,
        }
    }

    #[test]
    fn test_split_lora_key() {
        assert_eq!(
            split_lora_key("base_model.model.model.layers.0.self_attn.q_proj.lora_A.weight"),
            Some(("model.layers.0.self_attn.q_proj".to_string(), LoraFactor::A))
        );
        assert_eq!(
            split_lora_key("base_model.model.model.layers.3.mlp.up_proj.lora_B.default.weight"),
            Some(("model.layers.3.mlp.up_proj".to_string(), LoraFactor::B))
        );
        assert_eq!(split_lora_key("base_model.model.lm_head.weight"), None);
    }

    #[test]
    fn test_merge_adds_scaled_product() {
        let device = Device::Cpu;
        let prefix = "base_model.model.model.layers.0.self_attn.q_proj";
        let mut tensors = HashMap::new();
        // r = 1, in = 2, out = 2
        tensors.insert(
            format!("{prefix}.lora_A.weight"),
            Tensor::new(&[[1f32, 2.]], &device).unwrap(),
        );
        tensors.insert(
            format!("{prefix}.lora_B.weight"),
            Tensor::new(&[[1f32], [0.]], &device).unwrap(),
        );
        let adapter = LoraAdapter::from_tensors(config(1, 2.0), tensors).unwrap();

        let mut weights = HashMap::new();
        weights.insert(
            "model.layers.0.self_attn.q_proj.weight".to_string(),
            Tensor::zeros((2, 2), DType::F32, &device).unwrap(),
        );

        assert_eq!(adapter.merge_into(&mut weights).unwrap(), 1);
        let merged: Vec<Vec<f32>> = weights["model.layers.0.self_attn.q_proj.weight"]
            .to_vec2()
            .unwrap();
        assert_eq!(merged, vec![vec![2.0, 4.0], vec![0.0, 0.0]]);
    }

    #[test]
    fn test_unpaired_factor_rejected() {
        let device = Device::Cpu;
        let mut tensors = HashMap::new();
        tensors.insert(
            "base_model.model.model.layers.0.self_attn.v_proj.lora_A.weight".to_string(),
            Tensor::zeros((1, 2), DType::F32, &device).unwrap(),
        );
        assert!(LoraAdapter::from_tensors(config(1, 1.0), tensors).is_err());
    }

    #[test]
    fn test_missing_base_weight() {
        let device = Device::Cpu;
        let prefix = "base_model.model.model.layers.0.self_attn.k_proj";
        let mut tensors = HashMap::new();
        tensors.insert(
            format!("{prefix}.lora_A.weight"),
            Tensor::zeros((1, 2), DType::F32, &device).unwrap(),
        );
        tensors.insert(
            format!("{prefix}.lora_B.weight"),
            Tensor::zeros((2, 1), DType::F32, &device).unwrap(),
        );
        let adapter = LoraAdapter::from_tensors(config(1, 1.0), tensors).unwrap();
        assert!(adapter.merge_into(&mut HashMap::new()).is_err());
    }
}
