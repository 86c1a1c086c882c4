//! Model loading settings

use candle_core::{DType, Device};
use safechat_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Weight quantization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantization {
    #[serde(rename = "4bit")]
    FourBit,
    #[serde(rename = "8bit")]
    EightBit,
}

impl Quantization {
    /// Substring identifying a matching GGUF checkpoint file name
    pub fn gguf_marker(&self) -> &'static str {
        match self {
            Self::FourBit => "q4",
            Self::EightBit => "q8",
        }
    }
}

impl FromStr for Quantization {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "4bit" => Ok(Self::FourBit),
            "8bit" => Ok(Self::EightBit),
            other => Err(format!("unknown quantization '{}', expected 4bit or 8bit", other)),
        }
    }
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FourBit => write!(f, "4bit"),
            Self::EightBit => write!(f, "8bit"),
        }
    }
}

/// Everything needed to load a causal language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Hugging Face repo id or local model directory
    pub model_id: String,

    /// Hub revision
    pub revision: String,

    /// Optional quantized checkpoint to load instead of full weights
    pub quantization: Option<Quantization>,

    /// Optional LoRA adapter (repo id or local directory)
    pub peft_model: Option<String>,

    /// Use fused attention kernels when compiled in
    pub use_fast_kernels: bool,

    /// Force CPU even if an accelerator is available
    pub cpu: bool,

    /// Weight dtype (f32, f16, bf16); picked from the device when unset
    pub dtype: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            revision: "main".to_string(),
            quantization: None,
            peft_model: None,
            use_fast_kernels: false,
            cpu: false,
            dtype: None,
        }
    }
}

impl ModelSettings {
    /// Settings for the given model id with defaults elsewhere
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Default::default()
        }
    }

    /// Check for combinations that cannot be loaded
    pub fn validate(&self) -> Result<()> {
        if self.model_id.trim().is_empty() {
            return Err(Error::config("model name is required"));
        }
        if self.quantization.is_some() && self.peft_model.is_some() {
            return Err(Error::config(
                "LoRA adapters cannot be merged into quantized checkpoints",
            ));
        }
        self.parse_dtype()?;
        Ok(())
    }

    /// Select the inference device
    pub fn device(&self) -> Result<Device> {
        if self.cpu {
            return Ok(Device::Cpu);
        }
        if candle_core::utils::cuda_is_available() {
            Device::new_cuda(0)
                .map_err(|e| Error::model(format!("Failed to initialize CUDA: {}", e)))
        } else if candle_core::utils::metal_is_available() {
            Device::new_metal(0)
                .map_err(|e| Error::model(format!("Failed to initialize Metal: {}", e)))
        } else {
            Ok(Device::Cpu)
        }
    }

    /// Resolve the weight dtype for a device
    pub fn dtype_for(&self, device: &Device) -> Result<DType> {
        Ok(match self.parse_dtype()? {
            Some(dtype) => dtype,
            None if device.is_cpu() => DType::F32,
            None => DType::F16,
        })
    }

    fn parse_dtype(&self) -> Result<Option<DType>> {
        match self.dtype.as_deref() {
            None => Ok(None),
            Some("f32") => Ok(Some(DType::F32)),
            Some("f16") => Ok(Some(DType::F16)),
            Some("bf16") => Ok(Some(DType::BF16)),
            Some(other) => Err(Error::config(format!("Unsupported dtype {}", other))),
        }
    }
}
