//! Model file resolution from a local directory or the Hugging Face Hub

use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use safechat_core::{Error, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A place model files can be fetched from
pub enum ModelRepo {
    /// Local directory holding the model files
    Local(PathBuf),

    /// Hugging Face Hub repository (files are cached by hf-hub)
    Hub { id: String, repo: ApiRepo },
}

impl ModelRepo {
    /// Resolve an identifier: existing directories are local, anything else
    /// is treated as a Hub repo id.
    pub fn open(id: &str, revision: &str) -> Result<Self> {
        let path = Path::new(id);
        if path.is_dir() {
            tracing::debug!("Using local model directory {}", path.display());
            return Ok(Self::Local(path.to_path_buf()));
        }

        tracing::info!("Resolving model from HuggingFace: {} @ {}", id, revision);
        let api = Api::new().map_err(|e| {
            Error::model(format!("Failed to initialize HuggingFace API: {}", e))
        })?;
        let repo = api.repo(Repo::with_revision(
            id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        Ok(Self::Hub {
            id: id.to_string(),
            repo,
        })
    }

    /// Human-readable identifier
    pub fn id(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Hub { id, .. } => id.clone(),
        }
    }

    /// Path to a file in the repo, downloading it if needed
    pub fn get(&self, filename: &str) -> Result<PathBuf> {
        match self {
            Self::Local(dir) => {
                let path = dir.join(filename);
                if !path.exists() {
                    return Err(Error::model(format!(
                        "Model file does not exist: {}",
                        path.display()
                    )));
                }
                Ok(path)
            }
            Self::Hub { id, repo } => {
                tracing::debug!("Downloading {} from {}", filename, id);
                repo.get(filename).map_err(|e| {
                    Error::model(format!("Failed to download {} from {}: {}", filename, id, e))
                })
            }
        }
    }

    /// Whether the repo contains a file, without downloading it
    pub fn contains(&self, filename: &str) -> Result<bool> {
        Ok(self.list()?.iter().any(|f| f == filename))
    }

    /// All file names in the repo
    pub fn list(&self) -> Result<Vec<String>> {
        match self {
            Self::Local(dir) => {
                let mut files = Vec::new();
                for entry in std::fs::read_dir(dir)? {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        files.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                files.sort();
                Ok(files)
            }
            Self::Hub { id, repo } => {
                let info = repo.info().map_err(|e| {
                    Error::model(format!("Failed to list files of {}: {}", id, e))
                })?;
                let mut files: Vec<String> =
                    info.siblings.into_iter().map(|s| s.rfilename).collect();
                files.sort();
                Ok(files)
            }
        }
    }

    /// Safetensors weight files, following a shard index when present
    pub fn safetensors(&self) -> Result<Vec<PathBuf>> {
        let files = self.list()?;
        if files.iter().any(|f| f == "model.safetensors.index.json") {
            let index = self.get("model.safetensors.index.json")?;
            let shards = shard_names(&std::fs::read_to_string(index)?)?;
            return shards.iter().map(|name| self.get(name)).collect();
        }
        if files.iter().any(|f| f == "model.safetensors") {
            return Ok(vec![self.get("model.safetensors")?]);
        }
        Err(Error::model(format!(
            "No safetensors weights found in {} (tried model.safetensors.index.json, model.safetensors)",
            self.id()
        )))
    }

    /// A GGUF checkpoint whose name contains `marker` (case-insensitive)
    pub fn gguf(&self, marker: &str) -> Result<PathBuf> {
        let name = find_gguf(&self.list()?, marker).ok_or_else(|| {
            Error::model(format!(
                "No GGUF checkpoint matching '{}' found in {}",
                marker,
                self.id()
            ))
        })?;
        tracing::info!("Using quantized checkpoint {}", name);
        self.get(&name)
    }
}

/// Distinct shard file names referenced by a safetensors index
pub fn shard_names(index_json: &str) -> Result<Vec<String>> {
    let index: serde_json::Value = serde_json::from_str(index_json)?;
    let weight_map = index
        .get("weight_map")
        .and_then(|m| m.as_object())
        .ok_or_else(|| Error::model("safetensors index has no weight_map"))?;

    let shards: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    Ok(shards.into_iter().collect())
}

/// First GGUF file (in name order) containing `marker`
pub fn find_gguf(files: &[String], marker: &str) -> Option<String> {
    let marker = marker.to_ascii_lowercase();
    let mut candidates: Vec<&String> = files
        .iter()
        .filter(|f| {
            let lower = f.to_ascii_lowercase();
            lower.ends_with(".gguf") && lower.contains(&marker)
        })
        .collect();
    candidates.sort();
    candidates.first().map(|s| s.to_string())
}
