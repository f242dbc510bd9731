//! Persisted per-ticker model weights.
//!
//! Layout: `{dir}/model_{TICKER}.safetensors`
//!
//! A model is looked up by ticker and stored once after training. Nothing
//! about the stored weights is validated on lookup: the caller gets exactly
//! what was written.

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Named tensors making up one trained model.
pub type ModelWeights = HashMap<String, Tensor>;

pub trait ModelStore: Send + Sync {
    fn lookup(&self, ticker: &str, device: &Device) -> Result<Option<ModelWeights>>;
    fn store(&self, ticker: &str, weights: &ModelWeights) -> Result<()>;
}

/// Store key for a ticker; tickers are case-insensitive.
pub fn model_key(ticker: &str) -> String {
    format!("model_{}", ticker.trim().to_uppercase())
}

/// Snapshot the current values of every variable in `varmap`.
pub fn weights_from_varmap(varmap: &VarMap) -> Result<ModelWeights> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| anyhow::anyhow!("variable map poisoned: {}", e))?;
    Ok(data
        .iter()
        .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
        .collect())
}

pub struct FileModelStore {
    dir: PathBuf,
}

impl FileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.safetensors", model_key(ticker)))
    }
}

impl ModelStore for FileModelStore {
    fn lookup(&self, ticker: &str, device: &Device) -> Result<Option<ModelWeights>> {
        let path = self.path_for(ticker);
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "reading model weights");
        let weights = candle_core::safetensors::load(&path, device)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Some(weights))
    }

    fn store(&self, ticker: &str, weights: &ModelWeights) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        // Write to .tmp then rename, so a concurrent reader never sees half a file.
        let path = self.path_for(ticker);
        let tmp_path = path.with_extension("safetensors.tmp");
        candle_core::safetensors::save(weights, &tmp_path)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            anyhow::anyhow!("atomic rename to {} failed: {}", path.display(), e)
        })?;

        debug!(path = %path.display(), "wrote model weights");
        Ok(())
    }
}
