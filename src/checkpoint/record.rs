//! In-memory checkpoint representation

use candle_core::Tensor;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use super::adapter::CheckpointParams;
use crate::config::ComputeContext;
use crate::core::error::{Result, VcError};

/// Embedder assumed when a checkpoint does not declare one
pub const DEFAULT_EMBEDDER_NAME: &str = "hubert_base";

/// Named weight tensors of a checkpoint
#[derive(Debug, Clone, Default)]
pub struct WeightMap {
    tensors: HashMap<String, Tensor>,
}

impl WeightMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Tensor names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tensors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Shape of a tensor, if present
    pub fn shape(&self, name: &str) -> Option<Vec<usize>> {
        self.tensors.get(name).map(|t| t.dims().to_vec())
    }

    /// Whether any tensor lives under `prefix`
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.tensors.keys().any(|k| k.starts_with(prefix))
    }

    /// Drop every tensor under `prefix`, returning how many were removed
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.tensors.len();
        self.tensors.retain(|k, _| !k.starts_with(prefix));
        before - self.tensors.len()
    }

    /// Keep only tensors accepted by `keep`, returning the names that were dropped
    pub fn retain_names<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let mut dropped = Vec::new();
        self.tensors.retain(|k, _| {
            let keep_it = keep(k);
            if !keep_it {
                dropped.push(k.clone());
            }
            keep_it
        });
        dropped.sort_unstable();
        dropped
    }

    /// Move every tensor to the context's device; float tensors are cast to its dtype
    pub fn to_placement(&self, ctx: &ComputeContext) -> Result<WeightMap> {
        let mut placed = HashMap::with_capacity(self.tensors.len());
        for (name, tensor) in &self.tensors {
            let tensor = tensor.to_device(ctx.device())?;
            let tensor = if tensor.dtype().is_float() && tensor.dtype() != ctx.dtype() {
                tensor.to_dtype(ctx.dtype())?
            } else {
                tensor
            };
            placed.insert(name.clone(), tensor);
        }
        Ok(WeightMap { tensors: placed })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.tensors.iter()
    }

    pub fn into_inner(self) -> HashMap<String, Tensor> {
        self.tensors
    }
}

impl From<HashMap<String, Tensor>> for WeightMap {
    fn from(tensors: HashMap<String, Tensor>) -> Self {
        Self { tensors }
    }
}

/// Non-tensor entries stored next to the weights
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointMetadata {
    /// Pitch-awareness flag as stored (`1` = pitch-aware)
    pub f0: i64,
    /// Logical embedder name used at training time
    pub embedder_name: String,
    /// Checkpoint format version tag (`v1`, `v2`, ...)
    pub version: Option<String>,
    /// Free-form training info
    pub info: Option<String>,
    /// Sample-rate tag such as `40k`
    pub sample_rate_tag: Option<String>,
}

impl Default for CheckpointMetadata {
    fn default() -> Self {
        Self {
            f0: 1,
            embedder_name: DEFAULT_EMBEDDER_NAME.to_string(),
            version: None,
            info: None,
            sample_rate_tag: None,
        }
    }
}

impl CheckpointMetadata {
    pub fn is_pitch_aware(&self) -> bool {
        self.f0 == 1
    }
}

/// A deserialized checkpoint: weights, array-form config and metadata
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    /// Network weights
    pub weights: WeightMap,
    /// Array-form configuration, canonical order
    pub config: Vec<Value>,
    /// Already-normalized parameter map, when the checkpoint carries one
    pub params: Option<CheckpointParams>,
    /// Non-tensor metadata
    pub metadata: CheckpointMetadata,
}

impl CheckpointRecord {
    pub fn new(weights: WeightMap, config: Vec<Value>, metadata: CheckpointMetadata) -> Self {
        Self {
            weights,
            config,
            params: None,
            metadata,
        }
    }

    /// Read a checkpoint file (see [`super::read_checkpoint`])
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        super::reader::read_checkpoint(path.as_ref())
    }

    /// Leading dimension of the speaker-embedding table
    pub fn speaker_table_rows(&self) -> Result<usize> {
        let shape = self
            .weights
            .shape(super::SPEAKER_EMBEDDING_KEY)
            .ok_or_else(|| {
                VcError::corrupt(format!(
                    "missing speaker embedding tensor '{}'",
                    super::SPEAKER_EMBEDDING_KEY
                ))
            })?;
        shape
            .first()
            .copied()
            .ok_or_else(|| VcError::corrupt("speaker embedding tensor is a scalar"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn weights() -> WeightMap {
        let device = Device::Cpu;
        let mut map = WeightMap::new();
        map.insert("emb_g.weight", Tensor::zeros((4, 256), DType::F16, &device).unwrap());
        map.insert("enc_q.pre.weight", Tensor::zeros((2, 2), DType::F16, &device).unwrap());
        map.insert("enc_q.post.weight", Tensor::zeros((2, 2), DType::F16, &device).unwrap());
        map.insert("dec.conv_pre.weight", Tensor::zeros((2, 2), DType::F16, &device).unwrap());
        map.insert("enc_p.emb_pitch.index", Tensor::zeros((3,), DType::I64, &device).unwrap());
        map
    }

    #[test]
    fn test_remove_prefix() {
        let mut map = weights();
        assert_eq!(map.remove_prefix("enc_q."), 2);
        assert!(!map.has_prefix("enc_q."));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_to_placement_casts_only_floats() {
        let map = weights().to_placement(&ComputeContext::cpu()).unwrap();
        assert_eq!(map.get("emb_g.weight").unwrap().dtype(), DType::F32);
        assert_eq!(map.get("enc_p.emb_pitch.index").unwrap().dtype(), DType::I64);
    }

    #[test]
    fn test_speaker_table_rows() {
        let record = CheckpointRecord::new(weights(), vec![], CheckpointMetadata::default());
        assert_eq!(record.speaker_table_rows().unwrap(), 4);

        let empty = CheckpointRecord::new(WeightMap::new(), vec![], CheckpointMetadata::default());
        assert!(matches!(
            empty.speaker_table_rows(),
            Err(VcError::CorruptCheckpoint { .. })
        ));
    }

    #[test]
    fn test_metadata_defaults() {
        let meta = CheckpointMetadata::default();
        assert!(meta.is_pitch_aware());
        assert_eq!(meta.embedder_name, "hubert_base");
    }
}
