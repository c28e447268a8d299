//! Synthesizer weight schema
//!
//! Checkpoints come from several trainer versions and are loaded permissively,
//! but "permissive" is spelled out here: which tensors must exist, which
//! parameter groups belong to the inference network, which group is
//! training-only and dropped, and what happens to everything else.

use candle_core::Tensor;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::synthesizer::SynthesizerVariant;
use crate::checkpoint::{WeightMap, SPEAKER_EMBEDDING_KEY};
use crate::core::error::{Result, VcError};

/// Posterior encoder; only used during training
pub const TRAINING_ONLY_GROUP: &str = "enc_q.";

/// Pitch embedding of the pitch-aware content encoder
pub const PITCH_EMBEDDING_KEY: &str = "enc_p.emb_pitch.weight";

/// What a checkpoint must and may contain for one network variant
#[derive(Debug, Clone)]
pub struct WeightSchema {
    required: Vec<&'static str>,
    required_groups: Vec<&'static str>,
    dropped_groups: Vec<&'static str>,
}

/// Outcome of [`WeightSchema::apply`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaReport {
    /// Tensors removed with training-only groups
    pub dropped_training: usize,
    /// Tensors outside every known group, discarded
    pub discarded_unknown: Vec<String>,
    /// Weight-norm pairs folded into plain weights
    pub folded_weight_norm: usize,
}

impl WeightSchema {
    pub fn for_variant(variant: SynthesizerVariant) -> Self {
        let mut required = vec![SPEAKER_EMBEDDING_KEY];
        if variant == SynthesizerVariant::PitchAware {
            required.push(PITCH_EMBEDDING_KEY);
        }
        Self {
            required,
            required_groups: vec!["enc_p.", "flow.", "dec."],
            dropped_groups: vec![TRAINING_ONLY_GROUP],
        }
    }

    fn is_known(&self, name: &str) -> bool {
        self.required.contains(&name) || self.required_groups.iter().any(|g| name.starts_with(g))
    }

    /// Migrate a raw weight map into the inference network's layout.
    ///
    /// Training-only groups are removed, weight-norm pairs are folded, unknown
    /// tensors are discarded, and missing required tensors or groups fail the
    /// load as a corrupt checkpoint.
    pub fn apply(&self, mut weights: WeightMap) -> Result<(WeightMap, SchemaReport)> {
        let mut report = SchemaReport::default();

        for group in &self.dropped_groups {
            report.dropped_training += weights.remove_prefix(group);
        }
        if report.dropped_training > 0 {
            debug!(
                "Dropped {} training-only tensors",
                report.dropped_training
            );
        }

        report.discarded_unknown = weights.retain_names(|name| self.is_known(name));
        if !report.discarded_unknown.is_empty() {
            warn!(
                "Discarding {} unknown weight tensors (first: {})",
                report.discarded_unknown.len(),
                report.discarded_unknown[0]
            );
        }

        for name in &self.required {
            if !weights.contains(name) {
                return Err(VcError::corrupt(format!("missing required tensor '{}'", name)));
            }
        }
        for group in &self.required_groups {
            if !weights.has_prefix(group) {
                return Err(VcError::corrupt(format!(
                    "missing required weight group '{}'",
                    group
                )));
            }
        }

        let (weights, folded) = fold_weight_norm(weights.into_inner())?;
        report.folded_weight_norm = folded;

        info!(
            "Weight schema applied: {} tensors kept, {} weight-norm pairs folded",
            weights.len(),
            folded
        );
        Ok((WeightMap::from(weights), report))
    }
}

/// Replace `<base>.weight_g` / `<base>.weight_v` pairs by `<base>.weight`
fn fold_weight_norm(tensors: HashMap<String, Tensor>) -> Result<(HashMap<String, Tensor>, usize)> {
    let mut converted = HashMap::with_capacity(tensors.len());
    let mut processed = HashSet::new();
    let mut folded = 0;

    for (name, tensor) in tensors.iter() {
        if processed.contains(name) {
            continue;
        }

        if let Some(base_name) = name.strip_suffix(".weight_v") {
            let g_name = format!("{}.weight_g", base_name);
            let weight = match tensors.get(&g_name) {
                Some(weight_g) => {
                    folded += 1;
                    processed.insert(g_name);
                    apply_weight_norm(weight_g, tensor)?
                }
                None => tensor.clone(),
            };
            converted.insert(format!("{}.weight", base_name), weight);
            processed.insert(name.clone());
        } else if let Some(base_name) = name.strip_suffix(".weight_g") {
            // Orphaned magnitude without a direction is meaningless
            if !tensors.contains_key(&format!("{}.weight_v", base_name)) {
                return Err(VcError::corrupt(format!(
                    "'{}' has no matching weight_v",
                    name
                )));
            }
        } else {
            converted.insert(name.clone(), tensor.clone());
            processed.insert(name.clone());
        }
    }

    Ok((converted, folded))
}

/// weight = g * (v / ||v||), norm over every dim but the first
fn apply_weight_norm(weight_g: &Tensor, weight_v: &Tensor) -> Result<Tensor> {
    let rank = weight_v.rank();
    let v_flat = if rank > 2 {
        weight_v.flatten(1, rank - 1)?
    } else {
        weight_v.clone()
    };
    let mut norm = v_flat.sqr()?.sum_keepdim(1)?.sqrt()?;
    for _ in 2..rank {
        norm = norm.unsqueeze(norm.rank())?;
    }
    let norm = norm.clamp(1e-12, f64::MAX)?;

    let v_normalized = weight_v.broadcast_div(&norm)?;
    Ok(weight_g.broadcast_mul(&v_normalized)?)
}
