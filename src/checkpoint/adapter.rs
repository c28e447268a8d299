//! Checkpoint configuration adapter
//!
//! Checkpoints store the synthesizer configuration as a positional array.
//! Two layouts exist in the wild: the canonical 19-entry layout and a legacy
//! 18-entry layout that predates `emb_channels`. [`normalize`] maps either onto
//! a named parameter map, and [`RuntimeConfig`] is the typed view of that map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::error::{Result, VcError};

/// Canonical configuration fields, in storage order
pub const CANONICAL_FIELDS: [&str; 19] = [
    "spec_channels",
    "segment_size",
    "inter_channels",
    "hidden_channels",
    "filter_channels",
    "n_heads",
    "n_layers",
    "kernel_size",
    "p_dropout",
    "resblock",
    "resblock_kernel_sizes",
    "resblock_dilation_sizes",
    "upsample_rates",
    "upsample_initial_channel",
    "upsample_kernel_sizes",
    "spk_embed_dim",
    "gin_channels",
    "emb_channels",
    "sr",
];

/// The field missing from legacy configuration arrays
pub const LEGACY_FIELD: &str = "emb_channels";

/// Value assigned to [`LEGACY_FIELD`] when the array does not carry it
pub const DEFAULT_EMB_CHANNELS: usize = 256;

/// Named parameter map with every canonical field populated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointParams(Map<String, Value>);

impl CheckpointParams {
    /// Wrap an already-normalized map
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Fill `emb_channels` with its default when absent
    pub fn ensure_emb_channels(&mut self) {
        if !self.contains(LEGACY_FIELD) {
            self.set(LEGACY_FIELD, DEFAULT_EMB_CHANNELS);
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Map a positional configuration array onto named fields.
///
/// A stored, non-null parameter map is returned unchanged. Otherwise each
/// canonical field consumes one array slot, except that an array shorter than
/// the canonical layout skips `emb_channels` and assigns it
/// [`DEFAULT_EMB_CHANNELS`]. Running out of slots for any other field means the
/// checkpoint is malformed.
pub fn normalize(config: &[Value], stored: Option<&CheckpointParams>) -> Result<CheckpointParams> {
    if let Some(params) = stored {
        return Ok(params.clone());
    }

    let legacy = config.len() < CANONICAL_FIELDS.len();
    if legacy {
        warn!(
            "Legacy checkpoint config ({} entries), backfilling {} = {}",
            config.len(),
            LEGACY_FIELD,
            DEFAULT_EMB_CHANNELS
        );
    }

    let mut slots = config.iter();
    let mut params = Map::new();
    for field in CANONICAL_FIELDS {
        if legacy && field == LEGACY_FIELD {
            params.insert(field.to_string(), Value::from(DEFAULT_EMB_CHANNELS));
            continue;
        }
        let value = slots.next().ok_or_else(|| {
            VcError::corrupt(format!(
                "config array has {} entries, no slot left for '{}'",
                config.len(),
                field
            ))
        })?;
        params.insert(field.to_string(), value.clone());
    }

    let trailing = slots.count();
    if trailing > 0 {
        warn!("Ignoring {} trailing config entries", trailing);
    }

    Ok(CheckpointParams(params))
}

/// Typed synthesizer configuration derived from [`CheckpointParams`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub spec_channels: usize,
    pub segment_size: usize,
    pub inter_channels: usize,
    pub hidden_channels: usize,
    pub filter_channels: usize,
    pub n_heads: usize,
    pub n_layers: usize,
    pub kernel_size: usize,
    pub p_dropout: f64,
    #[serde(deserialize_with = "de_resblock")]
    pub resblock: String,
    pub resblock_kernel_sizes: Vec<usize>,
    pub resblock_dilation_sizes: Vec<Vec<usize>>,
    pub upsample_rates: Vec<usize>,
    pub upsample_initial_channel: usize,
    pub upsample_kernel_sizes: Vec<usize>,
    pub spk_embed_dim: usize,
    pub gin_channels: usize,
    pub emb_channels: usize,
    pub sr: u32,
}

impl RuntimeConfig {
    /// Decode the typed view; any missing or ill-typed field is corruption
    pub fn from_params(params: &CheckpointParams) -> Result<Self> {
        serde_json::from_value(Value::Object(params.0.clone()))
            .map_err(|e| VcError::corrupt(format!("invalid checkpoint params: {}", e)))
    }

    /// Output samples produced per input frame (product of upsample rates)
    pub fn hop_length(&self) -> usize {
        self.upsample_rates.iter().product()
    }
}

/// Older checkpoints store the residual block kind as an integer
fn de_resblock<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "resblock must be a string or integer, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A 40 kHz v2-style configuration array
    pub(crate) fn canonical_config() -> Vec<Value> {
        vec![
            json!(1025),
            json!(32),
            json!(192),
            json!(192),
            json!(768),
            json!(2),
            json!(6),
            json!(3),
            json!(0),
            json!("1"),
            json!([3, 7, 11]),
            json!([[1, 3, 5], [1, 3, 5], [1, 3, 5]]),
            json!([10, 10, 2, 2]),
            json!(512),
            json!([16, 16, 4, 4]),
            json!(109),
            json!(256),
            json!(768),
            json!(40000),
        ]
    }

    fn legacy_config() -> Vec<Value> {
        let mut config = canonical_config();
        config.remove(17);
        config
    }

    #[test]
    fn test_legacy_config_backfills_emb_channels() {
        let config = legacy_config();
        assert_eq!(config.len(), 18);

        let params = normalize(&config, None).unwrap();
        assert_eq!(params.get("emb_channels"), Some(&json!(256)));

        let others: Vec<&str> = CANONICAL_FIELDS
            .iter()
            .copied()
            .filter(|f| *f != LEGACY_FIELD)
            .collect();
        for (field, value) in others.iter().zip(config.iter()) {
            assert_eq!(params.get(field), Some(value), "field {}", field);
        }
        assert_eq!(params.as_map().len(), 19);
    }

    #[test]
    fn test_canonical_config_takes_emb_channels_from_array() {
        let config = canonical_config();
        let params = normalize(&config, None).unwrap();
        assert_eq!(params.get("emb_channels"), Some(&config[17]));
        assert_eq!(params.get("sr"), Some(&config[18]));
    }

    #[test]
    fn test_stored_params_are_returned_unchanged() {
        let mut stored = normalize(&canonical_config(), None).unwrap();
        stored.set("sr", 48000);

        let params = normalize(&[], Some(&stored)).unwrap();
        assert_eq!(params, stored);
    }

    #[test]
    fn test_short_config_is_corruption() {
        let config = &canonical_config()[..10];
        let err = normalize(config, None).unwrap_err();
        assert!(matches!(err, VcError::CorruptCheckpoint { .. }));
        assert!(err.to_string().contains("resblock_kernel_sizes"));
    }

    #[test]
    fn test_trailing_entries_are_ignored() {
        let mut config = canonical_config();
        config.push(json!("extra"));
        let params = normalize(&config, None).unwrap();
        assert_eq!(params.as_map().len(), 19);
        assert_eq!(params.get("sr"), Some(&json!(40000)));
    }

    #[test]
    fn test_runtime_config_from_params() {
        let params = normalize(&legacy_config(), None).unwrap();
        let config = RuntimeConfig::from_params(&params).unwrap();
        assert_eq!(config.sr, 40000);
        assert_eq!(config.emb_channels, 256);
        assert_eq!(config.resblock, "1");
        assert_eq!(config.p_dropout, 0.0);
        assert_eq!(config.resblock_dilation_sizes.len(), 3);
        assert_eq!(config.hop_length(), 400);
    }

    #[test]
    fn test_runtime_config_accepts_integer_resblock() {
        let mut params = normalize(&canonical_config(), None).unwrap();
        params.set("resblock", 2);
        let config = RuntimeConfig::from_params(&params).unwrap();
        assert_eq!(config.resblock, "2");
    }

    #[test]
    fn test_runtime_config_rejects_bad_types() {
        let mut params = normalize(&canonical_config(), None).unwrap();
        params.set("upsample_rates", "10,10,2,2");
        assert!(matches!(
            RuntimeConfig::from_params(&params),
            Err(VcError::CorruptCheckpoint { .. })
        ));
    }
}
