//! Voice-conversion checkpoints
//!
//! - Reading `.pth` / `.ckpt` / `.safetensors` files into a [`CheckpointRecord`]
//! - Normalizing the positional configuration array into named fields
//! - The typed [`RuntimeConfig`] consumed by synthesizer construction

mod adapter;
mod reader;
mod record;

pub use adapter::{
    normalize, CheckpointParams, RuntimeConfig, CANONICAL_FIELDS, DEFAULT_EMB_CHANNELS,
    LEGACY_FIELD,
};
pub use reader::{read_checkpoint, save_safetensors};
pub use record::{CheckpointMetadata, CheckpointRecord, WeightMap, DEFAULT_EMBEDDER_NAME};

/// Speaker-embedding table; its leading dimension is the speaker count
pub const SPEAKER_EMBEDDING_KEY: &str = "emb_g.weight";
